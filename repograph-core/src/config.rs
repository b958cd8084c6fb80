use std::path::{Path, PathBuf};
use std::time::Duration;

use repograph_graphs::{Language, ParseLimits};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name looked up at the repository root.
pub const CONFIG_FILE: &str = "repograph.toml";

/// Top-level repograph configuration, matching `repograph.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepographConfig {
    #[serde(default)]
    pub ingest: IngestSection,
    #[serde(default)]
    pub parse: ParseSection,
    #[serde(default)]
    pub store: StoreSection,
}

impl RepographConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(ConfigError::Parse(format!("{}: {e}", path.display()))),
        };
        Self::from_toml_str(&text)
    }

    /// `repograph.toml` under `root` if present, defaults otherwise.
    pub fn load_or_default(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE);
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ingest.include_patterns.is_empty() {
            return Err(ConfigError::Invalid(
                "ingest.include_patterns must not be empty".into(),
            ));
        }
        for pattern in self
            .ingest
            .include_patterns
            .iter()
            .chain(&self.ingest.exclude_patterns)
        {
            glob::Pattern::new(pattern)
                .map_err(|e| ConfigError::Invalid(format!("bad glob pattern {pattern:?}: {e}")))?;
        }
        if self.ingest.max_file_bytes == 0 {
            return Err(ConfigError::Invalid("ingest.max_file_bytes must be > 0".into()));
        }
        self.ingest.languages.resolve()?;

        if self.parse.timeout_ms == 0 {
            return Err(ConfigError::Invalid("parse.timeout_ms must be > 0".into()));
        }
        if !(self.parse.max_error_ratio > 0.0 && self.parse.max_error_ratio <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "parse.max_error_ratio must be in (0, 1], got {}",
                self.parse.max_error_ratio
            )));
        }
        if self.parse.max_snippet_bytes == 0 {
            return Err(ConfigError::Invalid(
                "parse.max_snippet_bytes must be > 0".into(),
            ));
        }
        if self.store.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("store.path must not be empty".into()));
        }
        Ok(())
    }

    pub fn parse_limits(&self) -> ParseLimits {
        ParseLimits {
            timeout: Duration::from_millis(self.parse.timeout_ms),
            max_error_ratio: self.parse.max_error_ratio,
            max_snippet_bytes: self.parse.max_snippet_bytes,
        }
    }

    /// Database location; relative paths are taken from `root`.
    pub fn store_path(&self, root: &Path) -> PathBuf {
        if self.store.path.is_absolute() {
            self.store.path.clone()
        } else {
            root.join(&self.store.path)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSection {
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    /// Larger files are skipped and reported on the job.
    pub max_file_bytes: u64,
    pub languages: LanguageConfig,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            include_patterns: vec![
                "**/*.py".into(),
                "**/*.pyi".into(),
                "**/*.js".into(),
                "**/*.mjs".into(),
                "**/*.cjs".into(),
                "**/*.jsx".into(),
                "**/*.ts".into(),
                "**/*.mts".into(),
                "**/*.cts".into(),
                "**/*.tsx".into(),
            ],
            exclude_patterns: vec![
                "**/node_modules/**".into(),
                "**/.git/**".into(),
                "**/dist/**".into(),
                "**/build/**".into(),
                "**/.venv/**".into(),
                "**/venv/**".into(),
                "**/__pycache__/**".into(),
                "**/.repograph/**".into(),
            ],
            max_file_bytes: 1024 * 1024,
            languages: LanguageConfig::default(),
        }
    }
}

/// `"auto"` for every supported language, or an explicit list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LanguageConfig {
    Named(String),
    Explicit(Vec<String>),
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self::Named("auto".into())
    }
}

impl LanguageConfig {
    pub fn resolve(&self) -> Result<Vec<Language>, ConfigError> {
        let names: Vec<&str> = match self {
            Self::Named(name) if name == "auto" => return Ok(Language::ALL.to_vec()),
            Self::Named(name) => vec![name.as_str()],
            Self::Explicit(names) => names.iter().map(String::as_str).collect(),
        };
        let mut languages = names
            .into_iter()
            .map(|name| {
                name.parse::<Language>()
                    .map_err(|_| ConfigError::Invalid(format!("unknown language {name:?}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if languages.is_empty() {
            return Err(ConfigError::Invalid("ingest.languages must not be empty".into()));
        }
        languages.sort();
        languages.dedup();
        Ok(languages)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseSection {
    pub timeout_ms: u64,
    pub max_error_ratio: f64,
    pub max_snippet_bytes: usize,
    /// Parser threads; 0 uses rayon's default.
    pub threads: usize,
}

impl Default for ParseSection {
    fn default() -> Self {
        let limits = ParseLimits::default();
        Self {
            timeout_ms: u64::try_from(limits.timeout.as_millis()).unwrap_or(u64::MAX),
            max_error_ratio: limits.max_error_ratio,
            max_snippet_bytes: limits.max_snippet_bytes,
            threads: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub path: PathBuf,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".repograph/graphs.db"),
        }
    }
}
