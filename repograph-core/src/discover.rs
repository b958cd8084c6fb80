//! Local file discovery: walk a checkout, keep files matching the include
//! globs, read them as UTF-8.

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use repograph_graphs::{Language, SourceFile};
use tracing::{debug, info, instrument, warn};

use crate::config::IngestSection;
use crate::error::IngestError;
use crate::job::{JobErrorEntry, JobErrorKind};

/// Files ready to parse plus the files skipped on the way.
#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<SourceFile>,
    pub skipped: Vec<JobErrorEntry>,
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

#[instrument(skip_all, name = "discover", fields(root = %root.display()))]
pub fn discover_files(root: &Path, config: &IngestSection) -> Result<Discovery, IngestError> {
    if !root.is_dir() {
        return Err(IngestError::RootNotFound(root.display().to_string()));
    }

    let excludes: Vec<Pattern> = config
        .exclude_patterns
        .iter()
        .filter_map(|p| match Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!(pattern = %p, error = %e, "Invalid exclude pattern");
                None
            }
        })
        .collect();

    let mut matched: Vec<PathBuf> = Vec::new();
    for pattern in &config.include_patterns {
        let full_pattern = root.join(pattern).to_string_lossy().to_string();
        match glob::glob_with(&full_pattern, MATCH_OPTIONS) {
            Ok(paths) => {
                for entry in paths.flatten() {
                    if entry.is_file() && !is_excluded(&entry, root, &excludes) {
                        matched.push(entry);
                    }
                }
            }
            Err(e) => warn!(pattern = %pattern, error = %e, "Invalid glob pattern"),
        }
    }
    matched.sort();
    matched.dedup();

    let mut discovery = Discovery::default();
    for path in matched {
        let relative = relative_path(&path, root);
        let Some(language) = Language::from_path(&path) else {
            discovery.skipped.push(JobErrorEntry {
                path: relative,
                kind: JobErrorKind::UnsupportedLanguage,
                message: "no language adapter for this extension".into(),
            });
            continue;
        };

        let size = std::fs::metadata(&path)?.len();
        if size > config.max_file_bytes {
            discovery.skipped.push(JobErrorEntry {
                path: relative,
                kind: JobErrorKind::FileParseError,
                message: format!("file is {size} bytes, limit is {}", config.max_file_bytes),
            });
            continue;
        }

        match std::fs::read(&path).map(String::from_utf8) {
            Ok(Ok(text)) => discovery.files.push(SourceFile::new(relative, language, text)),
            Ok(Err(_)) => discovery.skipped.push(JobErrorEntry {
                path: relative,
                kind: JobErrorKind::FileParseError,
                message: "file is not valid UTF-8".into(),
            }),
            Err(e) => {
                debug!(path = %relative, error = %e, "Unreadable file");
                discovery.skipped.push(JobErrorEntry {
                    path: relative,
                    kind: JobErrorKind::FileParseError,
                    message: format!("cannot read file: {e}"),
                });
            }
        }
    }

    info!(
        files = discovery.files.len(),
        skipped = discovery.skipped.len(),
        "Discovery complete"
    );
    Ok(discovery)
}

fn is_excluded(path: &Path, root: &Path, excludes: &[Pattern]) -> bool {
    let relative = relative_path(path, root);
    excludes
        .iter()
        .any(|p| p.matches_with(&relative, MATCH_OPTIONS))
}

/// `/`-separated path relative to `root`.
fn relative_path(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, path: &str, text: &[u8]) {
        let full = root.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, text).unwrap();
    }

    #[test]
    fn finds_sources_and_skips_excluded_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "app/main.py", b"def main():\n    pass\n");
        write(root, "web/src/App.tsx", b"export const App = () => null;\n");
        write(root, "node_modules/lib/index.js", b"module.exports = 1;\n");
        write(root, "README.md", b"# readme\n");

        let discovery = discover_files(root, &IngestSection::default()).unwrap();
        let paths: Vec<_> = discovery.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["app/main.py", "web/src/App.tsx"]);
        assert_eq!(discovery.files[1].language, Language::Tsx);
        assert!(discovery.skipped.is_empty());
    }

    #[test]
    fn oversized_and_binary_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "big.py", &vec![b'#'; 64]);
        write(root, "bin.js", &[0xff, 0xfe, 0x00]);
        write(root, "ok.py", b"x = 1\n");

        let config = IngestSection {
            max_file_bytes: 32,
            ..IngestSection::default()
        };
        let discovery = discover_files(root, &config).unwrap();
        assert_eq!(discovery.files.len(), 1);

        let mut skipped: Vec<_> = discovery.skipped.iter().map(|e| (e.path.as_str(), e.kind)).collect();
        skipped.sort_unstable_by_key(|(p, _)| *p);
        assert_eq!(
            skipped,
            vec![
                ("big.py", JobErrorKind::FileParseError),
                ("bin.js", JobErrorKind::FileParseError),
            ]
        );
    }

    #[test]
    fn included_files_without_adapter_are_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "lib/tool.rb", b"puts 1\n");
        let config = IngestSection {
            include_patterns: vec!["**/*.rb".into()],
            ..IngestSection::default()
        };
        let discovery = discover_files(dir.path(), &config).unwrap();
        assert!(discovery.files.is_empty());
        assert_eq!(discovery.skipped[0].kind, JobErrorKind::UnsupportedLanguage);
        assert_eq!(discovery.skipped[0].path, "lib/tool.rb");
    }

    #[test]
    fn missing_root_is_an_error() {
        let err = discover_files(Path::new("/no/such/checkout"), &IngestSection::default()).unwrap_err();
        assert!(matches!(err, IngestError::RootNotFound(_)));
    }
}
