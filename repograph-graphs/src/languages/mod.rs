mod ecma;
mod helpers;
pub mod javascript;
pub mod python;
pub mod typescript;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::drafts::{Diagnostic, FileDrafts, ParseStatus, ParsedFile, SourceFile};
use crate::{GraphError, Language, Result, modules};

/// Per-file parsing limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParseLimits {
    /// Parses still running after this long are abandoned.
    pub timeout: Duration,
    /// Error regions covering at least this share of the file make it unparsable.
    pub max_error_ratio: f64,
    pub max_snippet_bytes: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            max_error_ratio: 0.5,
            max_snippet_bytes: 8192,
        }
    }
}

/// Drafts and diagnostics produced by one adapter run.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub drafts: FileDrafts,
    pub diagnostics: Vec<Diagnostic>,
}

/// Trait implemented by each language's extraction support.
pub trait LanguageAdapter: Send + Sync + std::fmt::Debug {
    /// Language tags this adapter handles.
    fn languages(&self) -> &'static [Language];

    /// File extensions this adapter handles.
    fn extensions(&self) -> &'static [&'static str];

    /// Tree-sitter grammar for one of [`Self::languages`].
    fn tree_sitter_language(&self, language: Language) -> tree_sitter::Language;

    /// Walk a parsed tree and emit drafts.
    fn extract(
        &self,
        tree: &tree_sitter::Tree,
        source: &str,
        limits: &ParseLimits,
    ) -> Result<Extraction>;

    /// Parse one file best-effort. Never fails: problems become the file's status.
    fn parse(&self, file: &SourceFile, limits: &ParseLimits, cancel: &AtomicBool) -> ParsedFile {
        let module = modules::module_name(&file.path, file.language);
        let grammar = self.tree_sitter_language(file.language);

        let tree = match parse_tree(&grammar, &file.text, limits, cancel) {
            Ok(tree) => tree,
            Err(e) => return ParsedFile::failed(file, module, ParseStatus::ParseError, e.to_string()),
        };

        let root = tree.root_node();
        if root.is_error() {
            return ParsedFile::failed(
                file,
                module,
                ParseStatus::ParseError,
                "file could not be parsed",
            );
        }

        let (error_bytes, mut diagnostics) = helpers::syntax_diagnostics(root);
        #[allow(clippy::cast_precision_loss)]
        let ratio = if file.text.is_empty() {
            0.0
        } else {
            error_bytes as f64 / file.text.len() as f64
        };
        if error_bytes > 0 && ratio >= limits.max_error_ratio {
            return ParsedFile::failed(
                file,
                module,
                ParseStatus::ParseError,
                format!("syntax errors cover {:.0}% of the file", ratio * 100.0),
            );
        }

        match self.extract(&tree, &file.text, limits) {
            Ok(extraction) => {
                diagnostics.extend(extraction.diagnostics);
                debug!(
                    path = %file.path,
                    functions = extraction.drafts.functions.len(),
                    calls = extraction.drafts.calls.len(),
                    diagnostics = diagnostics.len(),
                    "Parsed file"
                );
                ParsedFile {
                    path: file.path.clone(),
                    language: file.language,
                    module,
                    status: ParseStatus::Ok,
                    drafts: extraction.drafts,
                    diagnostics,
                    error: None,
                }
            }
            Err(e) => ParsedFile::failed(file, module, ParseStatus::ParseError, e.to_string()),
        }
    }
}

/// Run tree-sitter with a deadline and a cancellation flag.
fn parse_tree(
    grammar: &tree_sitter::Language,
    source: &str,
    limits: &ParseLimits,
    cancel: &AtomicBool,
) -> Result<tree_sitter::Tree> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(grammar)
        .map_err(|e| GraphError::TreeSitter(e.to_string()))?;

    let bytes = source.as_bytes();
    let started = Instant::now();
    let mut progress = |_: &tree_sitter::ParseState| -> bool {
        cancel.load(Ordering::Relaxed) || started.elapsed() >= limits.timeout
    };
    let options = tree_sitter::ParseOptions::new().progress_callback(&mut progress);

    let tree = parser.parse_with_options(
        &mut |offset, _| bytes.get(offset..).unwrap_or_default(),
        None,
        Some(options),
    );

    tree.ok_or_else(|| {
        let reason = if cancel.load(Ordering::Relaxed) {
            "parse cancelled"
        } else {
            "parse timed out"
        };
        GraphError::TreeSitter(reason.to_string())
    })
}

/// Immutable map from language tag to adapter, built once per process or job.
#[derive(Debug, Clone)]
pub struct AdapterRegistry {
    adapters: BTreeMap<Language, Arc<dyn LanguageAdapter>>,
}

impl AdapterRegistry {
    /// Registry with every built-in adapter.
    pub fn new() -> Self {
        Self::with_languages(&Language::ALL)
    }

    /// Registry restricted to the given languages; other files become `unsupported`.
    pub fn with_languages(languages: &[Language]) -> Self {
        let builtin: [Arc<dyn LanguageAdapter>; 3] = [
            Arc::new(python::PythonAdapter),
            Arc::new(javascript::JavaScriptAdapter),
            Arc::new(typescript::TypeScriptAdapter),
        ];

        let mut adapters = BTreeMap::new();
        for adapter in builtin {
            for lang in adapter.languages() {
                if languages.contains(lang) {
                    adapters.insert(*lang, Arc::clone(&adapter));
                }
            }
        }
        Self { adapters }
    }

    pub fn get(&self, language: Language) -> Option<&Arc<dyn LanguageAdapter>> {
        self.adapters.get(&language)
    }

    /// Look up the adapter for a file by its extension.
    pub fn for_file(&self, path: &Path) -> Option<&Arc<dyn LanguageAdapter>> {
        self.get(Language::from_path(path)?)
    }

    /// List all registered language tags.
    pub fn languages(&self) -> Vec<Language> {
        self.adapters.keys().copied().collect()
    }

    /// Parse a file with its language's adapter.
    pub fn parse(&self, file: &SourceFile, limits: &ParseLimits, cancel: &AtomicBool) -> ParsedFile {
        match self.get(file.language) {
            Some(adapter) => adapter.parse(file, limits, cancel),
            None => ParsedFile::failed(
                file,
                modules::module_name(&file.path, file.language),
                ParseStatus::Unsupported,
                format!("no adapter registered for {}", file.language),
            ),
        }
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drafts::DiagnosticKind;

    fn parse(path: &str, language: Language, text: &str) -> ParsedFile {
        AdapterRegistry::new().parse(
            &SourceFile::new(path, language, text),
            &ParseLimits::default(),
            &AtomicBool::new(false),
        )
    }

    #[test]
    fn registry_covers_all_languages() {
        let reg = AdapterRegistry::new();
        assert_eq!(reg.languages(), Language::ALL.to_vec());
        assert!(reg.for_file(Path::new("app/main.py")).is_some());
        assert!(reg.for_file(Path::new("web/App.tsx")).is_some());
        assert!(reg.for_file(Path::new("README.md")).is_none());
    }

    #[test]
    fn restricted_registry_marks_others_unsupported() {
        let reg = AdapterRegistry::with_languages(&[Language::Python]);
        let parsed = reg.parse(
            &SourceFile::new("index.js", Language::JavaScript, "function a() {}"),
            &ParseLimits::default(),
            &AtomicBool::new(false),
        );
        assert_eq!(parsed.status, ParseStatus::Unsupported);
        assert!(parsed.drafts.functions.is_empty());
    }

    #[test]
    fn garbage_file_is_parse_error() {
        let garbage = "))) ((( ]]] ::: ".repeat(200);
        let parsed = parse("broken.py", Language::Python, &garbage);
        assert_eq!(parsed.status, ParseStatus::ParseError);
        assert!(parsed.drafts.functions.is_empty());
        assert!(parsed.error.is_some());
    }

    #[test]
    fn small_syntax_error_keeps_other_functions() {
        let source = "\
def good():
    return helper()

def helper():
    return 1

x = (1 +
";
        let parsed = parse("partial.py", Language::Python, source);
        assert_eq!(parsed.status, ParseStatus::Ok);
        let names: Vec<_> = parsed.drafts.functions.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"good"));
        assert!(names.contains(&"helper"));
        assert!(parsed.is_partial());
    }

    #[test]
    fn cancelled_parse_yields_parse_error() {
        let source = "def f():\n    return 1\n".repeat(2000);
        let parsed = AdapterRegistry::new().parse(
            &SourceFile::new("big.py", Language::Python, source),
            &ParseLimits::default(),
            &AtomicBool::new(true),
        );
        assert_eq!(parsed.status, ParseStatus::ParseError);
        assert_eq!(parsed.error.as_deref(), Some("Tree-sitter error: parse cancelled"));
    }

    #[test]
    fn slow_parse_times_out() {
        let limits = ParseLimits {
            timeout: Duration::ZERO,
            ..ParseLimits::default()
        };
        let source = "def f():\n    return 1\n".repeat(2000);
        let parsed = AdapterRegistry::new().parse(
            &SourceFile::new("big.py", Language::Python, source),
            &limits,
            &AtomicBool::new(false),
        );
        assert_eq!(parsed.status, ParseStatus::ParseError);
        assert_eq!(parsed.error.as_deref(), Some("Tree-sitter error: parse timed out"));
    }

    #[test]
    fn deeply_nested_expressions_are_skipped_not_fatal() {
        let terms = vec!["1"; 20_000].join(" + ");
        let source = format!("def f():\n    return {terms}\n\ndef g():\n    return h()\n");
        let parsed = parse("deep.py", Language::Python, &source);
        assert_eq!(parsed.status, ParseStatus::Ok);
        let names: Vec<_> = parsed.drafts.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["f", "g"]);
        assert_eq!(parsed.drafts.calls.len(), 1);
        assert_eq!(parsed.diagnostics.len(), 1);
        assert_eq!(parsed.diagnostics[0].kind, DiagnosticKind::NestingTooDeep);

        let chain = format!("const x = {};\nfunction g() {{ return h(); }}\n", terms);
        let parsed = parse("deep.js", Language::JavaScript, &chain);
        assert_eq!(parsed.status, ParseStatus::Ok);
        assert_eq!(parsed.drafts.functions.len(), 1);
        assert_eq!(parsed.drafts.calls[0].callee_text, "h");
    }

    #[test]
    fn empty_file_parses_cleanly() {
        let parsed = parse("empty.ts", Language::TypeScript, "");
        assert_eq!(parsed.status, ParseStatus::Ok);
        assert!(parsed.drafts.functions.is_empty());
        assert!(parsed.diagnostics.is_empty());
    }
}
