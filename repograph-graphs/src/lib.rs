pub mod assembler;
pub mod drafts;
pub mod languages;
pub mod model;
pub mod modules;
pub mod resolver;
pub mod symbols;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use assembler::{GraphValidationError, assemble, build_graph, sort_canonical, validate};
pub use drafts::{
    CallHint, CallSiteDraft, ClassDraft, DeclaredEntity, Diagnostic, DiagnosticKind, FileDrafts,
    FunctionDraft, FunctionKind, ImportBinding, ParseStatus, ParsedFile, ScopeMap, SourceFile,
};
pub use languages::{AdapterRegistry, Extraction, LanguageAdapter, ParseLimits};
pub use model::{
    CallEdge, FunctionNode, GraphSummary, RepositoryGraph, ResolutionStatus, RetrievableUnit,
    function_id,
};
pub use modules::{ModuleIndex, ModuleTarget, module_name};
pub use resolver::{Resolution, ResolvedCall, merge_calls, resolve_calls};
pub use symbols::{ClassRef, SymbolTable};

/// Error type for the graph engine.
#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Tree-sitter error: {0}")]
    TreeSitter(String),

    #[error("Unknown function kind: {0}")]
    UnknownKind(String),

    #[error("Graph validation failed: {0}")]
    Validation(#[from] GraphValidationError),
}

pub type Result<T> = std::result::Result<T, GraphError>;

// ── Language tags ──────────────────────────────────────────────────

/// Source languages the adapters understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    Jsx,
    TypeScript,
    Tsx,
}

impl Language {
    pub const ALL: [Self; 5] = [
        Self::Python,
        Self::JavaScript,
        Self::Jsx,
        Self::TypeScript,
        Self::Tsx,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::Jsx => "jsx",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
        }
    }

    /// Classify a file extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "py" | "pyi" => Some(Self::Python),
            "js" | "mjs" | "cjs" => Some(Self::JavaScript),
            "jsx" => Some(Self::Jsx),
            "ts" | "mts" | "cts" => Some(Self::TypeScript),
            "tsx" => Some(Self::Tsx),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// JavaScript, JSX, TypeScript and TSX share module and scoping rules.
    pub fn is_ecmascript(self) -> bool {
        !matches!(self, Self::Python)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|lang| lang.as_str() == s)
            .ok_or_else(|| GraphError::UnsupportedLanguage(s.to_string()))
    }
}

// ── Span type ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TextRange {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

impl TextRange {
    /// 1-based first line.
    #[allow(clippy::cast_possible_truncation)]
    pub fn start_line(&self) -> u32 {
        self.start_row as u32 + 1
    }

    /// 1-based last line.
    #[allow(clippy::cast_possible_truncation)]
    pub fn end_line(&self) -> u32 {
        self.end_row as u32 + 1
    }

    /// 1-based column of the first character.
    #[allow(clippy::cast_possible_truncation)]
    pub fn start_column(&self) -> u32 {
        self.start_col as u32 + 1
    }
}

impl From<tree_sitter::Range> for TextRange {
    fn from(r: tree_sitter::Range) -> Self {
        Self {
            start_byte: r.start_byte,
            end_byte: r.end_byte,
            start_row: r.start_point.row,
            start_col: r.start_point.column,
            end_row: r.end_point.row,
            end_col: r.end_point.column,
        }
    }
}

// ── Doc comment data ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocCommentData {
    /// The doc comment text, stripped of syntax markers.
    pub text: String,
    /// Documentation style detected.
    pub style: DocStyle,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocStyle {
    Jsdoc,
    Numpy,
    Google,
    Sphinx,
    LineComment,
    Other(String),
}
