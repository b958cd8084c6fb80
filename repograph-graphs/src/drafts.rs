//! Per-file records emitted by the language adapters.
//!
//! Everything here is file-local: indices such as [`CallSiteDraft::caller`] point
//! into the owning [`FileDrafts`] and are only turned into repository-wide ids by
//! the symbol table.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{DocCommentData, GraphError, Language, TextRange};

// ── Functions and classes ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    Function,
    Method,
    Arrow,
    Anonymous,
    Generator,
}

impl FunctionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Arrow => "arrow",
            Self::Anonymous => "anonymous",
            Self::Generator => "generator",
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FunctionKind {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "function" => Ok(Self::Function),
            "method" => Ok(Self::Method),
            "arrow" => Ok(Self::Arrow),
            "anonymous" => Ok(Self::Anonymous),
            "generator" => Ok(Self::Generator),
            other => Err(GraphError::UnknownKind(other.to_string())),
        }
    }
}

/// A function definition before it has a repository-wide identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDraft {
    /// Display name as written (`run`, `<lambda>`, `<anonymous>`).
    pub name: String,
    /// Dotted path inside the file: enclosing classes/functions plus the name.
    /// Positional names (`lambda@3:9`) are not prefixed.
    pub local_path: String,
    pub kind: FunctionKind,
    /// Local path of the class this function is a method of.
    pub class_path: Option<String>,
    /// Index of the lexically enclosing function.
    pub parent: Option<usize>,
    /// Synthesized positional name rather than a source identifier.
    pub positional: bool,
    /// `__init__` / `constructor`.
    pub is_constructor: bool,
    pub span: TextRange,
    pub snippet: String,
    pub doc: Option<DocCommentData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDraft {
    pub name: String,
    pub local_path: String,
    /// Base class expressions as written (`Base`, `models.Model`).
    pub bases: Vec<String>,
    pub span: TextRange,
}

// ── Call sites ─────────────────────────────────────────────────────

/// What the call looks like syntactically, before any lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallHint {
    Direct,
    Attribute,
    SelfReference,
    ImportedAlias,
    SuperReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSiteDraft {
    /// Index of the containing function; `None` at module top level.
    pub caller: Option<usize>,
    /// Normalized callee text: `foo`, `obj.bar`, `self.baz`.
    pub callee_text: String,
    /// Everything before the final member (`obj`, `os.path`), if any.
    pub receiver: Option<String>,
    /// Final member name.
    pub member: String,
    /// Receiver class declared by local syntax (`x = Foo()`, `x: Foo`).
    pub receiver_type: Option<String>,
    pub hint: CallHint,
    pub span: TextRange,
}

impl CallSiteDraft {
    /// First segment of the callee text.
    pub fn root(&self) -> &str {
        self.receiver
            .as_deref()
            .map_or(self.member.as_str(), |r| r.split('.').next().unwrap_or(r))
    }
}

// ── Scope map ──────────────────────────────────────────────────────

/// An imported name: `module` as written in the import statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImportBinding {
    pub module: String,
    /// `None` binds the module itself (`import os`, `import * as ns`).
    /// ECMAScript default imports use `"default"`.
    pub symbol: Option<String>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclaredEntity {
    Function(usize),
    Class(usize),
    Import(ImportBinding),
    /// Another top-level name (`export default helper`, `run = helper`).
    Alias(String),
}

/// Names declared at file top level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeMap {
    pub entries: BTreeMap<String, DeclaredEntity>,
    /// Modules whose public names are all imported (`from m import *`, `export * from`).
    pub wildcard_imports: Vec<String>,
}

impl ScopeMap {
    pub fn get(&self, name: &str) -> Option<&DeclaredEntity> {
        self.entries.get(name)
    }

    pub fn import(&self, name: &str) -> Option<&ImportBinding> {
        match self.entries.get(name) {
            Some(DeclaredEntity::Import(binding)) => Some(binding),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDrafts {
    pub functions: Vec<FunctionDraft>,
    pub classes: Vec<ClassDraft>,
    pub calls: Vec<CallSiteDraft>,
    pub scope: ScopeMap,
}

// ── Diagnostics ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    SyntaxError,
    DynamicCallee,
    DynamicImport,
    NestingTooDeep,
}

/// An unsupported construct inside an otherwise parseable file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub line: u32,
    pub message: String,
}

// ── Files ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    Ok,
    ParseError,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Relative to the repository root, `/`-separated.
    pub path: String,
    pub language: Language,
    pub text: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, language: Language, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            language,
            text: text.into(),
        }
    }
}

/// Immutable result of running an adapter over one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFile {
    pub path: String,
    pub language: Language,
    /// Module path used as the qualified-name prefix.
    pub module: String,
    pub status: ParseStatus,
    pub drafts: FileDrafts,
    pub diagnostics: Vec<Diagnostic>,
    /// Why the file produced no drafts.
    pub error: Option<String>,
}

impl ParsedFile {
    /// A file that yields nothing.
    pub fn failed(
        file: &SourceFile,
        module: String,
        status: ParseStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: file.path.clone(),
            language: file.language,
            module,
            status,
            drafts: FileDrafts::default(),
            diagnostics: Vec::new(),
            error: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ParseStatus::Ok
    }

    /// Parsed, but some constructs were skipped.
    pub fn is_partial(&self) -> bool {
        self.is_ok() && !self.diagnostics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(receiver: Option<&str>, member: &str) -> CallSiteDraft {
        CallSiteDraft {
            caller: None,
            callee_text: receiver.map_or(member.to_string(), |r| format!("{r}.{member}")),
            receiver: receiver.map(str::to_string),
            member: member.to_string(),
            receiver_type: None,
            hint: CallHint::Direct,
            span: TextRange::default(),
        }
    }

    #[test]
    fn call_root_is_first_segment() {
        assert_eq!(call(None, "helper").root(), "helper");
        assert_eq!(call(Some("os.path"), "join").root(), "os");
        assert_eq!(call(Some("self"), "run").root(), "self");
    }

    #[test]
    fn function_kind_parses_its_own_names() {
        for kind in [
            FunctionKind::Function,
            FunctionKind::Method,
            FunctionKind::Arrow,
            FunctionKind::Anonymous,
            FunctionKind::Generator,
        ] {
            assert_eq!(kind.as_str().parse::<FunctionKind>().unwrap(), kind);
        }
        assert!("closure".parse::<FunctionKind>().is_err());
    }

    #[test]
    fn failed_file_is_not_partial() {
        let src = SourceFile::new("broken.py", Language::Python, "def (");
        let parsed = ParsedFile::failed(&src, "broken".into(), ParseStatus::ParseError, "bad");
        assert!(!parsed.is_ok());
        assert!(!parsed.is_partial());
        assert!(parsed.drafts.functions.is_empty());
    }
}
