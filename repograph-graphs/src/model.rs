//! The repository-wide graph: function nodes and call edges.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::drafts::FunctionKind;
use crate::{GraphError, Language};

/// Stable node id: first 16 hex digits of SHA-256 over `file \0 qualified_name`.
pub fn function_id(file: &str, qualified_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file.as_bytes());
    hasher.update([0u8]);
    hasher.update(qualified_name.as_bytes());
    let digest = hasher.finalize();
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionNode {
    pub id: String,
    pub qualified_name: String,
    /// Display name.
    pub name: String,
    pub language: Language,
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
    pub start_byte: usize,
    pub end_byte: usize,
    pub snippet: String,
    pub docstring: Option<String>,
    pub kind: FunctionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    ResolvedLocal,
    ResolvedCrossFile,
    ResolvedExternalLibrary,
    Unresolved,
}

impl ResolutionStatus {
    pub const ALL: [Self; 4] = [
        Self::ResolvedLocal,
        Self::ResolvedCrossFile,
        Self::ResolvedExternalLibrary,
        Self::Unresolved,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ResolvedLocal => "resolved_local",
            Self::ResolvedCrossFile => "resolved_cross_file",
            Self::ResolvedExternalLibrary => "resolved_external_library",
            Self::Unresolved => "unresolved",
        }
    }

    /// Whether the edge points at a node of this graph.
    pub fn is_internal(self) -> bool {
        matches!(self, Self::ResolvedLocal | Self::ResolvedCrossFile)
    }
}

impl fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStatus {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| GraphError::UnknownKind(s.to_string()))
    }
}

/// All call sites from one caller to one target, collapsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEdge {
    pub caller: String,
    /// `None` unless the target is a node of this graph.
    pub callee: Option<String>,
    pub status: ResolutionStatus,
    /// Which rule matched, or why none did.
    pub rationale: String,
    /// Callee as written at the call site.
    pub callee_text: String,
    pub call_count: u32,
    /// Sorted, de-duplicated 1-based lines of the call sites.
    pub lines: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub total_functions: usize,
    pub total_files: usize,
    /// Call sites represented by edges.
    pub total_calls: u64,
    /// Call sites at module top level; these have no caller and no edge.
    pub module_level_calls: usize,
    pub resolved_local: usize,
    pub resolved_cross_file: usize,
    pub resolved_external_library: usize,
    pub unresolved: usize,
}

/// Text a retrieval pipeline can embed for one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievableUnit<'a> {
    pub id: &'a str,
    pub qualified_name: &'a str,
    pub file: &'a str,
    pub snippet: &'a str,
    pub docstring: Option<&'a str>,
}

/// Every function node and call edge of one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryGraph {
    pub repository: String,
    pub nodes: Vec<FunctionNode>,
    pub edges: Vec<CallEdge>,
    pub summary: GraphSummary,
}

impl RepositoryGraph {
    pub fn node(&self, id: &str) -> Option<&FunctionNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn find_by_qualified_name(&self, qualified_name: &str) -> Option<&FunctionNode> {
        self.nodes.iter().find(|n| n.qualified_name == qualified_name)
    }

    pub fn outgoing(&self, id: &str) -> Vec<&CallEdge> {
        self.edges.iter().filter(|e| e.caller == id).collect()
    }

    pub fn incoming(&self, id: &str) -> Vec<&CallEdge> {
        self.edges
            .iter()
            .filter(|e| e.callee.as_deref() == Some(id))
            .collect()
    }

    pub fn retrievable_units(&self) -> impl Iterator<Item = RetrievableUnit<'_>> {
        self.nodes.iter().map(|n| RetrievableUnit {
            id: &n.id,
            qualified_name: &n.qualified_name,
            file: &n.file,
            snippet: &n.snippet,
            docstring: n.docstring.as_deref(),
        })
    }

    /// Recount the summary from nodes and edges. `total_files` and
    /// `module_level_calls` are not derivable and are kept.
    pub fn recompute_summary(&mut self) {
        let mut summary = GraphSummary {
            total_functions: self.nodes.len(),
            total_files: self.summary.total_files,
            module_level_calls: self.summary.module_level_calls,
            ..GraphSummary::default()
        };
        for edge in &self.edges {
            summary.total_calls += u64::from(edge.call_count);
            match edge.status {
                ResolutionStatus::ResolvedLocal => summary.resolved_local += 1,
                ResolutionStatus::ResolvedCrossFile => summary.resolved_cross_file += 1,
                ResolutionStatus::ResolvedExternalLibrary => {
                    summary.resolved_external_library += 1;
                }
                ResolutionStatus::Unresolved => summary.unresolved += 1,
            }
        }
        self.summary = summary;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_id_is_stable_and_distinct() {
        let a = function_id("a.py", "a.helper");
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, function_id("a.py", "a.helper"));
        assert_ne!(a, function_id("b.py", "a.helper"));
        // The separator keeps `ab` + `c` apart from `a` + `bc`.
        assert_ne!(function_id("ab", "c"), function_id("a", "bc"));
    }

    #[test]
    fn status_strings_round_trip() {
        for status in ResolutionStatus::ALL {
            assert_eq!(status.as_str().parse::<ResolutionStatus>().unwrap(), status);
        }
        let json = serde_json::to_string(&ResolutionStatus::ResolvedCrossFile).unwrap();
        assert_eq!(json, "\"resolved_cross_file\"");
    }

    #[test]
    fn summary_counts_statuses() {
        let edge = |status, count| CallEdge {
            caller: "c".into(),
            callee: None,
            status,
            rationale: String::new(),
            callee_text: "x".into(),
            call_count: count,
            lines: vec![1],
        };
        let mut graph = RepositoryGraph {
            edges: vec![
                edge(ResolutionStatus::ResolvedLocal, 2),
                edge(ResolutionStatus::Unresolved, 1),
                edge(ResolutionStatus::Unresolved, 3),
            ],
            ..RepositoryGraph::default()
        };
        graph.summary.total_files = 4;
        graph.recompute_summary();
        assert_eq!(graph.summary.total_calls, 6);
        assert_eq!(graph.summary.resolved_local, 1);
        assert_eq!(graph.summary.unresolved, 2);
        assert_eq!(graph.summary.total_files, 4);
    }
}
