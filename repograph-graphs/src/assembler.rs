//! Turns nodes and resolved edges into a validated [`RepositoryGraph`].

use std::collections::HashSet;

use thiserror::Error;
use tracing::debug;

use crate::drafts::ParsedFile;
use crate::model::{CallEdge, FunctionNode, GraphSummary, RepositoryGraph};
use crate::resolver::resolve_calls;
use crate::symbols::SymbolTable;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphValidationError {
    #[error("duplicate node id {id} ({first} and {second})")]
    DuplicateNodeId {
        id: String,
        first: String,
        second: String,
    },

    #[error("edge caller {0} is not a node")]
    DanglingCaller(String),

    #[error("edge from {caller} points at missing node {callee}")]
    DanglingCallee { caller: String, callee: String },

    #[error("edge from {caller} to {callee} has status {status} but a callee node")]
    StatusMismatch {
        caller: String,
        callee: String,
        status: String,
    },
}

/// Sort, validate and summarise. Output order depends only on content, so the
/// same repository always assembles to the same graph.
pub fn assemble(
    repository: &str,
    mut nodes: Vec<FunctionNode>,
    mut edges: Vec<CallEdge>,
    total_files: usize,
    module_level_calls: usize,
) -> Result<RepositoryGraph, GraphValidationError> {
    sort_canonical(&mut nodes, &mut edges);

    let mut graph = RepositoryGraph {
        repository: repository.to_string(),
        nodes,
        edges,
        summary: GraphSummary {
            total_files,
            module_level_calls,
            ..GraphSummary::default()
        },
    };
    validate(&graph)?;
    graph.recompute_summary();

    debug!(
        repository,
        nodes = graph.summary.total_functions,
        edges = graph.edges.len(),
        "Assembled graph"
    );
    Ok(graph)
}

/// Nodes by (file, start byte, qualified name); edges by (caller, callee,
/// status, callee text).
pub fn sort_canonical(nodes: &mut [FunctionNode], edges: &mut [CallEdge]) {
    nodes.sort_by(|a, b| {
        (&a.file, a.start_byte, &a.qualified_name).cmp(&(&b.file, b.start_byte, &b.qualified_name))
    });
    edges.sort_by(|a, b| {
        (&a.caller, &a.callee, a.status, &a.callee_text)
            .cmp(&(&b.caller, &b.callee, b.status, &b.callee_text))
    });
}

/// Node ids are unique, every edge caller is a node, and an edge names a
/// callee node exactly when it is resolved inside the repository.
pub fn validate(graph: &RepositoryGraph) -> Result<(), GraphValidationError> {
    let mut ids: HashSet<&str> = HashSet::with_capacity(graph.nodes.len());
    for node in &graph.nodes {
        if !ids.insert(&node.id) {
            let first = graph
                .nodes
                .iter()
                .find(|n| n.id == node.id)
                .map_or_else(String::new, |n| n.qualified_name.clone());
            return Err(GraphValidationError::DuplicateNodeId {
                id: node.id.clone(),
                first,
                second: node.qualified_name.clone(),
            });
        }
    }

    for edge in &graph.edges {
        if !ids.contains(edge.caller.as_str()) {
            return Err(GraphValidationError::DanglingCaller(edge.caller.clone()));
        }
        match &edge.callee {
            Some(callee) if !ids.contains(callee.as_str()) => {
                return Err(GraphValidationError::DanglingCallee {
                    caller: edge.caller.clone(),
                    callee: callee.clone(),
                });
            }
            Some(callee) if !edge.status.is_internal() => {
                return Err(GraphValidationError::StatusMismatch {
                    caller: edge.caller.clone(),
                    callee: callee.clone(),
                    status: edge.status.to_string(),
                });
            }
            None if edge.status.is_internal() => {
                return Err(GraphValidationError::StatusMismatch {
                    caller: edge.caller.clone(),
                    callee: String::new(),
                    status: edge.status.to_string(),
                });
            }
            _ => {}
        }
    }
    Ok(())
}

/// Index, resolve and assemble in one go. `parsed` includes failed files;
/// they count toward `total_files` but contribute no nodes.
pub fn build_graph(
    repository: &str,
    parsed: &[ParsedFile],
) -> Result<RepositoryGraph, GraphValidationError> {
    let table = SymbolTable::build(parsed);
    let resolution = resolve_calls(&table);
    assemble(
        repository,
        table.nodes().to_vec(),
        resolution.edges,
        parsed.len(),
        resolution.module_level_calls,
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;
    use crate::Language;
    use crate::drafts::SourceFile;
    use crate::languages::{AdapterRegistry, ParseLimits};
    use crate::model::ResolutionStatus;

    fn parse_all(files: &[(&str, &str)]) -> Vec<ParsedFile> {
        let registry = AdapterRegistry::new();
        files
            .iter()
            .map(|(path, text)| {
                let language = Language::from_path(std::path::Path::new(path)).unwrap();
                registry.parse(
                    &SourceFile::new(*path, language, *text),
                    &ParseLimits::default(),
                    &AtomicBool::new(false),
                )
            })
            .collect()
    }

    const REPO: [(&str, &str); 3] = [
        ("a.py", "def helper():\n    return 1\n"),
        (
            "b.py",
            "from a import helper\nimport requests\n\ndef main():\n    helper()\n    requests.get('x')\n    print('done')\n\nmain()\n",
        ),
        ("c.py", "))) ((( ]]] ::: ))) ((( ]]] :::\n"),
    ];

    #[test]
    fn builds_summary_over_all_files() {
        let parsed = parse_all(&REPO);
        let graph = build_graph("demo", &parsed).unwrap();

        assert_eq!(graph.repository, "demo");
        assert_eq!(graph.summary.total_files, 3);
        assert_eq!(graph.summary.total_functions, 2);
        assert_eq!(graph.summary.module_level_calls, 1);
        assert_eq!(graph.summary.resolved_cross_file, 1);
        assert_eq!(graph.summary.resolved_external_library, 1);
        assert_eq!(graph.summary.unresolved, 1);
        assert_eq!(graph.summary.total_calls, 3);
        let main = &graph.find_by_qualified_name("b.main").unwrap().id;
        assert!(graph.edges.iter().all(|e| &e.caller == main));
    }

    #[test]
    fn assembly_is_independent_of_file_order() {
        let mut reversed = REPO.to_vec();
        reversed.reverse();
        let first = build_graph("demo", &parse_all(&REPO)).unwrap();
        let second = build_graph("demo", &parse_all(&reversed)).unwrap();
        assert_eq!(first, second);
    }

    fn qualified_names(graph: &RepositoryGraph) -> Vec<&str> {
        graph.nodes.iter().map(|n| n.qualified_name.as_str()).collect()
    }

    #[test]
    fn lambdas_become_exactly_one_node() {
        let parsed = parse_all(&[("m.py", "f = lambda x: x
g = map(lambda y: y, [])
")]);
        let graph = build_graph("demo", &parsed).unwrap();
        assert_eq!(qualified_names(&graph), vec!["m.f", "m.py::lambda@2:9"]);
    }

    #[test]
    fn same_line_redefinitions_keep_the_file() {
        let parsed = parse_all(&[(
            "m.js",
            "function f(){return 1}function f(){return 2}function f(){return 3}
",
        )]);
        let graph = build_graph("demo", &parsed).unwrap();
        assert_eq!(qualified_names(&graph), vec!["m.f", "m.f@1", "m.f@1:45"]);
    }

    fn node(id: &str) -> FunctionNode {
        FunctionNode {
            id: id.to_string(),
            qualified_name: format!("m.{id}"),
            name: id.to_string(),
            language: Language::Python,
            file: "m.py".to_string(),
            start_line: 1,
            end_line: 1,
            start_byte: 0,
            end_byte: 1,
            snippet: String::new(),
            docstring: None,
            kind: crate::drafts::FunctionKind::Function,
        }
    }

    fn edge(caller: &str, callee: Option<&str>, status: ResolutionStatus) -> CallEdge {
        CallEdge {
            caller: caller.to_string(),
            callee: callee.map(str::to_string),
            status,
            rationale: String::new(),
            callee_text: "x".to_string(),
            call_count: 1,
            lines: vec![1],
        }
    }

    #[test]
    fn rejects_inconsistent_graphs() {
        let dup = assemble("r", vec![node("a"), node("a")], vec![], 1, 0);
        assert!(matches!(dup, Err(GraphValidationError::DuplicateNodeId { .. })));

        let dangling = assemble(
            "r",
            vec![node("a")],
            vec![edge("a", Some("zz"), ResolutionStatus::ResolvedLocal)],
            1,
            0,
        );
        assert!(matches!(dangling, Err(GraphValidationError::DanglingCallee { .. })));

        let orphan = assemble(
            "r",
            vec![node("a")],
            vec![edge("zz", None, ResolutionStatus::Unresolved)],
            1,
            0,
        );
        assert_eq!(orphan, Err(GraphValidationError::DanglingCaller("zz".into())));

        let mismatch = assemble(
            "r",
            vec![node("a")],
            vec![edge("a", None, ResolutionStatus::ResolvedCrossFile)],
            1,
            0,
        );
        assert!(matches!(mismatch, Err(GraphValidationError::StatusMismatch { .. })));
    }
}
