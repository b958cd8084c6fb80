// Query and export over stored graphs.
//
// Used by the CLI `functions`, `edges` and `export` commands.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use petgraph::Direction;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, EdgeReference, NodeIndex};
use repograph_graphs::{FunctionNode, RepositoryGraph, ResolutionStatus};

use crate::error::StoreError;
use crate::store::GraphStore;

/// Find a function by id, then exact qualified name, then a unique display
/// name or qualified-name suffix.
pub async fn find_function(
    store: &dyn GraphStore,
    repository: &str,
    key: &str,
) -> crate::error::Result<Option<FunctionNode>> {
    if let Some(node) = store.get_function(repository, key).await? {
        return Ok(Some(node));
    }
    let functions = store.list_functions(repository).await?;
    if let Some(node) = functions.iter().find(|n| n.qualified_name == key) {
        return Ok(Some(node.clone()));
    }

    let suffix = format!(".{key}");
    let mut matches = functions
        .into_iter()
        .filter(|n| n.name == key || n.qualified_name.ends_with(&suffix));
    match (matches.next(), matches.next()) {
        (Some(only), None) => Ok(Some(only)),
        _ => Ok(None),
    }
}

/// Load a graph or fail with a message naming the repository.
pub async fn require_graph(
    store: &dyn GraphStore,
    repository: &str,
) -> crate::error::Result<RepositoryGraph> {
    store
        .load_graph(repository)
        .await?
        .ok_or_else(|| StoreError::GraphNotFound(repository.to_string()).into())
}

/// Functions reachable from `start` over resolved edges, with their depth.
pub fn neighbors_bfs<'g>(
    graph: &'g RepositoryGraph,
    start: &str,
    direction: Direction,
    max_depth: u32,
) -> Vec<(u32, &'g FunctionNode)> {
    let call_graph = CallGraph::from_graph(graph);
    let Some(&start_idx) = call_graph.index.get(start) else {
        return Vec::new();
    };

    let mut result = Vec::new();
    let mut frontier = vec![start_idx];
    let mut visited = HashSet::from([start_idx]);

    for depth in 1..=max_depth {
        let mut next_frontier = Vec::new();
        for &idx in &frontier {
            let mut neighbors: Vec<NodeIndex> =
                call_graph.graph.neighbors_directed(idx, direction).collect();
            neighbors.sort_unstable();
            for neighbor in neighbors {
                if visited.insert(neighbor) {
                    result.push((depth, call_graph.graph[neighbor]));
                    next_frontier.push(neighbor);
                }
            }
        }
        frontier = next_frontier;
    }
    result
}

/// Resolved call edges as a petgraph `DiGraph`, edge weights are call counts.
#[derive(Debug)]
pub struct CallGraph<'g> {
    pub graph: DiGraph<&'g FunctionNode, u32>,
    pub index: HashMap<&'g str, NodeIndex>,
}

impl<'g> CallGraph<'g> {
    pub fn from_graph(source: &'g RepositoryGraph) -> Self {
        let mut graph = DiGraph::with_capacity(source.nodes.len(), source.edges.len());
        let mut index = HashMap::with_capacity(source.nodes.len());
        for node in &source.nodes {
            index.insert(node.id.as_str(), graph.add_node(node));
        }
        for edge in &source.edges {
            let Some(callee) = &edge.callee else {
                continue;
            };
            if let (Some(&from), Some(&to)) = (index.get(edge.caller.as_str()), index.get(callee.as_str())) {
                graph.add_edge(from, to, edge.call_count);
            }
        }
        Self { graph, index }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Dot,
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "dot" | "graphviz" => Ok(Self::Dot),
            other => Err(format!("unknown export format {other:?} (expected json or dot)")),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Dot => "dot",
        })
    }
}

pub fn export(graph: &RepositoryGraph, format: ExportFormat) -> crate::error::Result<String> {
    match format {
        ExportFormat::Json => export_json(graph),
        ExportFormat::Dot => Ok(export_dot(graph)),
    }
}

/// `{ repository, nodes, edges, summary }`, pretty-printed.
pub fn export_json(graph: &RepositoryGraph) -> crate::error::Result<String> {
    Ok(serde_json::to_string_pretty(graph).map_err(StoreError::Serialization)?)
}

/// Graphviz rendering. Functions are labelled by qualified name; calls into
/// external libraries point at dashed boxes named by callee text. Unresolved
/// calls are left out.
pub fn export_dot(graph: &RepositoryGraph) -> String {
    let mut dot: DiGraph<String, u32> = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();
    let mut external: HashMap<&str, NodeIndex> = HashMap::new();

    for node in &graph.nodes {
        index.insert(node.id.as_str(), dot.add_node(node.qualified_name.clone()));
    }
    for edge in &graph.edges {
        let Some(&from) = index.get(edge.caller.as_str()) else {
            continue;
        };
        let to = match (&edge.callee, edge.status) {
            (Some(callee), _) => match index.get(callee.as_str()) {
                Some(&to) => to,
                None => continue,
            },
            (None, ResolutionStatus::ResolvedExternalLibrary) => *external
                .entry(edge.callee_text.as_str())
                .or_insert_with(|| dot.add_node(edge.callee_text.clone())),
            (None, _) => continue,
        };
        dot.add_edge(from, to, edge.call_count);
    }

    let external_nodes: HashSet<NodeIndex> = external.values().copied().collect();
    let edge_attrs = |_: &DiGraph<String, u32>, e: EdgeReference<'_, u32>| {
        if *e.weight() > 1 {
            format!("label=\"{}\"", e.weight())
        } else {
            String::new()
        }
    };
    let node_attrs = |_: &DiGraph<String, u32>, (idx, name): (NodeIndex, &String)| {
        if external_nodes.contains(&idx) {
            format!("label={name:?} shape=box style=dashed")
        } else {
            format!("label={name:?}")
        }
    };
    let rendered = Dot::with_attr_getters(
        &dot,
        &[Config::NodeNoLabel, Config::EdgeNoLabel],
        &edge_attrs,
        &node_attrs,
    );
    format!("{rendered:?}")
}
