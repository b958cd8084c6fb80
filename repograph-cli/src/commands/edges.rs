use clap::{Args, ValueEnum};

use repograph_core::query;
use repograph_core::store::GraphStore;
use repograph_graphs::{CallEdge, FunctionNode};

use super::DbArgs;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Calls made by the function
    Out,
    /// Calls into the function
    In,
    Both,
}

#[derive(Args, Debug)]
pub struct EdgesArgs {
    /// Repository identifier used at ingest
    pub repository: String,

    /// Function id, qualified name, or unique short name
    pub function: String,

    #[arg(long, value_enum, default_value = "both")]
    pub direction: Direction,

    /// Follow resolved calls transitively up to this depth
    #[arg(long, default_value_t = 1)]
    pub depth: u32,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub db: DbArgs,
}

pub async fn run(args: EdgesArgs) -> anyhow::Result<()> {
    let store = args.db.open_existing()?;
    let Some(node) = query::find_function(&store, &args.repository, &args.function).await? else {
        anyhow::bail!(
            "No function matching {:?} in {}",
            args.function,
            args.repository
        );
    };

    if args.depth > 1 {
        return print_reachable(&store, &args, &node).await;
    }

    let outgoing = if args.direction == Direction::In {
        Vec::new()
    } else {
        store.outgoing_edges(&args.repository, &node.id).await?
    };
    let incoming = if args.direction == Direction::Out {
        Vec::new()
    } else {
        store.incoming_edges(&args.repository, &node.id).await?
    };

    if args.json {
        return super::print_json(&serde_json::json!({
            "function": node,
            "outgoing": outgoing,
            "incoming": incoming,
        }));
    }

    let functions = store.list_functions(&args.repository).await?;
    let name_of = |id: &str| {
        functions
            .iter()
            .find(|n| n.id == id)
            .map_or_else(|| id.to_string(), |n| n.qualified_name.clone())
    };

    println!("{} ({}:{})", node.qualified_name, node.file, node.start_line);
    if args.direction != Direction::In {
        println!();
        println!("  Calls ({}):", outgoing.len());
        for edge in &outgoing {
            let target = edge
                .callee
                .as_deref()
                .map_or_else(|| edge.callee_text.clone(), &name_of);
            print_edge("->", &target, edge);
        }
    }
    if args.direction != Direction::Out {
        println!();
        println!("  Called by ({}):", incoming.len());
        for edge in &incoming {
            print_edge("<-", &name_of(&edge.caller), edge);
        }
    }
    Ok(())
}

fn print_edge(arrow: &str, target: &str, edge: &CallEdge) {
    let lines: Vec<String> = edge.lines.iter().map(u32::to_string).collect();
    println!(
        "    {arrow} {target}  [{}] x{} line {}",
        edge.status.as_str(),
        edge.call_count,
        lines.join(",")
    );
    if !edge.rationale.is_empty() {
        println!("         {}", edge.rationale);
    }
}

async fn print_reachable(
    store: &dyn GraphStore,
    args: &EdgesArgs,
    node: &FunctionNode,
) -> anyhow::Result<()> {
    let graph = query::require_graph(store, &args.repository).await?;
    let mut sections = Vec::new();
    if args.direction != Direction::In {
        sections.push((
            "callees",
            query::neighbors_bfs(&graph, &node.id, petgraph::Direction::Outgoing, args.depth),
        ));
    }
    if args.direction != Direction::Out {
        sections.push((
            "callers",
            query::neighbors_bfs(&graph, &node.id, petgraph::Direction::Incoming, args.depth),
        ));
    }

    if args.json {
        let value: serde_json::Map<String, serde_json::Value> = sections
            .iter()
            .map(|(label, found)| {
                let entries = found
                    .iter()
                    .map(|(depth, n)| serde_json::json!({ "depth": depth, "function": n }))
                    .collect();
                ((*label).to_string(), serde_json::Value::Array(entries))
            })
            .collect();
        return super::print_json(&value);
    }

    println!("{} ({}:{})", node.qualified_name, node.file, node.start_line);
    for (label, found) in &sections {
        println!();
        println!("  Reachable {label} (depth <= {}): {}", args.depth, found.len());
        for (depth, n) in found {
            let indent = "  ".repeat(*depth as usize);
            println!("  {indent}{} ({}:{})", n.qualified_name, n.file, n.start_line);
        }
    }
    Ok(())
}
