use clap::Args;

use repograph_core::query;

use super::DbArgs;

#[derive(Args, Debug)]
pub struct FunctionsArgs {
    /// Repository identifier used at ingest
    pub repository: String,

    /// Only functions whose file path starts with this prefix
    #[arg(long)]
    pub file: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub db: DbArgs,
}

pub async fn run(args: FunctionsArgs) -> anyhow::Result<()> {
    let store = args.db.open_existing()?;
    let graph = query::require_graph(&store, &args.repository).await?;

    let functions: Vec<_> = graph
        .nodes
        .iter()
        .filter(|n| args.file.as_deref().is_none_or(|prefix| n.file.starts_with(prefix)))
        .collect();

    if args.json {
        return super::print_json(&functions);
    }

    if functions.is_empty() {
        println!("No functions found in {}", args.repository);
        return Ok(());
    }

    let width = functions
        .iter()
        .map(|n| n.qualified_name.len())
        .max()
        .unwrap_or(0);
    for node in &functions {
        println!(
            "{:<width$}  {:<8}  {}:{}",
            node.qualified_name,
            node.kind.as_str(),
            node.file,
            node.start_line,
        );
    }
    println!();
    println!("{} functions", functions.len());
    Ok(())
}
