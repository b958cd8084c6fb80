use clap::Args;

use repograph_core::store::GraphStore;

use super::DbArgs;

#[derive(Args, Debug)]
pub struct ReposArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Remove this repository's graph instead of listing
    #[arg(long, value_name = "REPOSITORY")]
    pub delete: Option<String>,

    #[command(flatten)]
    pub db: DbArgs,
}

pub async fn run(args: ReposArgs) -> anyhow::Result<()> {
    let store = args.db.open_existing()?;
    if let Some(repository) = &args.delete {
        if !store.delete_graph(repository).await? {
            anyhow::bail!("Graph not found: {repository}");
        }
        println!("Deleted {repository}");
        return Ok(());
    }

    let repos = store.list_repositories().await?;

    if args.json {
        return super::print_json(&repos);
    }
    if repos.is_empty() {
        println!("No repositories stored in {}", args.db.db.display());
        return Ok(());
    }

    for info in &repos {
        let s = &info.summary;
        println!(
            "{}  built {}  {} files, {} functions, {} calls ({} unresolved)",
            info.repository,
            info.built_at.format("%Y-%m-%d %H:%M:%S UTC"),
            s.total_files,
            s.total_functions,
            s.total_calls,
            s.unresolved,
        );
    }
    Ok(())
}
