use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pitchlink_core::PlayerRecord;
use pitchlink_resolve::{ResolveConfig, Resolver};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pitchlink")]
#[command(about = "Resolve and merge player identities across profile sources")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve one best-effort canonical record for a player name.
    Resolve { name: String },
    /// Resolve every plausible record for an ambiguous name.
    Disambiguate { name: String },
    /// Refresh a stored record (JSON file) against freshly resolved data.
    Reconcile { record: PathBuf, name: String },
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pitchlink_resolve=debug,info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
}

fn print_record(record: &PlayerRecord) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = ResolveConfig::from_env();
    let resolver = Resolver::from_registry(&config)?;

    match cli.command {
        Commands::Resolve { name } => match resolver.resolve_one(&name).await {
            Ok(record) => print_record(&record)?,
            Err(err) => {
                eprintln!("resolution failed: {err}");
                std::process::exit(1);
            }
        },
        Commands::Disambiguate { name } => {
            let records = resolver.resolve_many(&name).await;
            eprintln!("{} plausible record(s) for \"{name}\"", records.len());
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::Reconcile { record, name } => {
            let text = std::fs::read_to_string(&record)
                .with_context(|| format!("reading {}", record.display()))?;
            let persisted: PlayerRecord = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", record.display()))?;
            let merged = resolver.reconcile(&persisted, &name).await;
            print_record(&merged)?;
        }
    }

    Ok(())
}
