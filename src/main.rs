use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, warn};

use sve_aggregator::config::Config;
use sve_aggregator::constants;
use sve_aggregator::curator::Curator;
use sve_aggregator::logging;
use sve_aggregator::pipeline::Pipeline;
use sve_aggregator::sources::create_source;
use sve_aggregator::storage::{EventStore, InMemoryEventStore};

#[derive(Parser)]
#[command(name = "sve_aggregator")]
#[command(about = "Silicon Valley technology event aggregator")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the data ingestion process
    Ingest {
        /// Specific sources to run (comma-separated). Available: meetup, eventbrite
        #[arg(long)]
        sources: Option<String>,
    },
    /// Run one duplicate-grouping and merge pass over the store
    Merge,
    /// Run both ingestion and the merge pass sequentially
    Run {
        /// Specific sources to run (comma-separated)
        #[arg(long)]
        sources: Option<String>,
    },
}

async fn create_store() -> Result<Arc<dyn EventStore>, Box<dyn std::error::Error>> {
    #[cfg(feature = "db")]
    {
        if std::env::var("LIBSQL_URL").is_ok() {
            let store = sve_aggregator::db::LibsqlEventStore::connect().await?;
            return Ok(Arc::new(store));
        }
        warn!("LIBSQL_URL not set, falling back to in-memory storage");
    }
    Ok(Arc::new(InMemoryEventStore::new()))
}

fn parse_source_names(sources: Option<String>) -> Vec<String> {
    match sources {
        Some(list) => list.split(',').map(|s| s.trim().to_string()).collect(),
        None => constants::get_supported_sources()
            .iter()
            .map(|s| s.to_string())
            .collect(),
    }
}

async fn run_ingestion(
    source_names: &[String],
    store: Arc<dyn EventStore>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let window_start = chrono::Utc::now();
    let window_end = window_start + chrono::Duration::days(config.ingestion.lookahead_days);

    for name in source_names {
        let span = tracing::info_span!("Running source", source = %name);
        let _enter = span.enter();

        match create_source(name, &config.source(name))? {
            Some(source) => {
                match Pipeline::run_for_source(
                    source.as_ref(),
                    store.clone(),
                    window_start,
                    window_end,
                )
                .await
                {
                    Ok(result) => {
                        println!("\n📊 Ingest results for {name}:");
                        println!("   Fetched: {}", result.fetched);
                        println!("   Created: {}", result.created);
                        println!("   Updated: {}", result.updated);
                        println!("   Skipped: {}", result.skipped);
                    }
                    Err(e) => {
                        error!("Ingestion failed for {}: {}", name, e);
                    }
                }
            }
            None => {
                warn!("Unknown source specified");
                println!("⚠️  Unknown source: {name}");
            }
        }
    }
    Ok(())
}

async fn run_merge(store: Arc<dyn EventStore>) -> Result<(), Box<dyn std::error::Error>> {
    let curator = Curator::new(store);
    let summary = curator.run().await?;
    println!("\n🧹 Merge pass results:");
    println!("   Duplicate groups: {}", summary.groups_found);
    println!("   Groups merged: {}", summary.groups_merged);
    println!("   Events absorbed: {}", summary.events_absorbed);
    println!("   Deferred (stale): {}", summary.skipped_stale);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest { sources } => {
            println!("🔄 Running ingestion pipeline...");
            let store = create_store().await?;
            run_ingestion(&parse_source_names(sources), store).await?;
        }
        Commands::Merge => {
            println!("🧹 Running merge pass...");
            let store = create_store().await?;
            run_merge(store).await?;
        }
        Commands::Run { sources } => {
            println!("🔄 Running full pipeline...");
            let store = create_store().await?;
            run_ingestion(&parse_source_names(sources), store.clone()).await?;
            run_merge(store).await?;
        }
    }

    Ok(())
}
