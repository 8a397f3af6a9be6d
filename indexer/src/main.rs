use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use datamart_core::corpus::DatalakeCorpus;
use datamart_core::indexer::Indexer;
use datamart_core::storage::{open_backend, BackendConfig};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query the inverted word index over the datalake", long_about = None)]
struct Cli {
    /// Storage backend variant
    #[arg(long, env = "BACKEND_TYPE", value_enum, default_value_t = BackendKind::Kv)]
    backend: BackendKind,
    /// Store location: sled directory, SQLite database file, or index root directory
    #[arg(long, env = "STORE_PATH", default_value = "./datamart")]
    store: String,
    /// Directory holding header_<id>.txt / body_<id>.txt pairs
    #[arg(long, env = "DATALAKE_PATH", default_value = "./datalake")]
    datalake: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendKind {
    Kv,
    #[value(alias = "sql")]
    Relational,
    #[value(alias = "fs")]
    Filesystem,
}

#[derive(Subcommand)]
enum Commands {
    /// Index datalake documents, skipping already-indexed ones
    Index {
        /// Reprocess every document, even if already indexed
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Print ids of documents containing every query word
    Search {
        #[arg(required = true)]
        query: Vec<String>,
        /// Match against title words only
        #[arg(long, default_value_t = false)]
        title: bool,
    },
    /// Print stored metadata for one document
    Info { id: String },
    /// Print aggregate index statistics
    Stats,
    /// Only run the backend connectivity check
    Check,
}

fn backend_config(kind: BackendKind, store: &str) -> BackendConfig {
    match kind {
        BackendKind::Kv => BackendConfig::Kv { path: store.into(), temporary: false },
        BackendKind::Relational => BackendConfig::Relational { database: store.to_string() },
        BackendKind::Filesystem => BackendConfig::Filesystem { root: store.into() },
    }
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let backend = open_backend(&backend_config(cli.backend, &cli.store))?;
    let corpus = DatalakeCorpus::new(&cli.datalake);
    let indexer = Indexer::new(&*backend, &corpus);
    indexer.ensure_connected()?;

    match cli.command {
        Commands::Index { force } => {
            let report = indexer.index_all(force)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Search { query, title } => {
            let query = query.join(" ");
            let hits = if title { indexer.search_title(&query)? } else { indexer.search(&query)? };
            tracing::info!(query = %query, hits = hits.len(), "search complete");
            for id in hits {
                println!("{id}");
            }
        }
        Commands::Info { id } => match indexer.get_document_info(&id)? {
            Some(meta) => println!("{}", serde_json::to_string_pretty(&meta)?),
            None => bail!("document {id} is not indexed"),
        },
        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&indexer.get_stats()?)?);
        }
        Commands::Check => println!("ok"),
    }
    Ok(())
}
