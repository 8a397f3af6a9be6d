use anyhow::Result;
use axum::Router;
use clap::{Parser, ValueEnum};
use datamart_core::corpus::DatalakeCorpus;
use datamart_core::storage::{open_backend, BackendConfig, StorageBackend};
use server::{build_app, ServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Storage backend variant
    #[arg(long, env = "BACKEND_TYPE", value_enum, default_value_t = BackendKind::Kv)]
    backend: BackendKind,
    /// Store location: sled directory, SQLite database file, or index root directory
    #[arg(long, env = "STORE_PATH", default_value = "./datamart")]
    store: String,
    /// Datalake directory used for snippets and POST /index
    #[arg(long, env = "DATALAKE_PATH", default_value = "./datalake")]
    datalake: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Token required by POST /index
    #[arg(long, env = "ADMIN_TOKEN")]
    admin_token: Option<String>,
    /// Comma-separated CORS origins
    #[arg(long, env = "CORS_ALLOW_ORIGIN")]
    cors_allow_origin: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendKind {
    Kv,
    #[value(alias = "sql")]
    Relational,
    #[value(alias = "fs")]
    Filesystem,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let config = match args.backend {
        BackendKind::Kv => BackendConfig::Kv { path: args.store.clone().into(), temporary: false },
        BackendKind::Relational => BackendConfig::Relational { database: args.store.clone() },
        BackendKind::Filesystem => BackendConfig::Filesystem { root: args.store.clone().into() },
    };
    let backend: Arc<dyn StorageBackend> = Arc::from(open_backend(&config)?);
    if !backend.check_connectivity() {
        tracing::warn!(backend = backend.name(), "backend failed its connectivity check; /health will report 503");
    }
    let server_config = ServerConfig { admin_token: args.admin_token, cors_allow_origin: args.cors_allow_origin };
    let app: Router = build_app(backend, DatalakeCorpus::new(&args.datalake), server_config);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, store = %args.store, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
