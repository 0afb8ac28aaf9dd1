use clap::Parser;
use docdb::{Config, DriverServer, StorageEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "docdb")]
#[command(about = "DocDB - MongoDB wire protocol gateway over a tabular storage engine", long_about = None)]
struct Args {
    /// Configuration file (also accepted as `-config <file>`)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the configuration file)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides the configuration file)
    #[arg(short, long)]
    port: Option<u16>,
}

/// Rewrite the single-dash `-config` spelling into `--config`
fn normalize_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    args.into_iter()
        .map(|arg| {
            if arg == "-config" {
                "--config".to_string()
            } else if let Some(value) = arg.strip_prefix("-config=") {
                format!("--config={}", value)
            } else {
                arg
            }
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse_from(normalize_args(std::env::args()));

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        "Starting DocDB on {} (default database '{}', {} storage, {} workers)",
        config.listen_addr(),
        config.database,
        config.storage_format.as_str(),
        config.worker_threads()
    );

    let storage = Arc::new(StorageEngine::new(config.admin_user.clone()));
    let server =
        DriverServer::bind(&config.listen_addr(), storage, config.driver_options()).await?;
    server.serve(docdb::server::shutdown_signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
