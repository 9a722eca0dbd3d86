use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use blob_indexer::config::Config;
use blob_indexer::infra::build_use_case;
use blob_indexer::logging;
use blob_indexer::pipeline::ingestion::parse_notifications;
use blob_indexer::server;

#[derive(Parser)]
#[command(name = "blob_indexer")]
#[command(about = "Index uploaded blobs into a document store, with best-effort receipt analysis")]
#[command(version)]
struct Cli {
    /// TOML config file; environment variables are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the rotated JSON log files
    #[arg(long, global = true, default_value = logging::DEFAULT_LOG_DIR)]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile one notification (or an Event Grid array) and print the stored records
    Process {
        /// Notification JSON file; reads stdin when omitted
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Serve the Event Grid / blob trigger webhook
    Serve {
        #[arg(long, default_value = "0.0.0.0:7071")]
        addr: SocketAddr,
    },
    /// Load and validate configuration, then print a redacted summary
    CheckConfig,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::from_env()?,
    };
    Ok(config)
}

fn read_input(file: Option<&PathBuf>) -> Result<Vec<u8>> {
    match file {
        Some(path) => std::fs::read(path).with_context(|| format!("reading {}", path.display())),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf).context("reading stdin")?;
            Ok(buf)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let _guard = logging::init_logging(&cli.log_dir);

    match cli.command {
        Commands::Process { file } => {
            let config = load_config(cli.config.as_ref())?;
            let use_case = build_use_case(&config)?;
            let body = read_input(file.as_ref())?;
            let notifications = parse_notifications(&body).context("decoding notification")?;
            info!(count = notifications.len(), "Processing notifications");

            let outcomes = use_case.reconcile_all(&notifications).await?;
            let records: Vec<_> = outcomes.into_iter().map(|o| o.record).collect();
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::Serve { addr } => {
            let config = load_config(cli.config.as_ref())?;
            let use_case = build_use_case(&config)?;
            server::start_server(Arc::new(use_case), addr).await?;
        }
        Commands::CheckConfig => {
            let config = load_config(cli.config.as_ref())?;
            println!("{}", config);
        }
    }

    Ok(())
}
