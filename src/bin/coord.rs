//! Coordinator binary

use clap::{Parser, Subcommand};
use nodesync::common::{parse_duration, Config};
use nodesync::{GroupDispatcher, JobDefinition};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "nodesync-coord")]
#[command(about = "nodesync rendezvous coordinator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the group described by a job file
    Serve {
        /// Job description (JSON)
        #[arg(long)]
        job: PathBuf,

        /// Configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Listen port (overrides config and job)
        #[arg(long)]
        port: Option<u16>,

        /// Stop after this long, e.g. "30m"
        #[arg(long)]
        timeout: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            job,
            config,
            port,
            timeout,
        } => {
            let config = match config {
                Some(path) => Config::load_from(&path)?,
                None => Config::load()?,
            };
            init_tracing(&config.log_level);

            let mut job = JobDefinition::from_file(&job)?;
            if port.is_some() {
                job.port = port;
            }
            let timeout = timeout.as_deref().map(parse_duration).transpose()?;

            let handle = GroupDispatcher::new(job, config).start().await?;
            tracing::info!("✓ Coordinator ready on {}", handle.local_addr());
            handle.run_until_interrupted(timeout).await?;
        }
    }

    Ok(())
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
