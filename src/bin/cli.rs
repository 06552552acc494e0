//! CLI for nodes taking part in a rendezvous

use clap::{Parser, Subcommand};
use nodesync::common::{parse_duration, Config};
use nodesync::NodeClient;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "nodesync")]
#[command(about = "nodesync node client")]
#[command(version)]
struct Cli {
    /// Coordinator address (host:port), defaults to the configured one
    #[arg(long, global = true)]
    coordinator: Option<String>,

    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for the group to complete and print its data
    Join {
        #[arg(long)]
        group: String,

        #[arg(long)]
        client: String,

        #[arg(long)]
        role: String,

        /// Give up after this long, e.g. "5m"
        #[arg(long)]
        timeout: Option<String>,

        /// Declared group size, checked by the coordinator
        #[arg(long)]
        group_size: Option<u32>,
    },

    /// Tell the coordinator this node is done with the rendezvous
    Complete {
        #[arg(long)]
        group: String,

        #[arg(long)]
        client: String,

        #[arg(long)]
        role: String,
    },

    /// Leave the group at the end of the job
    Clear {
        #[arg(long)]
        group: String,

        #[arg(long)]
        client: String,

        #[arg(long)]
        role: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Join {
            group,
            client,
            role,
            timeout,
            group_size,
        } => {
            if let Some(timeout) = timeout {
                config.join_timeout_secs = parse_duration(&timeout)?.as_secs().max(1);
            }
            let mut node = node_client(&config, cli.coordinator, group, client, role);
            if let Some(size) = group_size {
                node = node.with_group_size(size);
            }

            let rendezvous = node.join().await?;
            println!("{}", serde_json::to_string_pretty(&rendezvous.snapshot)?);
        }

        Commands::Complete {
            group,
            client,
            role,
        } => {
            node_client(&config, cli.coordinator, group, client, role)
                .complete()
                .await?;
        }

        Commands::Clear {
            group,
            client,
            role,
        } => {
            node_client(&config, cli.coordinator, group, client, role)
                .clear()
                .await?;
        }
    }

    Ok(())
}

fn node_client(
    config: &Config,
    coordinator: Option<String>,
    group: String,
    client: String,
    role: String,
) -> NodeClient {
    let node = NodeClient::from_config(group, client, role, config);
    match coordinator {
        Some(addr) => node.with_coordinator(addr),
        None => node,
    }
}
