//! Coordinator status poller
//!
//! Exit codes: 0 clean, 1 warnings, 2 errors.

use nodesync::common::Config;
use nodesync::ops::{check, PollerSettings};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(2);
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let addr = config.coordinator_addr();
    let report = check(&addr, &PollerSettings::from_config(&config)).await;

    for warning in &report.warnings {
        println!("warning: {}", warning);
    }
    for error in &report.errors {
        println!("error: {}", error);
    }
    if report.is_clean() {
        println!("coordinator at {} OK", addr);
    }

    ExitCode::from(&report)
}
