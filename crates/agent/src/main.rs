// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::error;

use gateway_agent::config::AgentConfig;

#[derive(Parser)]
#[command(name = "gateway-agent", version, about = "Mobile-coding gateway Agent.")]
struct Cli {
    #[command(flatten)]
    config: AgentConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.config.log_level.clone())),
        )
        .init();

    if let Err(e) = cli.config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    let shutdown = CancellationToken::new();
    let shutdown_on_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_on_signal.cancel();
    });

    if let Err(e) = gateway_agent::run(cli.config, shutdown).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
