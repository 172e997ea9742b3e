// SPDX-FileCopyrightText: 2026 Handoff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handoff - human handoff coordination for multi-channel chat.
//!
//! This is the binary entry point.

mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use handoff_config::HandoffConfig;

/// Handoff - route visitors to staff, escalate when nobody answers.
#[derive(Parser, Debug)]
#[command(name = "handoff", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP/WebSocket service and the escalation driver (default).
    Serve,
    /// Load and validate configuration, then exit.
    CheckConfig,
}

fn load_config(path: Option<&std::path::Path>) -> HandoffConfig {
    let loaded = match path {
        Some(path) => handoff_config::load_and_validate_path(path),
        None => handoff_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            handoff_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

/// Initialize tracing. `RUST_LOG` overrides `agent.log_level`.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "handoff={log_level},handoff_coordinator={log_level},handoff_gateway={log_level},\
             handoff_storage={log_level},handoff_twilio={log_level},warn"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::CheckConfig => {
            println!(
                "handoff: configuration ok (agent.name={}, gateway={}:{})",
                config.agent.name, config.gateway.host, config.gateway.port
            );
        }
        Commands::Serve => {
            init_tracing(&config.agent.log_level);
            if let Err(e) = serve::run_serve(config).await {
                tracing::error!(error = %e, "handoff service failed");
                std::process::exit(1);
            }
        }
    }
}
