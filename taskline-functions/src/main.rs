//! `Taskline` functions service -- auth, 2FA, and directory proxies.
//!
//! An axum HTTP server hosting the serverless-style functions the client
//! calls: the authenticate dispatcher, the 2FA code endpoints, and the
//! user directory. All platform access goes through a server API key;
//! user sessions never reach this process.
//!
//! # Usage
//!
//! ```bash
//! # Run on the default address 0.0.0.0:9400
//! TASKLINE_API_KEY=... cargo run --bin taskline-functions -- \
//!     --endpoint https://cloud.example.com/v1 --project proj-1
//!
//! # Run on a custom address with a mail relay
//! TASKLINE_API_KEY=... cargo run --bin taskline-functions -- \
//!     --bind 127.0.0.1:9500 --mail-relay-url https://mail.example.com/send
//! ```

use std::sync::Arc;

use clap::Parser;
use taskline_functions::config::{FunctionsCliArgs, FunctionsConfig};
use taskline_functions::server::{self, ServerState};

#[tokio::main]
async fn main() {
    let cli = FunctionsCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match FunctionsConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting taskline functions service");

    let state = match ServerState::from_config(&config) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!(error = %e, "failed to build service state");
            std::process::exit(1);
        }
    };

    match server::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "functions service listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "functions service task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start functions service");
            std::process::exit(1);
        }
    }
}
