mod chart;
mod compose;
mod config;
mod error;
mod handlers;
mod mailer;
mod metrics;
mod models;
mod payload;
mod rate_limit;
mod render;
mod server;
mod state;
#[cfg(test)]
mod test_support;
mod validate;

use clap::Parser; // for cli
use std::process::ExitCode;
use tracing::error;

use crate::config::{Cli, Command, RelayConfig};

// this is main async function with tokio
#[tokio::main]
async fn main() -> ExitCode {
    // a .env next to the binary's working directory is optional
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bucks2bar=info,tower_http=info".into()),
        )
        .init();

    // parse cli arguments
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Compose(args)) => match compose::run(args).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("{e}");
                ExitCode::FAILURE
            }
        },
        Some(Command::CheckUsername { value }) => {
            if validate::is_strong_username(&value) {
                println!("valid");
                ExitCode::SUCCESS
            } else {
                println!("invalid: needs 8+ characters, an uppercase letter, a digit and one of !@#$&*");
                ExitCode::FAILURE
            }
        }
        Some(Command::Serve(args)) => serve(args).await,
        None => serve(cli.serve).await,
    }
}

async fn serve(args: config::ServeArgs) -> ExitCode {
    let config = match RelayConfig::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match server::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "relay failed");
            ExitCode::FAILURE
        }
    }
}
