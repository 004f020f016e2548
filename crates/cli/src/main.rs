//! `convlab` -- terminal client for the GPU convolution backend.
//!
//! Submits images for convolution, follows streamed progress and records
//! run timings for speedup and efficiency comparisons.
//!
//! # Environment variables
//!
//! | Variable                       | Required | Default | Description                          |
//! |--------------------------------|----------|---------|--------------------------------------|
//! | `CONVLAB_API_URL`              | yes      | --      | Backend base URL, e.g. `http://localhost:8000` |
//! | `CONVLAB_CONNECT_TIMEOUT_SECS` | no       | `10`    | TCP connect timeout                  |
//! | `CONVLAB_REQUEST_TIMEOUT_SECS` | no       | `120`   | Timeout for `/health` and `/convolve` |

use std::process::ExitCode;

use clap::Parser;
use convlab_cli::args::Cli;
use convlab_cli::commands;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "convlab=info,convlab_cli=info,convlab_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = format!("{e:#}"), "convlab failed");
            ExitCode::FAILURE
        }
    }
}
