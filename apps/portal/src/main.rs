use std::{path::PathBuf, process::ExitCode};

use anyhow::Context;
use clap::Parser;
use client_core::{resolve_error, ApiError};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod router;
mod views;

use commands::Command;
use views::PortalContext;

#[derive(Parser, Debug)]
#[command(name = "portal", about = "Command line front end for the course platform")]
struct Cli {
    /// Settings file; `portal.toml` in the working directory is used when present.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the configured backend URL.
    #[arg(long)]
    base_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let fallback = cli.command.fallback();
    match run(cli).await {
        Ok(lines) => {
            for line in lines {
                println!("{line}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            report(&err, fallback);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<Vec<String>> {
    let mut settings = config::load_settings(cli.config.as_deref())?;
    if let Some(base_url) = cli.base_url {
        settings.base_url = base_url;
    }
    let client_settings = settings.client_settings()?;
    tracing::info!(base_url = %client_settings.base_url, "portal starting");

    let ctx = PortalContext::new(&client_settings).context("failed to build http client")?;
    commands::run(&ctx, cli.command).await
}

fn report(err: &anyhow::Error, fallback: &str) {
    if let Some(body) = api_error(err).and_then(ApiError::server_error) {
        tracing::warn!(
            status = body.status,
            path = body.path.as_deref().unwrap_or("-"),
            "backend rejected request: {}",
            body.error
        );
    }
    let shown = failure_message(err, fallback);
    if let Some(cause) = hidden_cause(err, &shown) {
        tracing::warn!("command failed: {cause}");
    }
    eprintln!("error: {shown}");
}

fn api_error(err: &anyhow::Error) -> Option<&ApiError> {
    err.chain().find_map(|cause| cause.downcast_ref::<ApiError>())
}

/// Text shown to the user. API failures go through the resolver, anything
/// else prints its cause chain.
fn failure_message(err: &anyhow::Error, fallback: &str) -> String {
    match api_error(err) {
        Some(api_err) => resolve_error(api_err, fallback),
        None => format!("{err:#}"),
    }
}

/// Full cause chain, when the text shown to the user leaves it out.
fn hidden_cause(err: &anyhow::Error, shown: &str) -> Option<String> {
    let chain = format!("{err:#}");
    (chain != shown).then_some(chain)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
