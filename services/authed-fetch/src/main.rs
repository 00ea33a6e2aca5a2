//! authed-fetch
//!
//! Single-shot API client that:
//! 1. Loads the persisted credential (optionally seeded from the environment)
//! 2. Executes one call through the refresh-aware pipeline
//! 3. Prints the structured result as JSON and exits non-zero on failure

mod cli;
mod config;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use auth_client::{ApiResponse, ReqwestTransport, RequestPipeline};
use clap::Parser;
use credential_store::CredentialStore;
use notify_sink::ConsoleSink;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Args;
use crate::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    // JSON logs to stderr so stdout stays the response document
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %format!("{e:#}"), "authed-fetch failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the call succeeded.
async fn run() -> Result<bool> {
    let args = Args::parse();

    let config_path = Config::resolve_path(args.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.client.base_url,
        timeout_ms = config.client.timeout_ms,
        refresh_path = %config.client.refresh_path,
        credentials = %config.credentials.path.display(),
        "configuration loaded"
    );

    let store = Arc::new(
        CredentialStore::load(config.credentials.path.clone())
            .await
            .context("failed to open credential store")?,
    );
    if let Some(seed) = &config.seed {
        store
            .save(&seed.credential())
            .await
            .context("failed to seed credential store")?;
        info!("credential store seeded from environment");
    }

    let transport = Arc::new(
        ReqwestTransport::new(reqwest::Client::new(), config.client.base_url.as_str())
            .with_timeout(config.client.timeout()),
    );
    let pipeline = RequestPipeline::new(
        transport,
        store,
        Arc::new(ConsoleSink::new()),
        config.client.refresh_path.as_str(),
    );

    let response: ApiResponse<serde_json::Value> = pipeline.execute(args.descriptor()?).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(response.is_success())
}
