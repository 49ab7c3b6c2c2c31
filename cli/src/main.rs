//! settle - language server that publishes debounced diagnostics.
//!
//! Speaks LSP over stdin/stdout. Diagnostics come from the regex rules in
//! `~/.settle/config.toml`; logs go to `~/.settle/logs/settle.log` because
//! stdout carries the protocol.

mod backend;

use std::{
    fs::{self, OpenOptions},
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use settle_config::SettleConfig;
use settle_lsp::DiagnosticsServer;

use crate::backend::PatternBackend;

fn init_tracing(default_filter: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (log_file, init_warnings) = open_settle_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No log file: stay silent rather than write into the protocol stream.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_settle_log_file() -> (Option<(PathBuf, std::fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in settle_log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn settle_log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.settle/logs/settle.log
    if let Some(config_path) = SettleConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("settle.log"));
    }

    // Fallback: ./.settle/logs/settle.log
    candidates.push(PathBuf::from(".settle").join("logs").join("settle.log"));

    candidates
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = SettleConfig::load();
    let filter = match &config {
        Ok(Some(config)) => config.logging.filter.clone(),
        _ => settle_config::LoggingConfig::default().filter,
    };
    init_tracing(&filter);

    let config = match config {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("{e}; using defaults");
            SettleConfig::default()
        }
    };

    let backend = PatternBackend::from_config(&config.backend).context("building pattern backend")?;
    tracing::info!(rules = config.backend.rules.len(), "starting settle");

    DiagnosticsServer::new(Arc::new(backend), config.diagnostics)
        .serve(tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("serving client")?;

    tracing::info!("settle exiting");
    Ok(())
}
