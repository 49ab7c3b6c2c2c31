//! `~/.settle/config.toml` loading.
//!
//! Every table is optional; a missing file means all defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use settle_lsp::DiagnosticsOptions;
use settle_types::DiagnosticSeverity;

const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SettleConfig {
    pub diagnostics: DiagnosticsOptions,
    pub backend: BackendConfig,
    pub logging: LoggingConfig,
}

/// Rules of the pattern backend shipped with the binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Diagnostic source name reported to the client.
    pub source: String,
    pub rules: Vec<RuleConfig>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            source: "settle".to_string(),
            rules: vec![RuleConfig {
                pattern: r"\binvalid\b".to_string(),
                severity: DiagnosticSeverity::Error,
                message: "cannot find 'invalid' in scope".to_string(),
            }],
        }
    }
}

/// One regex rule: every match becomes a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RuleConfig {
    pub pattern: String,
    #[serde(default = "default_severity")]
    pub severity: DiagnosticSeverity,
    pub message: String,
}

fn default_severity() -> DiagnosticSeverity {
    DiagnosticSeverity::Error
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl SettleConfig {
    /// Load `~/.settle/config.toml`. `Ok(None)` when there is no file (or no
    /// home directory).
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            tracing::debug!("no home directory; using default config");
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".settle").join("config.toml"))
}
