//! Public configuration and event types.
//!
//! The binary deserializes [`DiagnosticsOptions`] from the `[diagnostics]`
//! config table, negotiates [`ClientCapabilities`] at `initialize`, and may
//! drain [`EngineEvent`]s for observability.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Deserialize;
use settle_types::{DocumentKey, DocumentVersion};

const DEFAULT_PUBLISH_DEBOUNCE_MS: u64 = 2_000;

const fn default_publish_debounce_ms() -> u64 {
    DEFAULT_PUBLISH_DEBOUNCE_MS
}

/// Opt-in behaviours that are not on by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExperimentalFeature {
    /// Serve `textDocument/diagnostic` to clients that support it instead
    /// of pushing `publishDiagnostics`.
    PullDiagnostics,
}

/// Construction-time settings of the diagnostics engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DiagnosticsOptions {
    /// Quiet time after an edit before diagnostics are recomputed.
    /// Default: 2000.
    pub publish_debounce_ms: u64,
    /// How long a background task must run before its progress is shown.
    /// Default: 0.
    pub progress_debounce_ms: u64,
    /// Wrap each diagnostic computation in a work-done progress task.
    pub computation_progress: bool,
    pub experimental_features: BTreeSet<ExperimentalFeature>,
}

impl Default for DiagnosticsOptions {
    fn default() -> Self {
        Self {
            publish_debounce_ms: default_publish_debounce_ms(),
            progress_debounce_ms: 0,
            computation_progress: false,
            experimental_features: BTreeSet::new(),
        }
    }
}

impl DiagnosticsOptions {
    #[must_use]
    pub fn publish_debounce(&self) -> Duration {
        Duration::from_millis(self.publish_debounce_ms)
    }

    #[must_use]
    pub fn progress_debounce(&self) -> Duration {
        Duration::from_millis(self.progress_debounce_ms)
    }

    #[must_use]
    pub fn is_enabled(&self, feature: ExperimentalFeature) -> bool {
        self.experimental_features.contains(&feature)
    }

    /// Options with no debounce, as used by tests.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            publish_debounce_ms: 0,
            ..Self::default()
        }
    }
}

/// What the client declared at `initialize`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientCapabilities {
    /// `textDocument.diagnostic` is present.
    pub pull_diagnostics: bool,
    /// `window.workDoneProgress` is true.
    pub work_done_progress: bool,
}

impl ClientCapabilities {
    /// Read the capabilities the engine cares about from `initialize` params.
    #[must_use]
    pub fn from_initialize_params(params: &serde_json::Value) -> Self {
        let capabilities = &params["capabilities"];
        Self {
            pull_diagnostics: capabilities["textDocument"]["diagnostic"].is_object(),
            work_done_progress: capabilities["window"]["workDoneProgress"]
                .as_bool()
                .unwrap_or(false),
        }
    }
}

/// Observability events emitted by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A fresh report was produced (and published, in push mode).
    Published {
        key: DocumentKey,
        version: DocumentVersion,
    },
    /// The backend failed for one cycle.
    ComputationFailed { key: DocumentKey, message: String },
    /// The backend rejected pull-style diagnostics. Emitted once per session.
    PullUnsupported { reason: String },
}
