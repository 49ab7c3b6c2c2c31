//! Delivery of finished reports to the client.

use std::sync::{Arc, Mutex, PoisonError};

use settle_types::{DiagnosticReport, DocumentKey, Generation};

use crate::client::ClientSink;
use crate::types::{ClientCapabilities, DiagnosticsOptions, ExperimentalFeature};

/// How diagnostics reach the client. Fixed for the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// The server publishes every fresh report unprompted.
    Push,
    /// The client asks with `textDocument/diagnostic`.
    Pull,
}

impl DeliveryMode {
    #[must_use]
    pub fn negotiate(capabilities: &ClientCapabilities, options: &DiagnosticsOptions) -> Self {
        if capabilities.pull_diagnostics && options.is_enabled(ExperimentalFeature::PullDiagnostics)
        {
            Self::Pull
        } else {
            Self::Push
        }
    }
}

pub struct Dispatcher {
    mode: DeliveryMode,
    sink: Arc<dyn ClientSink>,
    /// Set once the backend has refused a diagnostics request.
    unsupported: Mutex<Option<String>>,
}

impl Dispatcher {
    pub fn new(mode: DeliveryMode, sink: Arc<dyn ClientSink>) -> Self {
        Self {
            mode,
            sink,
            unsupported: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Hand a fresh report to the client. Only push mode publishes.
    pub fn deliver(&self, key: &DocumentKey, report: &DiagnosticReport) {
        match self.mode {
            DeliveryMode::Push => {
                tracing::debug!(
                    %key,
                    version = %report.for_version(),
                    items = report.items().len(),
                    "publishing diagnostics"
                );
                self.sink.publish_diagnostics(key, report);
            }
            DeliveryMode::Pull => {}
        }
    }

    /// Shape a report for a pull reply. A client that already holds this
    /// exact result gets an unchanged report.
    #[must_use]
    pub fn answer(
        report: &DiagnosticReport,
        previous_result_id: Option<Generation>,
    ) -> DiagnosticReport {
        if previous_result_id == Some(report.result_id()) {
            DiagnosticReport::unchanged(report.for_version(), report.result_id())
        } else {
            report.clone()
        }
    }

    /// Remember that pull diagnostics are unavailable for the rest of the
    /// session. Returns `true` only for the first call.
    pub fn mark_unsupported(&self, reason: &str) -> bool {
        let mut unsupported = self
            .unsupported
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if unsupported.is_some() {
            return false;
        }
        *unsupported = Some(reason.to_string());
        true
    }

    #[must_use]
    pub fn unsupported_reason(&self) -> Option<String> {
        self.unsupported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
