//! `DiagnosticsEngine` facade: the one type a server session talks to.
//!
//! Construction negotiates the delivery mode and wires the coordinator,
//! dispatcher and progress debouncer together. Everything after that is
//! document sync in, reports out.

use std::sync::Arc;

use settle_types::{DiagnosticReport, DocumentKey, DocumentVersion, Generation};
use tokio::sync::mpsc;

use crate::backend::DiagnosticBackend;
use crate::client::ClientSink;
use crate::coordinator::Coordinator;
use crate::dispatcher::{DeliveryMode, Dispatcher};
use crate::errors::DiagnosticsError;
use crate::progress::ProgressDebouncer;
use crate::types::{ClientCapabilities, DiagnosticsOptions, EngineEvent};

pub struct DiagnosticsEngine {
    coordinator: Coordinator,
    progress: Arc<ProgressDebouncer>,
}

impl DiagnosticsEngine {
    /// Must be called from within a tokio runtime.
    pub fn new(
        backend: Arc<dyn DiagnosticBackend>,
        sink: Arc<dyn ClientSink>,
        options: &DiagnosticsOptions,
        capabilities: ClientCapabilities,
        events: Option<mpsc::Sender<EngineEvent>>,
    ) -> Self {
        let mode = DeliveryMode::negotiate(&capabilities, options);
        let progress = Arc::new(ProgressDebouncer::new(
            Arc::clone(&sink),
            options.progress_debounce(),
            capabilities.work_done_progress,
        ));
        let computation_progress = options
            .computation_progress
            .then(|| Arc::clone(&progress));

        tracing::info!(
            ?mode,
            publish_debounce_ms = options.publish_debounce_ms,
            progress_debounce_ms = options.progress_debounce_ms,
            work_done_progress = capabilities.work_done_progress,
            "diagnostics engine started"
        );

        Self {
            coordinator: Coordinator::new(
                backend,
                Dispatcher::new(mode, sink),
                computation_progress,
                options.publish_debounce(),
                events,
            ),
            progress,
        }
    }

    #[must_use]
    pub fn mode(&self) -> DeliveryMode {
        self.coordinator.dispatcher().mode()
    }

    #[must_use]
    pub fn is_open(&self, key: &DocumentKey) -> bool {
        self.coordinator.is_open(key)
    }

    pub fn open(&self, key: DocumentKey, version: DocumentVersion, text: impl Into<Arc<str>>) {
        self.coordinator.open(key, version, text);
    }

    pub fn edit(
        &self,
        key: &DocumentKey,
        version: DocumentVersion,
        text: impl Into<Arc<str>>,
    ) -> Result<(), DiagnosticsError> {
        self.coordinator.edit(key, version, text)
    }

    pub fn close(&self, key: &DocumentKey) -> bool {
        self.coordinator.close(key)
    }

    /// Answer a `textDocument/diagnostic` request. Served in both delivery
    /// modes; the mode only decides whether reports are also pushed.
    pub async fn pull(
        &self,
        key: &DocumentKey,
        known_version: Option<DocumentVersion>,
        previous_result_id: Option<Generation>,
    ) -> Result<DiagnosticReport, DiagnosticsError> {
        self.coordinator
            .request(key, known_version, previous_result_id)
            .await
    }

    /// Progress debouncer for other background work of the session.
    #[must_use]
    pub fn progress(&self) -> &Arc<ProgressDebouncer> {
        &self.progress
    }
}
