//! Test doubles shared by the unit tests of this crate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use settle_types::{
    Diagnostic, DiagnosticReport, DiagnosticSeverity, DocumentKey, DocumentVersion, Position,
    ProgressToken, Range,
};

use crate::backend::{ComputeRequest, DiagnosticBackend};
use crate::client::ClientSink;
use crate::errors::BackendError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Sent {
    Publish(DocumentKey, DocumentVersion, usize),
    Begin(ProgressToken, String, Option<String>),
    Report(ProgressToken, String),
    End(ProgressToken),
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    sent: Mutex<Vec<Sent>>,
    reports: Mutex<Vec<(DocumentKey, DiagnosticReport)>>,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn published_versions(&self, key: &DocumentKey) -> Vec<DocumentVersion> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Publish(k, version, _) if &k == key => Some(version),
                _ => None,
            })
            .collect()
    }

    pub fn last_report(&self, key: &DocumentKey) -> Option<DiagnosticReport> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, report)| report.clone())
    }
}

impl ClientSink for RecordingSink {
    fn publish_diagnostics(&self, key: &DocumentKey, report: &DiagnosticReport) {
        self.sent.lock().unwrap().push(Sent::Publish(
            key.clone(),
            report.for_version(),
            report.items().len(),
        ));
        self.reports
            .lock()
            .unwrap()
            .push((key.clone(), report.clone()));
    }

    fn progress_begin(&self, token: &ProgressToken, title: &str, message: Option<&str>) {
        self.sent.lock().unwrap().push(Sent::Begin(
            token.clone(),
            title.to_string(),
            message.map(str::to_string),
        ));
    }

    fn progress_report(&self, token: &ProgressToken, message: &str) {
        self.sent
            .lock()
            .unwrap()
            .push(Sent::Report(token.clone(), message.to_string()));
    }

    fn progress_end(&self, token: &ProgressToken) {
        self.sent.lock().unwrap().push(Sent::End(token.clone()));
    }
}

/// Backend that flags every occurrence of the word `invalid`, after an
/// optional simulated delay. Scripted failures are consumed first.
///
/// Clones share their call log.
#[derive(Clone, Default)]
pub(crate) struct ScriptedBackend {
    delay: Duration,
    state: Arc<ScriptState>,
}

#[derive(Default)]
struct ScriptState {
    failures: Mutex<VecDeque<BackendError>>,
    calls: AtomicUsize,
    seen_versions: Mutex<Vec<DocumentVersion>>,
}

impl ScriptedBackend {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn fail_next(&self, error: BackendError) {
        self.state.failures.lock().unwrap().push_back(error);
    }

    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    pub fn seen_versions(&self) -> Vec<DocumentVersion> {
        self.state.seen_versions.lock().unwrap().clone()
    }
}

pub(crate) fn word_diagnostics(text: &str, word: &str) -> Vec<Diagnostic> {
    let mut items = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        for (col, _) in line.match_indices(word) {
            let start = Position::new(line_no as u32, col as u32);
            let end = Position::new(line_no as u32, (col + word.len()) as u32);
            items.push(Diagnostic::new(
                Range::new(start, end),
                DiagnosticSeverity::Error,
                format!("cannot find '{word}' in scope"),
                "scripted",
            ));
        }
    }
    items
}

impl DiagnosticBackend for ScriptedBackend {
    fn compute(
        &self,
        request: ComputeRequest,
    ) -> BoxFuture<'static, Result<Vec<Diagnostic>, BackendError>> {
        let delay = self.delay;
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            state.calls.fetch_add(1, Ordering::SeqCst);
            state
                .seen_versions
                .lock()
                .unwrap()
                .push(request.snapshot.version());
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Some(error) = state.failures.lock().unwrap().pop_front() {
                return Err(error);
            }
            Ok(word_diagnostics(request.snapshot.text(), "invalid"))
        })
    }
}
