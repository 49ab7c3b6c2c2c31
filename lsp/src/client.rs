//! Seam to the editor: everything the engine sends to the client.

use std::sync::atomic::{AtomicU64, Ordering};

use settle_types::{DiagnosticReport, DocumentKey, ProgressToken};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::codec::FrameWriter;
use crate::protocol::{self, Notification, Request};

/// Outgoing client notifications.
///
/// Calls must not block: implementations queue and return.
pub trait ClientSink: Send + Sync + 'static {
    fn publish_diagnostics(&self, key: &DocumentKey, report: &DiagnosticReport);
    fn progress_begin(&self, token: &ProgressToken, title: &str, message: Option<&str>);
    fn progress_report(&self, token: &ProgressToken, message: &str);
    fn progress_end(&self, token: &ProgressToken);
}

pub(crate) enum WriterCommand {
    Send(serde_json::Value),
    Shutdown,
}

/// Queue of frames waiting for the writer task.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<WriterCommand>,
}

impl Outbox {
    /// Spawn a writer task that frames every queued message onto `writer`.
    pub fn spawn<W>(writer: W) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(async move {
            let mut writer = FrameWriter::new(writer);
            while let Some(command) = rx.recv().await {
                match command {
                    WriterCommand::Send(frame) => {
                        if let Err(e) = writer.write_frame(&frame).await {
                            tracing::warn!("client write error: {e}");
                            break;
                        }
                    }
                    WriterCommand::Shutdown => break,
                }
            }
        });
        (Self { tx }, handle)
    }

    pub(crate) fn send(&self, frame: serde_json::Value) {
        if self.tx.send(WriterCommand::Send(frame)).is_err() {
            tracing::debug!("dropping outgoing frame: writer has stopped");
        }
    }

    /// Ask the writer to stop after flushing everything queued so far.
    pub fn shutdown(&self) {
        let _ = self.tx.send(WriterCommand::Shutdown);
    }
}

/// [`ClientSink`] that speaks LSP over a framed JSON-RPC stream.
pub struct FramedClient {
    outbox: Outbox,
    next_request_id: AtomicU64,
}

impl FramedClient {
    pub fn new(outbox: Outbox) -> Self {
        Self {
            outbox,
            next_request_id: AtomicU64::new(1),
        }
    }

    fn notify(&self, method: &'static str, params: serde_json::Value) {
        match serde_json::to_value(Notification::new(method, Some(params))) {
            Ok(frame) => self.outbox.send(frame),
            Err(e) => tracing::warn!("failed to serialize {method}: {e}"),
        }
    }

    fn request(&self, method: &'static str, params: serde_json::Value) {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        match serde_json::to_value(Request::new(id, method, Some(params))) {
            Ok(frame) => self.outbox.send(frame),
            Err(e) => tracing::warn!("failed to serialize {method}: {e}"),
        }
    }
}

impl ClientSink for FramedClient {
    fn publish_diagnostics(&self, key: &DocumentKey, report: &DiagnosticReport) {
        self.notify(
            "textDocument/publishDiagnostics",
            protocol::publish_diagnostics_params(key, report),
        );
    }

    fn progress_begin(&self, token: &ProgressToken, title: &str, message: Option<&str>) {
        // The token must exist on the client before the first `$/progress`.
        self.request(
            "window/workDoneProgress/create",
            protocol::progress_create_params(token),
        );
        self.notify(
            "$/progress",
            protocol::progress_begin_params(token, title, message),
        );
    }

    fn progress_report(&self, token: &ProgressToken, message: &str) {
        self.notify(
            "$/progress",
            protocol::progress_report_params(token, message),
        );
    }

    fn progress_end(&self, token: &ProgressToken) {
        self.notify("$/progress", protocol::progress_end_params(token));
    }
}
