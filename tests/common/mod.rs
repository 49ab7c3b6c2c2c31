//! Shared test utilities and fixtures
//!
//! A scripted backend, a recording client, and a framed LSP client for
//! driving the stdio server over an in-memory pipe.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use settle_lsp::codec::{FrameReader, FrameWriter};
use settle_lsp::{
    BackendError, ClientSink, ComputeRequest, DiagnosticBackend, DiagnosticsOptions,
    DiagnosticsServer,
};
use settle_types::{
    Diagnostic, DiagnosticReport, DiagnosticSeverity, DocumentKey, DocumentVersion, Position,
    ProgressToken, Range,
};
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

pub fn key(name: &str) -> DocumentKey {
    DocumentKey::new(format!("file:///{name}"))
}

pub fn v(version: i32) -> DocumentVersion {
    DocumentVersion::new(version)
}

/// Flags every `invalid` after an optional delay.
#[derive(Clone, Default)]
pub struct WordBackend {
    delay: Duration,
    calls: Arc<AtomicUsize>,
    versions: Arc<Mutex<Vec<DocumentVersion>>>,
}

impl WordBackend {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn versions(&self) -> Vec<DocumentVersion> {
        self.versions.lock().unwrap().clone()
    }
}

impl DiagnosticBackend for WordBackend {
    fn compute(
        &self,
        request: ComputeRequest,
    ) -> BoxFuture<'static, Result<Vec<Diagnostic>, BackendError>> {
        let delay = self.delay;
        let calls = Arc::clone(&self.calls);
        let versions = Arc::clone(&self.versions);
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            versions.lock().unwrap().push(request.snapshot.version());
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let mut items = Vec::new();
            for (line, text) in request.snapshot.text().lines().enumerate() {
                for (col, word) in text.match_indices("invalid") {
                    items.push(Diagnostic::new(
                        Range::new(
                            Position::new(line as u32, col as u32),
                            Position::new(line as u32, (col + word.len()) as u32),
                        ),
                        DiagnosticSeverity::Error,
                        "cannot find 'invalid' in scope",
                        "word",
                    ));
                }
            }
            Ok(items)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Published(DocumentKey, DocumentVersion),
    Begin(ProgressToken, String),
    Report(ProgressToken, String),
    End(ProgressToken),
}

#[derive(Default)]
pub struct RecordingClient {
    events: Mutex<Vec<ClientEvent>>,
}

impl RecordingClient {
    pub fn events(&self) -> Vec<ClientEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn published(&self, key: &DocumentKey) -> Vec<DocumentVersion> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ClientEvent::Published(k, version) if &k == key => Some(version),
                _ => None,
            })
            .collect()
    }
}

impl ClientSink for RecordingClient {
    fn publish_diagnostics(&self, key: &DocumentKey, report: &DiagnosticReport) {
        self.events
            .lock()
            .unwrap()
            .push(ClientEvent::Published(key.clone(), report.for_version()));
    }

    fn progress_begin(&self, token: &ProgressToken, title: &str, _message: Option<&str>) {
        self.events
            .lock()
            .unwrap()
            .push(ClientEvent::Begin(token.clone(), title.to_string()));
    }

    fn progress_report(&self, token: &ProgressToken, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(ClientEvent::Report(token.clone(), message.to_string()));
    }

    fn progress_end(&self, token: &ProgressToken) {
        self.events
            .lock()
            .unwrap()
            .push(ClientEvent::End(token.clone()));
    }
}

/// Client end of a stdio session running on a background task.
pub struct LspClient {
    writer: FrameWriter<WriteHalf<DuplexStream>>,
    reader: FrameReader<ReadHalf<DuplexStream>>,
    next_id: u64,
    server: JoinHandle<anyhow::Result<()>>,
}

impl LspClient {
    pub fn spawn(backend: impl DiagnosticBackend, options: DiagnosticsOptions) -> Self {
        let (client_io, server_io) = tokio::io::duplex(256 * 1024);
        let (server_read, server_write) = tokio::io::split(server_io);
        let server = tokio::spawn(
            DiagnosticsServer::new(Arc::new(backend), options).serve(server_read, server_write),
        );
        let (client_read, client_write) = tokio::io::split(client_io);
        Self {
            writer: FrameWriter::new(client_write),
            reader: FrameReader::new(client_read),
            next_id: 1,
            server,
        }
    }

    /// Send a request and return its id.
    pub async fn request(&mut self, method: &str, params: serde_json::Value) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.writer
            .write_frame(&serde_json::json!({
                "jsonrpc": "2.0", "id": id, "method": method, "params": params
            }))
            .await
            .unwrap();
        id
    }

    pub async fn notify(&mut self, method: &str, params: serde_json::Value) {
        self.writer
            .write_frame(&serde_json::json!({
                "jsonrpc": "2.0", "method": method, "params": params
            }))
            .await
            .unwrap();
    }

    pub async fn next_message(&mut self) -> serde_json::Value {
        tokio::time::timeout(Duration::from_secs(5), self.reader.read_frame())
            .await
            .expect("timed out waiting for server message")
            .unwrap()
            .expect("server closed the stream")
    }

    /// Read until the reply to `id`, collecting whatever else arrives first.
    pub async fn response(&mut self, id: u64) -> (serde_json::Value, Vec<serde_json::Value>) {
        let mut others = Vec::new();
        loop {
            let message = self.next_message().await;
            if message["id"] == id && message.get("method").is_none() {
                return (message, others);
            }
            others.push(message);
        }
    }

    /// Read until a notification named `method`.
    pub async fn notification(&mut self, method: &str) -> serde_json::Value {
        loop {
            let message = self.next_message().await;
            if message["method"] == method && message.get("id").is_none() {
                return message;
            }
        }
    }

    pub async fn initialize(&mut self, capabilities: serde_json::Value) -> serde_json::Value {
        let id = self
            .request(
                "initialize",
                serde_json::json!({ "processId": null, "capabilities": capabilities }),
            )
            .await;
        let (reply, _) = self.response(id).await;
        self.notify("initialized", serde_json::json!({})).await;
        reply
    }

    pub async fn did_open(&mut self, uri: &str, version: i32, text: &str) {
        self.notify(
            "textDocument/didOpen",
            serde_json::json!({
                "textDocument": {
                    "uri": uri, "languageId": "swift", "version": version, "text": text
                }
            }),
        )
        .await;
    }

    pub async fn did_change(&mut self, uri: &str, version: i32, text: &str) {
        self.notify(
            "textDocument/didChange",
            serde_json::json!({
                "textDocument": { "uri": uri, "version": version },
                "contentChanges": [{ "text": text }]
            }),
        )
        .await;
    }

    /// Shut the session down cleanly and wait for the server task.
    pub async fn shutdown(mut self) {
        let id = self.request("shutdown", serde_json::Value::Null).await;
        let (reply, _) = self.response(id).await;
        assert!(reply["result"].is_null());
        self.notify("exit", serde_json::Value::Null).await;
        self.server.await.unwrap().unwrap();
    }
}
