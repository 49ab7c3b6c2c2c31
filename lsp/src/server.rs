//! Stdio session loop: reads client frames, drives the engine, writes
//! replies through the shared outbox.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::backend::DiagnosticBackend;
use crate::client::{ClientSink, FramedClient, Outbox};
use crate::codec::{CodecError, FrameReader};
use crate::dispatcher::DeliveryMode;
use crate::engine::DiagnosticsEngine;
use crate::errors::DiagnosticsError;
use crate::protocol::{
    self, DidChangeParams, DidCloseParams, DidOpenParams, DocumentDiagnosticParams, Incoming,
};
use crate::types::{ClientCapabilities, DiagnosticsOptions, EngineEvent};

const SERVER_NOT_INITIALIZED: i64 = -32002;

/// JSON-RPC error code for a failed pull.
fn error_code(error: &DiagnosticsError) -> i64 {
    match error {
        DiagnosticsError::Unsupported { .. } => protocol::METHOD_NOT_FOUND,
        DiagnosticsError::ClosedDuringWait => protocol::REQUEST_CANCELLED,
        DiagnosticsError::ComputationFailed { .. } => protocol::INTERNAL_ERROR,
        DiagnosticsError::UnknownDocument { .. } => protocol::INVALID_PARAMS,
    }
}

fn initialize_result(mode: DeliveryMode) -> serde_json::Value {
    let mut capabilities = serde_json::json!({
        "textDocumentSync": {
            "openClose": true,
            "change": 1
        }
    });
    if mode == DeliveryMode::Pull {
        capabilities["diagnosticProvider"] = serde_json::json!({
            "interFileDependencies": false,
            "workspaceDiagnostics": false
        });
    }
    serde_json::json!({
        "capabilities": capabilities,
        "serverInfo": {
            "name": "settle",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// A diagnostics language server over one byte-stream pair.
pub struct DiagnosticsServer {
    backend: Arc<dyn DiagnosticBackend>,
    options: DiagnosticsOptions,
    events: Option<mpsc::Sender<EngineEvent>>,
}

impl DiagnosticsServer {
    pub fn new(backend: Arc<dyn DiagnosticBackend>, options: DiagnosticsOptions) -> Self {
        Self {
            backend,
            options,
            events: None,
        }
    }

    /// Forward engine events to `events` for the lifetime of the session.
    #[must_use]
    pub fn with_events(mut self, events: mpsc::Sender<EngineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Serve one client until `exit` or end of input.
    pub async fn serve<R, W>(self, input: R, output: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbox, writer) = Outbox::spawn(output);
        let mut session = Session {
            server: self,
            sink: Arc::new(FramedClient::new(outbox.clone())),
            outbox: outbox.clone(),
            engine: None,
            shutdown_requested: false,
        };

        let mut reader = FrameReader::new(input);
        loop {
            let frame = match reader.read_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    tracing::info!("client closed input");
                    break;
                }
                Err(CodecError::Json(e)) => {
                    tracing::warn!("skipping malformed client message: {e}");
                    continue;
                }
                Err(e) => return Err(e).context("reading client message"),
            };

            let Some(incoming) = protocol::parse_incoming(&frame) else {
                tracing::trace!("ignoring frame that is neither request nor notification");
                continue;
            };
            match incoming {
                Incoming::Request { id, method, params } => {
                    session.handle_request(id, &method, params);
                }
                Incoming::Notification { method, params } => {
                    if session.handle_notification(&method, params) == Flow::Exit {
                        break;
                    }
                }
                Incoming::Response => {
                    tracing::trace!("ignoring client response");
                }
            }
        }

        if !session.shutdown_requested {
            tracing::warn!("session ended without shutdown request");
        }
        // Drop the engine first so document workers stop before the writer.
        session.engine = None;
        outbox.shutdown();
        writer.await.context("joining client writer")?;
        Ok(())
    }
}

struct Session {
    server: DiagnosticsServer,
    sink: Arc<dyn ClientSink>,
    outbox: Outbox,
    engine: Option<Arc<DiagnosticsEngine>>,
    shutdown_requested: bool,
}

impl Session {
    fn reply(&self, id: &serde_json::Value, result: serde_json::Value) {
        self.outbox.send(protocol::response(id, result));
    }

    fn reply_error(&self, id: &serde_json::Value, code: i64, message: &str) {
        self.outbox.send(protocol::error_response(id, code, message));
    }

    fn handle_request(&mut self, id: serde_json::Value, method: &str, params: serde_json::Value) {
        match method {
            "initialize" => self.initialize(&id, &params),
            "shutdown" => {
                self.shutdown_requested = true;
                self.reply(&id, serde_json::Value::Null);
            }
            "textDocument/diagnostic" => self.diagnostic(id, params),
            _ => {
                tracing::debug!("unhandled request: {method}");
                self.reply_error(
                    &id,
                    protocol::METHOD_NOT_FOUND,
                    &format!("Method not found: {method}"),
                );
            }
        }
    }

    fn initialize(&mut self, id: &serde_json::Value, params: &serde_json::Value) {
        if self.engine.is_some() {
            self.reply_error(id, protocol::INVALID_PARAMS, "server already initialized");
            return;
        }
        let capabilities = ClientCapabilities::from_initialize_params(params);
        let engine = DiagnosticsEngine::new(
            Arc::clone(&self.server.backend),
            Arc::clone(&self.sink),
            &self.server.options,
            capabilities,
            self.server.events.clone(),
        );
        self.reply(id, initialize_result(engine.mode()));
        self.engine = Some(Arc::new(engine));
    }

    /// Pulls can wait for a whole debounce cycle, so each one runs on its
    /// own task and replies when its report is ready.
    fn diagnostic(&self, id: serde_json::Value, params: serde_json::Value) {
        let Some(engine) = self.engine.clone() else {
            self.reply_error(&id, SERVER_NOT_INITIALIZED, "server not initialized");
            return;
        };
        let params = match serde_json::from_value::<DocumentDiagnosticParams>(params) {
            Ok(params) => params,
            Err(e) => {
                self.reply_error(&id, protocol::INVALID_PARAMS, &e.to_string());
                return;
            }
        };

        let outbox = self.outbox.clone();
        tokio::spawn(async move {
            let key = params.text_document.uri;
            let previous = protocol::parse_result_id(params.previous_result_id.as_deref());
            let frame = match engine.pull(&key, None, previous).await {
                Ok(report) => protocol::response(&id, protocol::document_diagnostic_report(&report)),
                Err(e) => {
                    tracing::debug!(%key, "diagnostic request failed: {e}");
                    protocol::error_response(&id, error_code(&e), &e.to_string())
                }
            };
            outbox.send(frame);
        });
    }

    fn handle_notification(&mut self, method: &str, params: serde_json::Value) -> Flow {
        match method {
            "initialized" => tracing::debug!("client initialized"),
            "exit" => return Flow::Exit,
            "textDocument/didOpen" => self.did_open(params),
            "textDocument/didChange" => self.did_change(params),
            "textDocument/didClose" => self.did_close(params),
            _ => tracing::trace!("ignoring notification: {method}"),
        }
        Flow::Continue
    }

    fn engine_for(&self, method: &str) -> Option<&DiagnosticsEngine> {
        let engine = self.engine.as_deref();
        if engine.is_none() {
            tracing::warn!("{method} before initialize; ignoring");
        }
        engine
    }

    fn did_open(&self, params: serde_json::Value) {
        let Some(engine) = self.engine_for("didOpen") else {
            return;
        };
        match serde_json::from_value::<DidOpenParams>(params) {
            Ok(params) => {
                let document = params.text_document;
                if !protocol::is_valid_uri(&document.uri) {
                    tracing::warn!(uri = %document.uri, "ignoring didOpen with invalid URI");
                    return;
                }
                engine.open(document.uri, document.version, document.text);
            }
            Err(e) => tracing::warn!("malformed didOpen params: {e}"),
        }
    }

    fn did_change(&self, params: serde_json::Value) {
        let Some(engine) = self.engine_for("didChange") else {
            return;
        };
        let mut params = match serde_json::from_value::<DidChangeParams>(params) {
            Ok(params) => params,
            Err(e) => {
                tracing::warn!("malformed didChange params: {e}");
                return;
            }
        };
        // Full sync: the last change carries the whole document.
        let Some(change) = params.content_changes.pop() else {
            return;
        };
        let document = params.text_document;
        if let Err(e) = engine.edit(&document.uri, document.version, change.text) {
            tracing::warn!("didChange rejected: {e}");
        }
    }

    fn did_close(&self, params: serde_json::Value) {
        let Some(engine) = self.engine_for("didClose") else {
            return;
        };
        match serde_json::from_value::<DidCloseParams>(params) {
            Ok(params) => {
                engine.close(&params.text_document.uri);
            }
            Err(e) => tracing::warn!("malformed didClose params: {e}"),
        }
    }
}
