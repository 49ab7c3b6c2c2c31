//! LSP message shapes for JSON-RPC communication.
//!
//! Only the slice of the protocol the engine speaks: document sync in,
//! diagnostics and work-done progress out.

use serde::{Deserialize, Serialize};
use settle_types::{
    Diagnostic, DiagnosticReport, DocumentKey, DocumentVersion, Generation, ProgressToken, Range,
};

pub(crate) const METHOD_NOT_FOUND: i64 = -32601;
pub(crate) const INVALID_PARAMS: i64 = -32602;
pub(crate) const INTERNAL_ERROR: i64 = -32603;
pub(crate) const REQUEST_CANCELLED: i64 = -32800;

#[derive(Debug, Serialize)]
pub(crate) struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    pub fn new(id: u64, method: &'static str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct Notification {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Notification {
    pub fn new(method: &'static str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

pub(crate) fn response(id: &serde_json::Value, result: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

pub(crate) fn error_response(id: &serde_json::Value, code: i64, message: &str) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message
        }
    })
}

/// Classification of an incoming JSON-RPC frame.
#[derive(Debug)]
pub(crate) enum Incoming {
    Request {
        id: serde_json::Value,
        method: String,
        params: serde_json::Value,
    },
    Notification {
        method: String,
        params: serde_json::Value,
    },
    /// Reply to a request we sent (e.g. `window/workDoneProgress/create`).
    Response,
}

pub(crate) fn parse_incoming(frame: &serde_json::Value) -> Option<Incoming> {
    let id = frame.get("id");
    let method = frame.get("method").and_then(|m| m.as_str());
    let params = frame
        .get("params")
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    let has_result_or_error = frame.get("result").is_some() || frame.get("error").is_some();

    match (id, method) {
        (Some(id), Some(method)) => Some(Incoming::Request {
            id: id.clone(),
            method: method.to_string(),
            params,
        }),
        (None, Some(method)) => Some(Incoming::Notification {
            method: method.to_string(),
            params,
        }),
        (Some(_), None) if has_result_or_error => Some(Incoming::Response),
        _ => None,
    }
}

// ── Incoming params ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct TextDocumentIdentifier {
    pub uri: DocumentKey,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TextDocumentItem {
    pub uri: DocumentKey,
    pub version: DocumentVersion,
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DidOpenParams {
    pub text_document: TextDocumentItem,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VersionedTextDocumentIdentifier {
    pub uri: DocumentKey,
    pub version: DocumentVersion,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentChange {
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DidChangeParams {
    pub text_document: VersionedTextDocumentIdentifier,
    pub content_changes: Vec<ContentChange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DidCloseParams {
    pub text_document: TextDocumentIdentifier,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DocumentDiagnosticParams {
    pub text_document: TextDocumentIdentifier,
    #[serde(default)]
    pub previous_result_id: Option<String>,
}

/// The `resultId` we hand out is the generation the report was computed
/// under, written as a bare number.
pub(crate) fn parse_result_id(result_id: Option<&str>) -> Option<Generation> {
    result_id
        .and_then(|id| id.parse::<u64>().ok())
        .map(Generation::new)
}

// ── Outgoing params ──────────────────────────────────────────────────

fn range_json(range: Range) -> serde_json::Value {
    serde_json::json!({
        "start": { "line": range.start.line, "character": range.start.character },
        "end": { "line": range.end.line, "character": range.end.character }
    })
}

pub(crate) fn diagnostic_json(diagnostic: &Diagnostic) -> serde_json::Value {
    serde_json::json!({
        "range": range_json(diagnostic.range()),
        "severity": diagnostic.severity().to_lsp(),
        "source": diagnostic.source(),
        "message": diagnostic.message()
    })
}

pub(crate) fn publish_diagnostics_params(
    key: &DocumentKey,
    report: &DiagnosticReport,
) -> serde_json::Value {
    let items: Vec<_> = report.items().iter().map(diagnostic_json).collect();
    serde_json::json!({
        "uri": key,
        "version": report.for_version(),
        "diagnostics": items
    })
}

/// `DocumentDiagnosticReport` result for `textDocument/diagnostic`.
pub(crate) fn document_diagnostic_report(report: &DiagnosticReport) -> serde_json::Value {
    let result_id = report.result_id().value().to_string();
    if report.is_full() {
        let items: Vec<_> = report.items().iter().map(diagnostic_json).collect();
        serde_json::json!({
            "kind": "full",
            "resultId": result_id,
            "items": items
        })
    } else {
        serde_json::json!({
            "kind": "unchanged",
            "resultId": result_id
        })
    }
}

pub(crate) fn progress_create_params(token: &ProgressToken) -> serde_json::Value {
    serde_json::json!({ "token": token })
}

pub(crate) fn progress_begin_params(
    token: &ProgressToken,
    title: &str,
    message: Option<&str>,
) -> serde_json::Value {
    let mut value = serde_json::json!({
        "kind": "begin",
        "title": title,
        "cancellable": false
    });
    if let Some(message) = message {
        value["message"] = serde_json::Value::from(message);
    }
    serde_json::json!({ "token": token, "value": value })
}

pub(crate) fn progress_report_params(token: &ProgressToken, message: &str) -> serde_json::Value {
    serde_json::json!({
        "token": token,
        "value": { "kind": "report", "message": message }
    })
}

pub(crate) fn progress_end_params(token: &ProgressToken) -> serde_json::Value {
    serde_json::json!({
        "token": token,
        "value": { "kind": "end" }
    })
}

/// Whether `uri` parses as an absolute URI.
pub(crate) fn is_valid_uri(uri: &DocumentKey) -> bool {
    url::Url::parse(uri.as_str()).is_ok()
}
