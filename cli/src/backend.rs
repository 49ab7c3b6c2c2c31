//! Regex-rule backend: every rule match in a document becomes a diagnostic.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use regex::Regex;
use settle_config::BackendConfig;
use settle_lsp::{BackendError, ComputeRequest, DiagnosticBackend};
use settle_types::{Diagnostic, DiagnosticSeverity, Position, Range};

struct Rule {
    regex: Regex,
    severity: DiagnosticSeverity,
    message: String,
}

struct Scanner {
    source: String,
    rules: Vec<Rule>,
}

/// Scans run on the blocking pool, so a large document never stalls the
/// runtime or the document's worker.
pub struct PatternBackend {
    scanner: Arc<Scanner>,
}

impl PatternBackend {
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        let rules = config
            .rules
            .iter()
            .map(|rule| {
                let regex = Regex::new(&rule.pattern)
                    .with_context(|| format!("invalid rule pattern {:?}", rule.pattern))?;
                tracing::debug!(
                    pattern = %rule.pattern,
                    severity = rule.severity.label(),
                    "loaded diagnostic rule"
                );
                Ok(Rule {
                    regex,
                    severity: rule.severity,
                    message: rule.message.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            scanner: Arc::new(Scanner {
                source: config.source.clone(),
                rules,
            }),
        })
    }
}

impl Scanner {
    fn scan(&self, request: &ComputeRequest) -> Result<Vec<Diagnostic>, BackendError> {
        let mut items = Vec::new();
        for (line_no, line) in request.snapshot.text().split('\n').enumerate() {
            if request.cancel.is_cancelled() {
                return Err(BackendError::failed("computation cancelled"));
            }
            let line = line.strip_suffix('\r').unwrap_or(line);
            for rule in &self.rules {
                for found in rule.regex.find_iter(line) {
                    let start = Position::new(line_no as u32, utf16_column(line, found.start()));
                    let end = Position::new(line_no as u32, utf16_column(line, found.end()));
                    items.push(Diagnostic::new(
                        Range::new(start, end),
                        rule.severity,
                        rule.message.clone(),
                        self.source.clone(),
                    ));
                }
            }
        }
        Ok(items)
    }
}

/// Column of byte offset `byte` in UTF-16 code units, as LSP counts them.
fn utf16_column(line: &str, byte: usize) -> u32 {
    line[..byte].encode_utf16().count() as u32
}

impl DiagnosticBackend for PatternBackend {
    fn compute(
        &self,
        request: ComputeRequest,
    ) -> BoxFuture<'static, Result<Vec<Diagnostic>, BackendError>> {
        let scanner = Arc::clone(&self.scanner);
        Box::pin(async move {
            tokio::task::spawn_blocking(move || scanner.scan(&request))
                .await
                .unwrap_or_else(|e| {
                    Err(BackendError::failed(format!("pattern scan aborted: {e}")))
                })
        })
    }
}
