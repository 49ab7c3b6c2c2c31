use std::sync::Arc;

use crate::{Diagnostic, DocumentKey, DocumentVersion, Generation};

/// Immutable result of one diagnostic computation.
///
/// A *full* report carries the complete item list for `for_version`. An
/// *unchanged* report tells a pull client that the result it already holds
/// is still valid, so it carries no items.
///
/// `result_id` is the generation the report was computed under. Versions
/// repeat across close and re-open; generations never do, so the id is
/// safe to hand to a client as a cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticReport {
    for_version: DocumentVersion,
    result_id: Generation,
    items: Arc<[Diagnostic]>,
    is_full: bool,
}

impl DiagnosticReport {
    #[must_use]
    pub fn full(
        for_version: DocumentVersion,
        result_id: Generation,
        items: Vec<Diagnostic>,
    ) -> Self {
        Self {
            for_version,
            result_id,
            items: items.into(),
            is_full: true,
        }
    }

    #[must_use]
    pub fn unchanged(for_version: DocumentVersion, result_id: Generation) -> Self {
        Self {
            for_version,
            result_id,
            items: Arc::from(Vec::new()),
            is_full: false,
        }
    }

    #[must_use]
    pub fn for_version(&self) -> DocumentVersion {
        self.for_version
    }

    #[must_use]
    pub fn result_id(&self) -> Generation {
        self.result_id
    }

    #[must_use]
    pub fn items(&self) -> &[Diagnostic] {
        &self.items
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.is_full
    }

    /// Whether `self` should replace `other` on the client.
    #[must_use]
    pub fn supersedes(&self, other: &Self) -> bool {
        self.for_version > other.for_version
    }
}

/// Document content handed to the analysis backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    key: DocumentKey,
    version: DocumentVersion,
    text: Arc<str>,
}

impl DocumentSnapshot {
    #[must_use]
    pub fn new(key: DocumentKey, version: DocumentVersion, text: impl Into<Arc<str>>) -> Self {
        Self {
            key,
            version,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    #[must_use]
    pub fn version(&self) -> DocumentVersion {
        self.version
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}
