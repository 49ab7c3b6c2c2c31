//! Per-document generation stamps.
//!
//! Stamps come from one counter shared by every document, so a generation is
//! never reissued: a result computed before a close can never look current
//! to a later session of the same document.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use settle_types::{DocumentKey, Generation};

#[derive(Default)]
struct Stamps {
    last_issued: Generation,
    by_key: HashMap<DocumentKey, Generation>,
}

#[derive(Default)]
pub struct GenerationCounter {
    stamps: Mutex<Stamps>,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn stamps(&self) -> MutexGuard<'_, Stamps> {
        self.stamps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advance the generation of `key` and return the new value.
    pub fn bump(&self, key: &DocumentKey) -> Generation {
        let mut stamps = self.stamps();
        let next = stamps.last_issued.next();
        stamps.last_issued = next;
        stamps.by_key.insert(key.clone(), next);
        next
    }

    /// Current generation of `key`; [`Generation::ZERO`] if never bumped.
    #[must_use]
    pub fn current(&self, key: &DocumentKey) -> Generation {
        self.stamps()
            .by_key
            .get(key)
            .copied()
            .unwrap_or(Generation::ZERO)
    }

    #[must_use]
    pub fn is_current(&self, key: &DocumentKey, generation: Generation) -> bool {
        self.current(key) == generation
    }

    pub fn forget(&self, key: &DocumentKey) {
        self.stamps().by_key.remove(key);
    }
}
