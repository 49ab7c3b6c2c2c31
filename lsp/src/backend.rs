//! Seam to the analysis backend that actually produces diagnostics.

use futures_util::future::BoxFuture;
use settle_types::{Diagnostic, DocumentSnapshot, Generation};
use tokio::sync::watch;

use crate::errors::BackendError;

/// Cooperative cancellation flag handed to the backend.
///
/// Cancelling never aborts the backend's future; it only tells the backend
/// its result will be ignored so it may stop early.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

/// Owning side of a [`CancelToken`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    #[must_use]
    pub fn new() -> (Self, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancelToken { rx })
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl CancelToken {
    /// A token that is never cancelled.
    #[must_use]
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Pends forever otherwise.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            // Handle dropped without cancelling: nobody can cancel any more.
            std::future::pending::<()>().await;
        }
    }
}

/// One unit of work for the backend.
#[derive(Debug, Clone)]
pub struct ComputeRequest {
    pub snapshot: DocumentSnapshot,
    pub generation: Generation,
    pub cancel: CancelToken,
}

/// Produces diagnostics for a document snapshot.
///
/// Implementations may take arbitrarily long; the engine never holds a
/// document lock across the returned future.
pub trait DiagnosticBackend: Send + Sync + 'static {
    fn compute(&self, request: ComputeRequest)
    -> BoxFuture<'static, Result<Vec<Diagnostic>, BackendError>>;
}
