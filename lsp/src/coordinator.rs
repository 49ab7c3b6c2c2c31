//! Per-document scheduling of diagnostic computations.
//!
//! Every open document gets one worker task that owns its state and drains
//! a command queue. All mutations of a document happen on that task, so at
//! most one computation per document is ever in flight and results are
//! applied in the order they arrive. Documents never wait on each other.
//!
//! The backend runs on its own task. Its result comes back to the worker as
//! a command tagged with the generation it was started under; if the
//! document has moved on since, the result is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use settle_types::{
    Diagnostic, DiagnosticReport, DocumentKey, DocumentSnapshot, DocumentVersion, Generation,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::backend::{CancelHandle, ComputeRequest, DiagnosticBackend};
use crate::debounce::{ArmId, Debouncer};
use crate::dispatcher::Dispatcher;
use crate::errors::{BackendError, DiagnosticsError};
use crate::generation::GenerationCounter;
use crate::progress::{ProgressDebouncer, ProgressHandle};
use crate::types::EngineEvent;

const COMPUTING_TITLE: &str = "Computing diagnostics";

/// Timer slot of one open session of a document. A re-opened document gets
/// a fresh slot, so the old worker cannot disturb the new one's timer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TimerKey {
    key: DocumentKey,
    session: u64,
}

type PullReply = oneshot::Sender<Result<DiagnosticReport, DiagnosticsError>>;

enum Command {
    Edit {
        snapshot: DocumentSnapshot,
        generation: Generation,
    },
    TimerFired {
        arm: ArmId,
    },
    Computed {
        generation: Generation,
        result: Result<Vec<Diagnostic>, BackendError>,
    },
    Pull {
        known_version: Option<DocumentVersion>,
        previous_result_id: Option<Generation>,
        reply: PullReply,
    },
    Close,
}

/// State every worker reads.
struct Shared {
    backend: Arc<dyn DiagnosticBackend>,
    generations: GenerationCounter,
    timers: Debouncer<TimerKey>,
    dispatcher: Dispatcher,
    /// Present when computations are wrapped in progress tasks.
    progress: Option<Arc<ProgressDebouncer>>,
    debounce: Duration,
    events: Option<mpsc::Sender<EngineEvent>>,
}

impl Shared {
    fn emit(&self, event: EngineEvent) {
        let Some(events) = &self.events else {
            return;
        };
        if let Err(e) = events.try_send(event) {
            tracing::debug!("dropping engine event: {e}");
        }
    }
}

pub struct Coordinator {
    shared: Arc<Shared>,
    workers: Mutex<HashMap<DocumentKey, mpsc::UnboundedSender<Command>>>,
    next_session: AtomicU64,
}

impl Coordinator {
    pub fn new(
        backend: Arc<dyn DiagnosticBackend>,
        dispatcher: Dispatcher,
        progress: Option<Arc<ProgressDebouncer>>,
        debounce: Duration,
        events: Option<mpsc::Sender<EngineEvent>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                generations: GenerationCounter::new(),
                timers: Debouncer::new(),
                dispatcher,
                progress,
                debounce,
                events,
            }),
            workers: Mutex::new(HashMap::new()),
            next_session: AtomicU64::new(1),
        }
    }

    fn workers(&self) -> MutexGuard<'_, HashMap<DocumentKey, mpsc::UnboundedSender<Command>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.shared.dispatcher
    }

    #[must_use]
    pub fn is_open(&self, key: &DocumentKey) -> bool {
        self.workers().contains_key(key)
    }

    /// Start tracking a document and schedule its first computation.
    ///
    /// Opening a key that is already open ends the previous session first.
    pub fn open(&self, key: DocumentKey, version: DocumentVersion, text: impl Into<Arc<str>>) {
        let mut workers = self.workers();
        if let Some(previous) = workers.remove(&key) {
            tracing::debug!(%key, "document re-opened; closing previous session");
            self.shared.generations.forget(&key);
            let _ = previous.send(Command::Close);
        }

        let generation = self.shared.generations.bump(&key);
        let timer_key = TimerKey {
            key: key.clone(),
            session: self.next_session.fetch_add(1, Ordering::Relaxed),
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let snapshot = DocumentSnapshot::new(key.clone(), version, text);
        tracing::debug!(%key, %version, %generation, "document opened");

        let mut worker = DocumentWorker::new(
            Arc::clone(&self.shared),
            timer_key,
            tx.clone(),
            snapshot,
            generation,
        );
        worker.arm(self.shared.debounce);
        tokio::spawn(worker.run(rx));
        workers.insert(key, tx);
    }

    /// Record new content for an open document.
    pub fn edit(
        &self,
        key: &DocumentKey,
        version: DocumentVersion,
        text: impl Into<Arc<str>>,
    ) -> Result<(), DiagnosticsError> {
        let workers = self.workers();
        let worker = workers
            .get(key)
            .ok_or_else(|| DiagnosticsError::UnknownDocument { key: key.clone() })?;
        let generation = self.shared.generations.bump(key);
        let snapshot = DocumentSnapshot::new(key.clone(), version, text);
        if worker.send(Command::Edit { snapshot, generation }).is_err() {
            tracing::warn!(%key, "document worker stopped unexpectedly");
        }
        Ok(())
    }

    /// Stop tracking a document. Pending pulls fail with
    /// [`DiagnosticsError::ClosedDuringWait`]. Returns whether it was open.
    pub fn close(&self, key: &DocumentKey) -> bool {
        let Some(worker) = self.workers().remove(key) else {
            tracing::debug!(%key, "close for a document that is not open");
            return false;
        };
        self.shared.generations.forget(key);
        let _ = worker.send(Command::Close);
        tracing::debug!(%key, "document closed");
        true
    }

    /// Wait for a report that reflects at least `known_version` (or the
    /// latest version the engine has seen, if `None`).
    pub async fn request(
        &self,
        key: &DocumentKey,
        known_version: Option<DocumentVersion>,
        previous_result_id: Option<Generation>,
    ) -> Result<DiagnosticReport, DiagnosticsError> {
        if let Some(reason) = self.shared.dispatcher.unsupported_reason() {
            return Err(DiagnosticsError::Unsupported { reason });
        }

        let (reply, response) = oneshot::channel();
        {
            let workers = self.workers();
            let worker = workers
                .get(key)
                .ok_or_else(|| DiagnosticsError::UnknownDocument { key: key.clone() })?;
            worker
                .send(Command::Pull {
                    known_version,
                    previous_result_id,
                    reply,
                })
                .map_err(|_| DiagnosticsError::ClosedDuringWait)?;
        }
        response
            .await
            .unwrap_or(Err(DiagnosticsError::ClosedDuringWait))
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        for (_, worker) in self.workers().drain() {
            let _ = worker.send(Command::Close);
        }
    }
}

enum Phase {
    Idle,
    Debouncing {
        arm: ArmId,
    },
    Computing {
        generation: Generation,
        cancel: CancelHandle,
    },
}

/// A suspended pull request.
struct Waiter {
    /// Generation current when the request arrived.
    generation: Generation,
    min_version: DocumentVersion,
    previous_result_id: Option<Generation>,
    reply: PullReply,
}

impl Waiter {
    fn accepts(&self, generation: Generation, report: &DiagnosticReport) -> bool {
        self.generation <= generation && self.min_version <= report.for_version()
    }

    fn answer(self, report: &DiagnosticReport) {
        let _ = self
            .reply
            .send(Ok(Dispatcher::answer(report, self.previous_result_id)));
    }

    fn fail(self, error: DiagnosticsError) {
        let _ = self.reply.send(Err(error));
    }
}

/// Last successful computation.
struct Fresh {
    generation: Generation,
    report: DiagnosticReport,
}

struct DocumentWorker {
    shared: Arc<Shared>,
    timer_key: TimerKey,
    tx: mpsc::UnboundedSender<Command>,
    snapshot: DocumentSnapshot,
    /// Generation of `snapshot`.
    generation: Generation,
    phase: Phase,
    latest: Option<Fresh>,
    last_published: Option<DiagnosticReport>,
    waiters: Vec<Waiter>,
    last_edit_at: Instant,
    progress: Option<ProgressHandle>,
}

impl DocumentWorker {
    fn new(
        shared: Arc<Shared>,
        timer_key: TimerKey,
        tx: mpsc::UnboundedSender<Command>,
        snapshot: DocumentSnapshot,
        generation: Generation,
    ) -> Self {
        Self {
            shared,
            timer_key,
            tx,
            snapshot,
            generation,
            phase: Phase::Idle,
            latest: None,
            last_published: None,
            waiters: Vec::new(),
            last_edit_at: Instant::now(),
            progress: None,
        }
    }

    fn key(&self) -> &DocumentKey {
        self.snapshot.key()
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Edit {
                    snapshot,
                    generation,
                } => self.on_edit(snapshot, generation),
                Command::TimerFired { arm } => self.on_timer(arm),
                Command::Computed { generation, result } => self.on_computed(generation, result),
                Command::Pull {
                    known_version,
                    previous_result_id,
                    reply,
                } => self.on_pull(known_version, previous_result_id, reply),
                Command::Close => {
                    self.on_close();
                    break;
                }
            }
        }
    }

    fn arm(&mut self, delay: Duration) {
        let tx = self.tx.clone();
        let arm = self
            .shared
            .timers
            .arm(self.timer_key.clone(), delay, move |arm| {
                let _ = tx.send(Command::TimerFired { arm });
            });
        self.phase = Phase::Debouncing { arm };
    }

    fn on_edit(&mut self, snapshot: DocumentSnapshot, generation: Generation) {
        self.snapshot = snapshot;
        self.generation = generation;
        self.last_edit_at = Instant::now();
        match self.phase {
            Phase::Idle | Phase::Debouncing { .. } => self.arm(self.shared.debounce),
            Phase::Computing { .. } => {
                tracing::trace!(
                    key = %self.key(),
                    %generation,
                    "edit during computation; in-flight result is now stale"
                );
            }
        }
    }

    fn on_timer(&mut self, arm: ArmId) {
        match self.phase {
            Phase::Debouncing { arm: current } if current == arm => self.start_computation(),
            _ => tracing::trace!(key = %self.key(), ?arm, "ignoring superseded timer"),
        }
    }

    fn start_computation(&mut self) {
        let generation = self.generation;
        let (cancel, token) = CancelHandle::new();
        let request = ComputeRequest {
            snapshot: self.snapshot.clone(),
            generation,
            cancel: token,
        };
        tracing::debug!(
            key = %self.key(),
            version = %self.snapshot.version(),
            %generation,
            "computing diagnostics"
        );

        if let Some(progress) = &self.shared.progress {
            let handle = progress.begin(COMPUTING_TITLE);
            handle.report(self.key().to_string());
            self.progress = Some(handle);
        }

        let computation = self.shared.backend.compute(request);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = computation.await;
            let _ = tx.send(Command::Computed { generation, result });
        });
        self.phase = Phase::Computing { generation, cancel };
    }

    fn on_computed(&mut self, generation: Generation, result: Result<Vec<Diagnostic>, BackendError>) {
        match self.phase {
            Phase::Computing {
                generation: running,
                ..
            } if running == generation => {}
            _ => {
                tracing::trace!(key = %self.key(), %generation, "ignoring orphaned result");
                return;
            }
        }
        self.phase = Phase::Idle;
        self.progress = None;

        if !self.shared.generations.is_current(self.key(), generation) {
            tracing::trace!(key = %self.key(), %generation, "discarding stale diagnostics");
            // Edits the worker has already seen need a new cycle; queued
            // ones will arm their own timer.
            if self.generation != generation {
                self.reschedule();
            }
            return;
        }

        match result {
            Ok(items) => self.finish(generation, items),
            Err(BackendError::Failed { message }) => {
                tracing::warn!(key = %self.key(), %generation, "diagnostic computation failed: {message}");
                self.shared.emit(EngineEvent::ComputationFailed {
                    key: self.key().clone(),
                    message: message.clone(),
                });
                self.fail_waiters(
                    |waiter| waiter.generation <= generation,
                    &DiagnosticsError::ComputationFailed { message },
                );
            }
            Err(BackendError::Unsupported { reason }) => {
                if self.shared.dispatcher.mark_unsupported(&reason) {
                    tracing::warn!("backend does not support diagnostics requests: {reason}");
                    self.shared.emit(EngineEvent::PullUnsupported {
                        reason: reason.clone(),
                    });
                }
                self.fail_waiters(|_| true, &DiagnosticsError::Unsupported { reason });
            }
        }
    }

    fn finish(&mut self, generation: Generation, items: Vec<Diagnostic>) {
        let report = DiagnosticReport::full(self.snapshot.version(), generation, items);
        let version = report.for_version();

        if let Some(last) = &self.last_published
            && last.supersedes(&report)
        {
            tracing::debug!(key = %self.key(), %version, "not delivering older report");
        } else {
            self.shared.dispatcher.deliver(self.key(), &report);
            self.last_published = Some(report.clone());
            self.shared.emit(EngineEvent::Published {
                key: self.key().clone(),
                version,
            });
        }

        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.waiters)
            .into_iter()
            .partition(|waiter| waiter.accepts(generation, &report));
        self.waiters = waiting;
        for waiter in ready {
            waiter.answer(&report);
        }

        self.latest = Some(Fresh { generation, report });
    }

    /// Start a new cycle after edits arrived during a computation. The
    /// quiescence window counts from the last edit, not from now.
    fn reschedule(&mut self) {
        let debounce = self.shared.debounce;
        let settled = self.last_edit_at.elapsed();
        if settled >= debounce {
            self.start_computation();
        } else {
            self.arm(debounce - settled);
        }
    }

    fn on_pull(
        &mut self,
        known_version: Option<DocumentVersion>,
        previous_result_id: Option<Generation>,
        reply: PullReply,
    ) {
        let waiter = Waiter {
            generation: self.generation,
            min_version: known_version.unwrap_or_else(|| self.snapshot.version()),
            previous_result_id,
            reply,
        };

        let fresh = self
            .latest
            .as_ref()
            .filter(|fresh| fresh.generation == self.generation);
        if let Some(fresh) = fresh
            && waiter.accepts(fresh.generation, &fresh.report)
        {
            waiter.answer(&fresh.report);
            return;
        }
        let needs_computation = fresh.is_none() && matches!(self.phase, Phase::Idle);

        self.waiters.push(waiter);
        if needs_computation {
            tracing::debug!(key = %self.key(), "pull without a fresh report; computing now");
            self.start_computation();
        } else if self.shared.timers.is_pending(&self.timer_key) {
            tracing::trace!(key = %self.key(), "pull waits for the pending debounce");
        }
    }

    fn on_close(&mut self) {
        self.shared.timers.cancel(&self.timer_key);
        if let Phase::Computing { cancel, .. } = &self.phase {
            cancel.cancel();
        }
        self.phase = Phase::Idle;
        self.progress = None;
        self.fail_waiters(|_| true, &DiagnosticsError::ClosedDuringWait);
    }

    fn fail_waiters(&mut self, selected: impl Fn(&Waiter) -> bool, error: &DiagnosticsError) {
        let (failed, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.waiters)
            .into_iter()
            .partition(|waiter| selected(waiter));
        self.waiters = waiting;
        for waiter in failed {
            waiter.fail(error.clone());
        }
    }
}
