//! Debounced work-done progress.
//!
//! A background task asks for visibility and gets a progress indicator only
//! if it is still running when its window elapses. Tasks that finish inside
//! the window never reach the client, so short work does not flicker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use settle_types::ProgressToken;
use tokio::time::Instant;

use crate::client::ClientSink;
use crate::debounce::Debouncer;

struct ProgressTask {
    title: String,
    scheduled_start: Instant,
    window: Duration,
    visible: bool,
    /// Latest update received before the task became visible.
    pending_message: Option<String>,
}

/// State shared with timer callbacks. Holds no timers itself, so pending
/// callbacks never keep the debouncer alive.
struct Visibility {
    sink: Arc<dyn ClientSink>,
    tasks: Mutex<HashMap<ProgressToken, ProgressTask>>,
}

impl Visibility {
    fn tasks(&self) -> MutexGuard<'_, HashMap<ProgressToken, ProgressTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reveal(&self, token: &ProgressToken) {
        let mut tasks = self.tasks();
        let Some(task) = tasks.get_mut(token) else {
            return;
        };
        if task.visible {
            return;
        }
        task.visible = true;
        tracing::debug!(
            %token,
            waited_ms = task.scheduled_start.elapsed().as_millis() as u64,
            window_ms = task.window.as_millis() as u64,
            "progress became visible"
        );
        let message = task.pending_message.take();
        self.sink
            .progress_begin(token, &task.title, message.as_deref());
    }
}

pub struct ProgressDebouncer {
    visibility: Arc<Visibility>,
    timers: Debouncer<ProgressToken>,
    default_window: Duration,
    /// False when the client cannot display work-done progress at all.
    enabled: bool,
    next_token: AtomicU64,
}

impl ProgressDebouncer {
    pub fn new(sink: Arc<dyn ClientSink>, default_window: Duration, enabled: bool) -> Self {
        Self {
            visibility: Arc::new(Visibility {
                sink,
                tasks: Mutex::new(HashMap::new()),
            }),
            timers: Debouncer::new(),
            default_window,
            enabled,
            next_token: AtomicU64::new(1),
        }
    }

    /// Register a running task and show it after `window` unless it completes
    /// first. Re-using a live token completes the old task first.
    pub fn request_visibility(&self, token: ProgressToken, title: impl Into<String>, window: Duration) {
        if !self.enabled {
            return;
        }
        if self.visibility.tasks().contains_key(&token) {
            tracing::debug!(%token, "progress token reused; completing previous task");
            self.complete(&token);
        }

        self.visibility.tasks().insert(
            token.clone(),
            ProgressTask {
                title: title.into(),
                scheduled_start: Instant::now(),
                window,
                visible: false,
                pending_message: None,
            },
        );

        let visibility = Arc::clone(&self.visibility);
        let fire_token = token.clone();
        self.timers
            .arm(token, window, move |_| visibility.reveal(&fire_token));
    }

    pub fn update(&self, token: &ProgressToken, message: impl Into<String>) {
        let mut tasks = self.visibility.tasks();
        let Some(task) = tasks.get_mut(token) else {
            return;
        };
        let message = message.into();
        if task.visible {
            self.visibility.sink.progress_report(token, &message);
        } else {
            task.pending_message = Some(message);
        }
    }

    /// Finish a task. Emits `end` only if `begin` was emitted.
    pub fn complete(&self, token: &ProgressToken) {
        let mut tasks = self.visibility.tasks();
        let Some(task) = tasks.remove(token) else {
            return;
        };
        if task.visible {
            self.visibility.sink.progress_end(token);
        } else {
            self.timers.cancel(token);
            tracing::trace!(%token, "progress finished inside its window");
        }
    }

    /// Start a task with a fresh token and the default window.
    pub fn begin(self: &Arc<Self>, title: impl Into<String>) -> ProgressHandle {
        let token = ProgressToken::new(format!(
            "settle/progress/{}",
            self.next_token.fetch_add(1, Ordering::Relaxed)
        ));
        self.request_visibility(token.clone(), title, self.default_window);
        ProgressHandle {
            progress: Arc::clone(self),
            token,
        }
    }

    #[must_use]
    pub fn is_visible(&self, token: &ProgressToken) -> bool {
        self.visibility
            .tasks()
            .get(token)
            .is_some_and(|task| task.visible)
    }
}

/// A running progress task; dropping it completes the task.
pub struct ProgressHandle {
    progress: Arc<ProgressDebouncer>,
    token: ProgressToken,
}

impl ProgressHandle {
    #[must_use]
    pub fn token(&self) -> &ProgressToken {
        &self.token
    }

    pub fn report(&self, message: impl Into<String>) {
        self.progress.update(&self.token, message);
    }
}

impl Drop for ProgressHandle {
    fn drop(&mut self) {
        self.progress.complete(&self.token);
    }
}
