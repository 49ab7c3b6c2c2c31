//! Keyed debounce timer.
//!
//! Each key holds at most one pending schedule. Re-arming a key replaces its
//! schedule, so the callback only runs once the key has been quiet for the
//! full delay. Firing and cancellation race on the same lock: whichever side
//! removes the entry first wins, so a cancelled timer never fires.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Identifies one arm cycle of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArmId(u64);

struct Pending {
    arm: ArmId,
    task: JoinHandle<()>,
}

struct Timers<K> {
    next_arm: u64,
    pending: HashMap<K, Pending>,
}

pub struct Debouncer<K> {
    timers: Arc<Mutex<Timers<K>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<K> Debouncer<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            timers: Arc::new(Mutex::new(Timers {
                next_arm: 0,
                pending: HashMap::new(),
            })),
        }
    }

    /// Schedule `on_fire` to run after `delay`, replacing any pending
    /// schedule for `key`. `on_fire` receives the same [`ArmId`] this call
    /// returns.
    ///
    /// `on_fire` always runs on a spawned task, even for a zero delay.
    /// Must be called from within a tokio runtime.
    pub fn arm<F>(&self, key: K, delay: Duration, on_fire: F) -> ArmId
    where
        F: FnOnce(ArmId) + Send + 'static,
    {
        let mut timers = lock(&self.timers);
        timers.next_arm += 1;
        let arm = ArmId(timers.next_arm);

        let shared = Arc::clone(&self.timers);
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
            let claimed = {
                let mut timers = lock(&shared);
                match timers.pending.get(&task_key) {
                    Some(pending) if pending.arm == arm => {
                        timers.pending.remove(&task_key);
                        true
                    }
                    _ => false,
                }
            };
            if claimed {
                on_fire(arm);
            }
        });

        if let Some(previous) = timers.pending.insert(key, Pending { arm, task }) {
            previous.task.abort();
        }
        arm
    }

    /// Drop the pending schedule for `key`. Returns whether one existed.
    pub fn cancel(&self, key: &K) -> bool {
        match lock(&self.timers).pending.remove(key) {
            Some(pending) => {
                pending.task.abort();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.timers).pending.contains_key(key)
    }
}

impl<K> Default for Debouncer<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        for (_, pending) in lock(&self.timers).pending.drain() {
            pending.task.abort();
        }
    }
}
