//! Per-key debouncing of asynchronous actions.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::trace;

struct ArmedTimer {
    generation: u64,
    cancel: CancellationToken,
}

struct TimerTable<K> {
    next_generation: u64,
    armed: HashMap<K, ArmedTimer>,
}

/// Runs an action once its key has been quiet for `delay`.
///
/// Scheduling a key that already has an armed timer cancels that timer, so
/// only the action of the last call fires. Once the delay has elapsed the
/// action runs to completion even if the debouncer is disposed meanwhile.
pub struct Debouncer<K> {
    delay: Duration,
    shutdown: CancellationToken,
    timers: Arc<Mutex<TimerTable<K>>>,
    tasks: TaskTracker,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Timers are also cancelled when `shutdown` is.
    pub fn new(delay: Duration, shutdown: CancellationToken) -> Self {
        Self {
            delay,
            shutdown,
            timers: Arc::new(Mutex::new(TimerTable {
                next_generation: 0,
                armed: HashMap::new(),
            })),
            tasks: TaskTracker::new(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arms (or re-arms) the timer of `key`.
    pub fn schedule<F, Fut>(&self, key: K, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            trace!("Debouncer is disposed, ignoring schedule");
            return;
        }

        let cancel = self.shutdown.child_token();
        let generation = {
            let mut table = self.timers.lock().unwrap();
            let generation = table.next_generation;
            table.next_generation += 1;
            let previous = table.armed.insert(
                key.clone(),
                ArmedTimer {
                    generation,
                    cancel: cancel.clone(),
                },
            );
            if let Some(previous) = previous {
                previous.cancel.cancel();
            }
            generation
        };

        let timers = self.timers.clone();
        let delay = self.delay;
        self.tasks.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            {
                let mut table = timers.lock().unwrap();
                let current = table
                    .armed
                    .get(&key)
                    .is_some_and(|timer| timer.generation == generation);
                if !current {
                    return;
                }
                table.armed.remove(&key);
            }
            action().await;
        });
    }

    /// Cancels the armed timer of `key`, if any.
    pub fn cancel(&self, key: &K) -> bool {
        let removed = self.timers.lock().unwrap().armed.remove(key);
        match removed {
            Some(timer) => {
                timer.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every armed timer. Actions that already started are not
    /// affected.
    pub fn cancel_all(&self) {
        let mut table = self.timers.lock().unwrap();
        for (_, timer) in table.armed.drain() {
            timer.cancel.cancel();
        }
    }

    /// Waits until every armed timer has either fired, with its action run to
    /// completion, or been cancelled.
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    /// Number of armed timers.
    pub fn pending_count(&self) -> usize {
        self.timers.lock().unwrap().armed.len()
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        if let Ok(mut table) = self.timers.lock() {
            for (_, timer) in table.armed.drain() {
                timer.cancel.cancel();
            }
        }
    }
}
