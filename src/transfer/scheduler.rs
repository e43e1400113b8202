use std::collections::HashMap;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::trace;

use super::upload::UploadStatus;
use crate::error::{Error, Result};
use crate::library::TitleId;

/// Identity of a timer registration. Cancelling by key invalidates the
/// pending callback, not just future scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerKey {
    Download(TitleId),
    /// `stage` is the status the timer drives the job into (or keeps it
    /// in, for the progress ticker)
    Upload { job: u64, stage: UploadStatus },
    /// Scripted support reply to one sent message
    ChatReply { email: String, message: u64 },
}

#[derive(Debug)]
struct Registration {
    token: u64,
    handle: AbortHandle,
}

/// Periodic and one-shot timers on the tokio runtime, keyed by job
#[derive(Debug, Clone)]
pub struct Scheduler {
    runtime: Handle,
    timers: Arc<Mutex<HashMap<TimerKey, Registration>>>,
    next_token: Arc<AtomicU64>,
}

impl Scheduler {
    /// Bind to the runtime we are currently running on
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        Ok(Self::with_handle(runtime))
    }

    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_token: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Run `tick` every `period`, first one `period` from now, until it
    /// breaks or the key is cancelled
    pub fn every<F>(&self, key: TimerKey, period: Duration, mut tick: F)
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let start = Instant::now() + period;
        self.register(key, async move {
            let mut interval = time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tick().is_break() {
                    break;
                }
            }
        });
    }

    /// Run `callback` once after `delay` unless the key is cancelled first
    pub fn after<F>(&self, key: TimerKey, delay: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.register(key, async move {
            time::sleep(delay).await;
            callback();
        });
    }

    fn register<Fut>(&self, key: TimerKey, task: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);
        let done_key = key.clone();

        // Hold the registry while spawning so the task cannot deregister
        // before it is registered
        let mut registry = self.timers.lock();
        let join = self.runtime.spawn(async move {
            task.await;
            let mut timers = timers.lock();
            if timers.get(&done_key).is_some_and(|r| r.token == token) {
                timers.remove(&done_key);
            }
        });

        trace!(key = ?key, token, "Timer registered");
        let registration = Registration {
            token,
            handle: join.abort_handle(),
        };
        if let Some(previous) = registry.insert(key, registration) {
            previous.handle.abort();
        }
    }

    /// Returns whether a pending timer was dropped
    pub fn cancel(&self, key: &TimerKey) -> bool {
        match self.timers.lock().remove(key) {
            Some(registration) => {
                registration.handle.abort();
                trace!(key = ?key, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Drop every timer belonging to one upload job instance
    pub fn cancel_upload_job(&self, job: u64) -> usize {
        self.cancel_matching(|k| matches!(k, TimerKey::Upload { job: j, .. } if *j == job))
    }

    /// Drop pending support replies addressed to `email`
    pub fn cancel_chat(&self, email: &str) -> usize {
        self.cancel_matching(|k| matches!(k, TimerKey::ChatReply { email: e, .. } if e == email))
    }

    fn cancel_matching(&self, matches: impl Fn(&TimerKey) -> bool) -> usize {
        let mut timers = self.timers.lock();
        let keys: Vec<TimerKey> = timers.keys().filter(|k| matches(k)).cloned().collect();

        for key in &keys {
            if let Some(registration) = timers.remove(key) {
                registration.handle.abort();
            }
        }
        keys.len()
    }

    pub fn cancel_all(&self) {
        for (_, registration) in self.timers.lock().drain() {
            registration.handle.abort();
        }
    }

    pub fn is_scheduled(&self, key: &TimerKey) -> bool {
        self.timers.lock().contains_key(key)
    }

    pub fn pending(&self) -> usize {
        self.timers.lock().len()
    }
}
