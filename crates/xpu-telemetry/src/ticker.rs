use crate::{Result, TelemetryError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub type Tick = Box<dyn FnMut() + Send + 'static>;

/// Source of monotonic time for record timestamps.
pub trait Clock: Send + Sync {
    /// Time since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock advanced by hand.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        let n = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(n, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

/// A repeating task armed by a [`Scheduler`].
pub trait TaskHandle: Send {
    /// Stops the task. Blocks until a tick in progress has returned; no tick
    /// runs after this returns. Calling it again is a no-op.
    fn cancel(&mut self);
}

/// Runs a tick now and then every `period` until cancelled.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, period: Duration, tick: Tick) -> Result<Box<dyn TaskHandle>>;
}

/// One named OS thread per task. Cancellation is a message on a channel the
/// thread waits on between ticks.
#[derive(Debug, Clone, Default)]
pub struct ThreadScheduler {
    name: Option<String>,
}

impl ThreadScheduler {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, period: Duration, mut tick: Tick) -> Result<Box<dyn TaskHandle>> {
        let (cancel, stopped) = mpsc::channel::<()>();
        let name = self.name.clone().unwrap_or_else(|| "xpu-telemetry".to_string());
        let thread = std::thread::Builder::new()
            .name(name)
            .spawn(move || {
                let mut deadline = Instant::now();
                loop {
                    tick();
                    deadline += period;
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match stopped.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("ticker: exiting");
            })
            .map_err(|e| TelemetryError::TimerUnavailable(e.to_string()))?;
        Ok(Box::new(ThreadTask {
            cancel: Some(cancel),
            thread: Some(thread),
        }))
    }
}

struct ThreadTask {
    cancel: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TaskHandle for ThreadTask {
    fn cancel(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("ticker: tick panicked");
            }
        }
    }
}

impl Drop for ThreadTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Scheduler driven by explicit [`ManualScheduler::fire`] calls.
///
/// Clones share the armed task, so a test keeps one clone and hands the
/// other to the code under test.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    slot: Arc<Mutex<Option<Tick>>>,
    period: Arc<Mutex<Option<Duration>>>,
}

impl ManualScheduler {
    /// Runs the armed tick once. Returns false when nothing is armed.
    pub fn fire(&self) -> bool {
        let mut slot = self.slot.lock();
        match slot.as_mut() {
            Some(tick) => {
                tick();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Period the last task was scheduled with.
    pub fn period(&self) -> Option<Duration> {
        *self.period.lock()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, period: Duration, tick: Tick) -> Result<Box<dyn TaskHandle>> {
        *self.period.lock() = Some(period);
        *self.slot.lock() = Some(tick);
        self.fire();
        Ok(Box::new(ManualTask {
            slot: self.slot.clone(),
        }))
    }
}

struct ManualTask {
    slot: Arc<Mutex<Option<Tick>>>,
}

impl TaskHandle for ManualTask {
    fn cancel(&mut self) {
        self.slot.lock().take();
    }
}
