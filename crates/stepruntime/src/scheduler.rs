//! Coalescing of expensive UI recomputations.
//!
//! Any number of requests for the same update class between two ticks
//! collapse into a single run of the operation on the next tick.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

pub type TickTask = Box<dyn FnOnce() + Send + 'static>;

/// Handle returned by a [`TickSource`] for cancelling a requested tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickId(pub u64);

/// "Run on the next tick" primitive.
///
/// Implementations must never run the task inline from `request_tick`.
pub trait TickSource: Send + Sync {
    fn request_tick(&self, task: TickTask) -> TickId;
    fn cancel_tick(&self, id: TickId);
}

type Operation = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

struct Pending {
    generation: u64,
    tick: Option<TickId>,
    op: Operation,
}

struct Shared {
    ticks: Arc<dyn TickSource>,
    pending: Mutex<HashMap<String, Pending>>,
    next_generation: AtomicU64,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, HashMap<String, Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fire(&self, class: &str, generation: u64) {
        let op = {
            let mut pending = self.pending();
            match pending.get(class) {
                Some(entry) if entry.generation == generation => {
                    pending.remove(class).map(|entry| entry.op)
                }
                // flushed or cancelled since this tick was requested
                _ => None,
            }
        };

        if let Some(op) = op {
            run_operation(class, op);
        }
    }
}

fn run_operation(class: &str, op: Operation) {
    tracing::trace!("Running coalesced update '{}'", class);
    if let Err(e) = op() {
        tracing::error!("Coalesced update '{}' failed: {:#}", class, e);
    }
}

/// At most one pending operation per update class.
///
/// The pending entry is cleared before its operation runs, so an operation
/// may schedule its own class again for the following tick. The internal
/// lock is never held while an operation runs or a tick is requested.
#[derive(Clone)]
pub struct UpdateScheduler {
    shared: Arc<Shared>,
}

impl UpdateScheduler {
    pub fn new(ticks: Arc<dyn TickSource>) -> Self {
        Self {
            shared: Arc::new(Shared {
                ticks,
                pending: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Queue `op` for the next tick. Returns false when `class` already has a
    /// pending operation; the new one is discarded.
    pub fn schedule<F>(&self, class: &str, op: F) -> bool
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let generation = {
            let mut pending = self.shared.pending();
            if pending.contains_key(class) {
                return false;
            }
            let generation = self.shared.next_generation.fetch_add(1, Ordering::Relaxed);
            pending.insert(
                class.to_string(),
                Pending {
                    generation,
                    tick: None,
                    op: Box::new(op),
                },
            );
            generation
        };

        let weak = Arc::downgrade(&self.shared);
        let key = class.to_string();
        let tick = self.shared.ticks.request_tick(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.fire(&key, generation);
            }
        }));

        if let Some(entry) = self.shared.pending().get_mut(class) {
            if entry.generation == generation {
                entry.tick = Some(tick);
            }
        }
        true
    }

    /// Run the pending operation of `class` now instead of on the next tick
    pub fn flush(&self, class: &str) -> bool {
        let Some(entry) = self.shared.pending().remove(class) else {
            return false;
        };
        if let Some(tick) = entry.tick {
            self.shared.ticks.cancel_tick(tick);
        }
        run_operation(class, entry.op);
        true
    }

    /// Drop the pending operation of `class` without running it
    pub fn cancel(&self, class: &str) -> bool {
        let Some(entry) = self.shared.pending().remove(class) else {
            return false;
        };
        if let Some(tick) = entry.tick {
            self.shared.ticks.cancel_tick(tick);
        }
        true
    }

    /// Flush every pending class, in class-name order
    pub fn flush_all(&self) -> usize {
        let mut classes: Vec<String> = self.shared.pending().keys().cloned().collect();
        classes.sort();
        classes.iter().filter(|class| self.flush(class)).count()
    }

    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Pending> = self.shared.pending().drain().map(|(_, p)| p).collect();
        for tick in drained.iter().filter_map(|p| p.tick) {
            self.shared.ticks.cancel_tick(tick);
        }
        drained.len()
    }

    pub fn is_pending(&self, class: &str) -> bool {
        self.shared.pending().contains_key(class)
    }
}

/// Tick source driven by hand; used by tests and headless hosts
#[derive(Default)]
pub struct ManualTicks {
    queue: Mutex<Vec<(TickId, TickTask)>>,
    next_id: AtomicU64,
}

impl ManualTicks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the ticks queued so far. Ticks requested while these run wait for
    /// the next call.
    pub fn advance(&self) -> usize {
        let due = std::mem::take(&mut *self.queue());
        let count = due.len();
        for (_, task) in due {
            task();
        }
        count
    }

    pub fn queued(&self) -> usize {
        self.queue().len()
    }

    fn queue(&self) -> MutexGuard<'_, Vec<(TickId, TickTask)>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TickSource for ManualTicks {
    fn request_tick(&self, task: TickTask) -> TickId {
        let id = TickId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.queue().push((id, task));
        id
    }

    fn cancel_tick(&self, id: TickId) {
        self.queue().retain(|(queued, _)| *queued != id);
    }
}

/// Tick source backed by the tokio timer, one tick per `interval`
pub struct TokioTicks {
    handle: Handle,
    interval: Duration,
    tasks: Arc<Mutex<HashMap<u64, AbortHandle>>>,
    next_id: AtomicU64,
}

impl TokioTicks {
    pub fn new(handle: Handle, interval: Duration) -> Self {
        Self {
            handle,
            interval,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Bind to the runtime of the calling context
    pub fn current(interval: Duration) -> anyhow::Result<Self> {
        let handle = Handle::try_current()?;
        Ok(Self::new(handle, interval))
    }
}

impl TickSource for TokioTicks {
    fn request_tick(&self, task: TickTask) -> TickId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let interval = self.interval;
        let tasks = self.tasks.clone();

        // held across spawn so the task cannot deregister before it is registered
        let mut registered = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let join = self.handle.spawn(async move {
            tokio::time::sleep(interval).await;
            tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            task();
        });
        registered.insert(id, join.abort_handle());

        TickId(id)
    }

    fn cancel_tick(&self, id: TickId) {
        let handle = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id.0);
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}
