//! Alarm runtime backed by tokio timers.
//!
//! Each armed task owns one sleeping tokio task guarded by a child of the
//! shutdown token. Re-arming or cancelling a task cancels its previous
//! timer. Fired alarms are delivered on an unbounded channel together with
//! the scheduler id they were armed under.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use probe_types::{SchedulerId, TaskId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::dispatch::AlarmDispatcher;
use crate::jitter::JitterConfig;

/// A fired alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmFire {
    pub task: TaskId,
    pub scheduler_id: SchedulerId,
}

type Pending = Arc<Mutex<HashMap<TaskId, (u64, CancellationToken)>>>;

pub struct TokioAlarms {
    pending: Pending,
    generation: AtomicU64,
    tx: mpsc::UnboundedSender<AlarmFire>,
    jitter: JitterConfig,
    shutdown: CancellationToken,
}

impl TokioAlarms {
    /// Create the runtime and the receiving end of its alarm channel.
    ///
    /// Cancelling `shutdown` drops every pending alarm.
    pub fn new(
        jitter: JitterConfig,
        shutdown: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<AlarmFire>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let alarms = Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            tx,
            jitter,
            shutdown,
        };
        (alarms, rx)
    }

    /// Number of armed alarms.
    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }

    fn arm(&self, task: TaskId, scheduler_id: SchedulerId, delay: Duration) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let token = self.shutdown.child_token();

        if let Some((_, previous)) = lock(&self.pending).insert(task, (generation, token.clone())) {
            previous.cancel();
        }

        let pending = Arc::clone(&self.pending);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    trace!(task = %task, "Alarm cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    {
                        let mut pending = lock(&pending);
                        if matches!(pending.get(&task), Some((g, _)) if *g == generation) {
                            pending.remove(&task);
                        }
                    }
                    debug!(task = %task, scheduler_id = %scheduler_id, "Alarm fired");
                    let _ = tx.send(AlarmFire { task, scheduler_id });
                }
            }
        });
    }
}

fn lock(pending: &Pending) -> MutexGuard<'_, HashMap<TaskId, (u64, CancellationToken)>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

impl AlarmDispatcher for TokioAlarms {
    fn schedule_exact(&self, at: DateTime<Utc>, task: TaskId, scheduler_id: SchedulerId) {
        let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        debug!(task = %task, at = %at, "Arming exact alarm");
        self.arm(task, scheduler_id, delay);
    }

    fn schedule_inexact(&self, delay: Duration, task: TaskId, scheduler_id: SchedulerId) {
        let delay = self.jitter.apply(delay);
        debug!(task = %task, delay_secs = delay.as_secs(), "Arming inexact alarm");
        self.arm(task, scheduler_id, delay);
    }

    fn cancel(&self, task: TaskId) {
        if let Some((_, token)) = lock(&self.pending).remove(&task) {
            token.cancel();
            debug!(task = %task, "Cancelled alarm");
        }
    }
}
