//! TCP connect probe worker.
//!
//! Each dispatched execution runs as its own tokio task and reports a
//! [`WorkerDone`] on the completion channel, whatever the outcome. Stopping
//! a task cancels all of its in-flight probes, which then report
//! `Interrupted`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use probe_scheduler::WorkerDispatcher;
use probe_types::{RunOutcome, SchedulerId, Task, TaskId};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Completion report for one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerDone {
    pub task: TaskId,
    pub scheduler_id: SchedulerId,
    pub outcome: RunOutcome,
}

pub struct ConnectWorker {
    timeout: Duration,
    running: Arc<Mutex<HashMap<TaskId, CancellationToken>>>,
    tx: mpsc::UnboundedSender<WorkerDone>,
    shutdown: CancellationToken,
}

impl ConnectWorker {
    pub fn new(
        timeout: Duration,
        shutdown: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerDone>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Self {
            timeout,
            running: Arc::new(Mutex::new(HashMap::new())),
            tx,
            shutdown,
        };
        (worker, rx)
    }

    fn running(&self) -> MutexGuard<'_, HashMap<TaskId, CancellationToken>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Try to open a TCP connection to `target` within `timeout`.
pub async fn probe(target: &str, timeout: Duration) -> RunOutcome {
    match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
        Ok(Ok(_stream)) => RunOutcome::Success,
        Ok(Err(e)) => RunOutcome::Failed(e.to_string()),
        Err(_) => RunOutcome::Failed(format!("connect timed out after {:?}", timeout)),
    }
}

impl WorkerDispatcher for ConnectWorker {
    fn start(&self, task: &Task, scheduler_id: SchedulerId) {
        let token = self
            .running()
            .entry(task.id)
            .or_insert_with(|| self.shutdown.child_token())
            .child_token();

        let id = task.id;
        let target = task.target();
        let timeout = self.timeout;
        let tx = self.tx.clone();
        debug!(task = %id, target = %target, "Starting probe");

        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => RunOutcome::Interrupted,
                outcome = probe(&target, timeout) => outcome,
            };
            info!(task = %id, target = %target, outcome = ?outcome, "Probe finished");
            let _ = tx.send(WorkerDone {
                task: id,
                scheduler_id,
                outcome,
            });
        });
    }

    fn stop(&self, task: TaskId) {
        if let Some(token) = self.running().remove(&task) {
            token.cancel();
            debug!(task = %task, "Stopped probes");
        }
    }
}
