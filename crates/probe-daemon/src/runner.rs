//! Foreground scheduling loop.
//!
//! Feeds alarm fires, worker completions and a periodic recheck tick into
//! the engine and applies the resulting directives. Stops when the shutdown
//! token is cancelled.

use std::sync::Arc;
use std::time::Duration;

use probe_scheduler::{
    AlarmFire, Clock, Directive, RescheduleEngine, SchedulerError, SchedulerStore, TaskEvent,
    TokioAlarms,
};
use probe_types::TaskId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::worker::{ConnectWorker, WorkerDone};

pub struct Runner<S> {
    engine: Arc<RescheduleEngine<S>>,
    clock: Arc<dyn Clock>,
    alarms: TokioAlarms,
    alarm_rx: mpsc::UnboundedReceiver<AlarmFire>,
    workers: ConnectWorker,
    done_rx: mpsc::UnboundedReceiver<WorkerDone>,
    recheck_every: Duration,
    shutdown: CancellationToken,
}

impl<S: SchedulerStore + 'static> Runner<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: Arc<RescheduleEngine<S>>,
        clock: Arc<dyn Clock>,
        alarms: (TokioAlarms, mpsc::UnboundedReceiver<AlarmFire>),
        workers: (ConnectWorker, mpsc::UnboundedReceiver<WorkerDone>),
        recheck_every: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            engine,
            clock,
            alarms: alarms.0,
            alarm_rx: alarms.1,
            workers: workers.0,
            done_rx: workers.1,
            recheck_every,
            shutdown,
        }
    }

    /// Re-arm persisted tasks, then process events until shutdown.
    pub async fn run(mut self) -> Result<(), SchedulerError> {
        let now = self.clock.now();
        let restored = self.engine.restart(now)?;
        self.apply_all(&restored);

        let mut tick = tokio::time::interval(self.recheck_every);
        // The first tick completes immediately; restart already covered it
        tick.tick().await;

        info!(tasks = restored.len(), "Scheduler loop running");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested, leaving scheduler loop");
                    break;
                }
                Some(fire) = self.alarm_rx.recv() => {
                    self.dispatch(fire.task, TaskEvent::AlarmFired { scheduler_id: fire.scheduler_id });
                }
                Some(done) = self.done_rx.recv() => {
                    self.dispatch(
                        done.task,
                        TaskEvent::WorkerFinished {
                            scheduler_id: done.scheduler_id,
                            outcome: done.outcome,
                        },
                    );
                }
                _ = tick.tick() => {
                    let now = self.clock.now();
                    match self.engine.recheck_all(now) {
                        Ok(directives) => self.apply_all(&directives),
                        Err(e) => warn!(error = %e, "Recheck failed"),
                    }
                }
            }
        }
        Ok(())
    }

    fn dispatch(&self, task: TaskId, event: TaskEvent) {
        let now = self.clock.now();
        match self.engine.handle(task, event, now) {
            Ok(directive) => directive.apply(now, &self.alarms, &self.workers),
            Err(SchedulerError::TaskNotFound(_)) => {
                debug!(task = %task, "Event for deleted task");
            }
            // Leave the task as stored; the next tick or alarm retries
            Err(e) => warn!(task = %task, error = %e, "Failed to handle task event"),
        }
    }

    fn apply_all(&self, directives: &[Directive]) {
        let now = self.clock.now();
        for directive in directives {
            directive.apply(now, &self.alarms, &self.workers);
        }
    }
}
