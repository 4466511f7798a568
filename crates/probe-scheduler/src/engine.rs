//! Reschedule decision engine.
//!
//! One transition function per task event. Each call loads the task, moves
//! it through the `Idle | Scheduled | Running | Suspended` state machine,
//! persists the result and returns the [`Directive`] the host must carry
//! out. Events for different tasks may run concurrently; the scheduler id
//! ledger and instance counters only change through atomic store updates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard};

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use probe_types::{
    Interval, RunOutcome, SchedulerId, SuspensionState, Task, TaskId, TaskState, TimeOfDay,
};
use tracing::{debug, info, warn};

use crate::clock::{floor_to_minute, local_time_of_day};
use crate::config::SchedulerConfig;
use crate::dispatch::Directive;
use crate::instances::{Admission, InstanceAccountant};
use crate::intervals::{clean, IntervalRules, IntervalSet};
use crate::scheduler_id::{IdSource, RandomIdSource, SchedulerIdGenerator, SchedulerIdHistory};
use crate::store::SchedulerStore;
use crate::suspension::SuspensionCache;
use crate::SchedulerError;

/// Settings for a new task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub interval_secs: u64,
    pub high_priority: bool,
    pub max_instances: u32,
}

impl NewTask {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        port: u16,
        interval_secs: u64,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
            interval_secs,
            high_priority: false,
            max_instances: 1,
        }
    }
}

/// A partial update of a task's settings.
#[derive(Debug, Clone, Default)]
pub struct TaskEdit {
    pub name: Option<String>,
    pub address: Option<String>,
    pub port: Option<u16>,
    pub interval_secs: Option<u64>,
    pub high_priority: Option<bool>,
    pub max_instances: Option<u32>,
}

impl TaskEdit {
    /// Apply to `task`; returns whether the probe target changed.
    fn apply_to(self, task: &mut Task) -> bool {
        let before = task.target();
        if let Some(name) = self.name {
            task.name = name;
        }
        if let Some(address) = self.address {
            task.address = address;
        }
        if let Some(port) = self.port {
            task.port = port;
        }
        if let Some(interval_secs) = self.interval_secs {
            task.interval_secs = interval_secs;
        }
        if let Some(high_priority) = self.high_priority {
            task.high_priority = high_priority;
        }
        if let Some(max_instances) = self.max_instances {
            task.max_instances = max_instances;
        }
        task.target() != before
    }
}

/// Longest accepted task interval: one leap year.
pub const MAX_INTERVAL_SECS: u64 = 366 * 24 * 60 * 60;

fn validate_task_settings(interval_secs: u64, max_instances: u32) -> Result<(), SchedulerError> {
    if interval_secs == 0 || interval_secs > MAX_INTERVAL_SECS {
        return Err(SchedulerError::InvalidTask(format!(
            "interval_secs must be between 1 and {}, got {}",
            MAX_INTERVAL_SECS, interval_secs
        )));
    }
    if max_instances == 0 {
        return Err(SchedulerError::InvalidTask(
            "max_instances must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Something that happened to a task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Enable,
    Disable,
    /// An alarm armed under `scheduler_id` went off
    AlarmFired { scheduler_id: SchedulerId },
    /// A worker dispatched under `scheduler_id` ended, whatever the outcome
    WorkerFinished {
        scheduler_id: SchedulerId,
        outcome: RunOutcome,
    },
    /// Settings were edited; a target change starts a new scheduling epoch
    Edited { target_changed: bool },
    /// Periodic or interval-edit triggered re-evaluation
    Recheck,
}

pub struct RescheduleEngine<S> {
    store: Arc<S>,
    config: SchedulerConfig,
    tz: Tz,
    rules: IntervalRules,
    ids: SchedulerIdGenerator,
    instances: InstanceAccountant<S>,
    intervals: RwLock<IntervalSet>,
    suspension: Mutex<SuspensionCache>,
    suspension_enabled: AtomicBool,
}

impl<S: SchedulerStore> RescheduleEngine<S> {
    /// Build an engine over `store`, loading the raw interval list and the
    /// cached suspension state.
    pub fn new(store: Arc<S>, config: SchedulerConfig) -> Result<Self, SchedulerError> {
        Self::with_id_source(store, config, Box::new(RandomIdSource::new()))
    }

    /// Like [`new`](Self::new) with a specific scheduler id source.
    pub fn with_id_source(
        store: Arc<S>,
        config: SchedulerConfig,
        source: Box<dyn IdSource>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        let tz = config.parse_timezone()?;
        let rules = config.interval_rules();

        let set = clean(&store.load_intervals()?, &rules);
        let enabled = store
            .load_suspension_enabled()?
            .unwrap_or(config.suspension_enabled);
        let cache = if enabled {
            SuspensionCache::from_state(store.load_suspension_state()?)
        } else {
            SuspensionCache::new()
        };

        info!(
            timezone = %tz,
            intervals = set.len(),
            suspension_enabled = enabled,
            "Reschedule engine ready"
        );

        Ok(Self {
            ids: SchedulerIdGenerator::new(source, config.max_id_attempts),
            instances: InstanceAccountant::new(Arc::clone(&store)),
            store,
            tz,
            rules,
            intervals: RwLock::new(set),
            suspension: Mutex::new(cache),
            suspension_enabled: AtomicBool::new(enabled),
            config,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn instances(&self) -> &InstanceAccountant<S> {
        &self.instances
    }

    // ==================== Task lifecycle ====================

    /// Create a disabled task with a fresh scheduler id.
    pub fn create_task(&self, new: NewTask, now: DateTime<Utc>) -> Result<Task, SchedulerError> {
        validate_task_settings(new.interval_secs, new.max_instances)?;
        let id = self.store.next_task_id()?;
        let mut task = Task::new(id, new.name, new.address, new.port, new.interval_secs)
            .with_high_priority(new.high_priority)
            .with_max_instances(new.max_instances);
        task.scheduler_id = self.allocate_id(now)?;
        self.instances.reset(id)?;
        self.store.save_task(&task)?;

        info!(task = %id, name = %task.name, target = %task.target(), scheduler_id = %task.scheduler_id, "Created task");
        Ok(task)
    }

    /// Apply an edit and re-plan the task. The latest edit wins.
    pub fn update_task(
        &self,
        id: TaskId,
        edit: TaskEdit,
        now: DateTime<Utc>,
    ) -> Result<Directive, SchedulerError> {
        let mut task = self.require_task(id)?;
        let original = task.clone();
        let target_changed = edit.apply_to(&mut task);
        validate_task_settings(task.interval_secs, task.max_instances)?;
        let directive = self.transition(&mut task, TaskEvent::Edited { target_changed }, now)?;
        self.persist(&original, &task)?;
        Ok(directive)
    }

    /// Delete a task. Its scheduler id stays in the history ledger.
    pub fn remove_task(&self, id: TaskId) -> Result<Directive, SchedulerError> {
        self.require_task(id)?;
        self.store.delete_task(id)?;
        info!(task = %id, "Removed task");
        Ok(Directive::Cancel { task: id })
    }

    pub fn get_task(&self, id: TaskId) -> Result<Option<Task>, SchedulerError> {
        self.store.load_task(id)
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>, SchedulerError> {
        self.store.load_tasks()
    }

    /// Run one event through the task's state machine.
    pub fn handle(
        &self,
        id: TaskId,
        event: TaskEvent,
        now: DateTime<Utc>,
    ) -> Result<Directive, SchedulerError> {
        let mut task = self.require_task(id)?;
        let original = task.clone();
        let directive = self.transition(&mut task, event, now)?;
        self.persist(&original, &task)?;
        Ok(directive)
    }

    /// Re-evaluate every enabled task against the current windows.
    pub fn recheck_all(&self, now: DateTime<Utc>) -> Result<Vec<Directive>, SchedulerError> {
        self.refresh_suspension(now)?;
        let mut directives = Vec::new();
        for mut task in self.store.load_tasks()? {
            if !task.enabled {
                continue;
            }
            let original = task.clone();
            let directive = match self.transition(&mut task, TaskEvent::Recheck, now) {
                Ok(directive) => directive,
                Err(SchedulerError::InvalidTask(reason)) => {
                    warn!(task = %task.id, reason = %reason, "Skipping task on recheck");
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.persist(&original, &task)?;
            if !directive.is_ignore() {
                directives.push(directive);
            }
        }
        Ok(directives)
    }

    /// Bring persisted tasks back after a process restart.
    ///
    /// Instance counters from the previous process are dropped and every
    /// enabled task with a valid scheduler id is armed again. A future
    /// wake-up is kept; a missed one is replaced by now + interval.
    pub fn restart(&self, now: DateTime<Utc>) -> Result<Vec<Directive>, SchedulerError> {
        self.instances.reset_all()?;
        self.refresh_suspension(now)?;

        let mut directives = Vec::new();
        for mut task in self.store.load_tasks()? {
            if !task.enabled {
                continue;
            }
            let original = task.clone();
            if !task.scheduler_id.is_valid() {
                task.state = TaskState::Idle;
                self.persist(&original, &task)?;
                debug!(task = %task.id, "Skipping unschedulable task on restart");
                continue;
            }
            let wake = match task.state.next_wake() {
                Some(at) if at > now => at,
                _ => match self.next_period(&task, now) {
                    Ok(at) => at,
                    Err(e) => {
                        task.state = TaskState::Idle;
                        self.persist(&original, &task)?;
                        warn!(task = %task.id, error = %e, "Cannot restore task");
                        continue;
                    }
                },
            };
            let directive = self.arm(&mut task, wake);
            self.persist(&original, &task)?;
            directives.push(directive);
        }

        info!(armed = directives.len(), "Restored scheduled tasks");
        Ok(directives)
    }

    // ==================== Suspension intervals ====================

    /// The cleaned interval set currently in force.
    pub fn intervals(&self) -> IntervalSet {
        self.read_intervals().clone()
    }

    /// The raw, user-maintained interval list.
    pub fn raw_intervals(&self) -> Result<Vec<Interval>, SchedulerError> {
        self.store.load_intervals()
    }

    /// Replace the raw list, rebuild the cleaned set and re-plan tasks.
    pub fn replace_intervals(
        &self,
        raw: Vec<Interval>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Directive>, SchedulerError> {
        let raw: Vec<Interval> = raw
            .into_iter()
            .enumerate()
            .map(|(i, interval)| Interval::new(i as u32 + 1, interval.start, interval.end))
            .collect();
        self.store_intervals(raw, now)
    }

    /// Bulk import. Runs the same cleaning as manual edits.
    pub fn import_intervals(
        &self,
        raw: Vec<Interval>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Directive>, SchedulerError> {
        info!(count = raw.len(), "Importing suspension intervals");
        self.replace_intervals(raw, now)
    }

    /// Append one raw interval.
    pub fn add_interval(
        &self,
        start: TimeOfDay,
        end: TimeOfDay,
        now: DateTime<Utc>,
    ) -> Result<(Interval, Vec<Directive>), SchedulerError> {
        let mut raw = self.store.load_intervals()?;
        let id = raw.iter().map(|i| i.id).max().unwrap_or(0) + 1;
        let interval = Interval::new(id, start, end);
        raw.push(interval);
        let directives = self.store_intervals(raw, now)?;
        Ok((interval, directives))
    }

    /// Remove one raw interval by id.
    pub fn remove_interval(
        &self,
        id: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Directive>, SchedulerError> {
        let mut raw = self.store.load_intervals()?;
        let before = raw.len();
        raw.retain(|interval| interval.id != id);
        if raw.len() == before {
            return Err(SchedulerError::IntervalNotFound(id));
        }
        self.store_intervals(raw, now)
    }

    fn store_intervals(
        &self,
        raw: Vec<Interval>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Directive>, SchedulerError> {
        self.store.save_intervals(&raw)?;
        let set = clean(&raw, &self.rules);
        info!(raw = raw.len(), accepted = set.len(), "Rebuilt suspension intervals");
        *self.intervals.write().unwrap_or_else(|e| e.into_inner()) = set;
        self.recheck_all(now)
    }

    // ==================== Suspension state ====================

    pub fn suspension_enabled(&self) -> bool {
        self.suspension_enabled.load(Ordering::SeqCst)
    }

    pub fn suspension_state(&self) -> Option<SuspensionState> {
        self.cache().state().copied()
    }

    /// Cached verdict; see [`refresh_suspension`](Self::refresh_suspension).
    pub fn is_suspended(&self) -> bool {
        self.cache().is_active()
    }

    /// Recompute the verdict at `now`, persisting it when it flips.
    pub fn refresh_suspension(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<SuspensionState>, SchedulerError> {
        if !self.suspension_enabled() {
            return Ok(None);
        }
        let set = self.read_intervals();
        let mut cache = self.cache();
        let before = cache.state().copied();
        let state = cache.recompute(&set, local_time_of_day(now, &self.tz), now);
        if before != Some(state) {
            self.store.save_suspension_state(&state)?;
        }
        Ok(Some(state))
    }

    /// Turn suspension windows on or off and re-plan tasks.
    pub fn set_suspension_enabled(
        &self,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<Directive>, SchedulerError> {
        self.suspension_enabled.store(enabled, Ordering::SeqCst);
        self.store.save_suspension_enabled(enabled)?;
        if !enabled {
            self.cache().clear();
            self.store.delete_suspension_state()?;
        }
        info!(enabled, "Suspension windows toggled");
        self.recheck_all(now)
    }

    // ==================== Transitions ====================

    fn transition(
        &self,
        task: &mut Task,
        event: TaskEvent,
        now: DateTime<Utc>,
    ) -> Result<Directive, SchedulerError> {
        debug!(task = %task.id, state = task.state.name(), event = ?event, "Handling task event");
        match event {
            TaskEvent::Enable => self.on_enable(task, now),
            TaskEvent::Disable => self.on_disable(task),
            TaskEvent::AlarmFired { scheduler_id } => self.on_alarm(task, scheduler_id, now),
            TaskEvent::WorkerFinished {
                scheduler_id,
                outcome,
            } => self.on_worker_finished(task, scheduler_id, outcome, now),
            TaskEvent::Edited { target_changed } => self.on_edited(task, target_changed, now),
            TaskEvent::Recheck => self.on_recheck(task, now),
        }
    }

    fn on_enable(&self, task: &mut Task, now: DateTime<Utc>) -> Result<Directive, SchedulerError> {
        if task.enabled && task.state != TaskState::Idle {
            return Ok(Directive::Ignore);
        }
        task.enabled = true;
        if !task.scheduler_id.is_valid() {
            task.scheduler_id = self.allocate_id(now)?;
            if !task.scheduler_id.is_valid() {
                return Ok(self.unschedulable(task));
            }
        }
        self.instances.reset(task.id)?;

        let wake = if self.config.eager_first_run {
            now
        } else {
            self.next_period(task, now)?
        };
        info!(task = %task.id, "Enabled task");
        Ok(self.arm(task, wake))
    }

    fn on_disable(&self, task: &mut Task) -> Result<Directive, SchedulerError> {
        task.enabled = false;
        task.state = TaskState::Idle;
        self.instances.reset(task.id)?;
        info!(task = %task.id, "Disabled task");
        Ok(Directive::Cancel { task: task.id })
    }

    fn on_alarm(
        &self,
        task: &mut Task,
        scheduler_id: SchedulerId,
        now: DateTime<Utc>,
    ) -> Result<Directive, SchedulerError> {
        if !task.enabled || !scheduler_id.is_valid() || scheduler_id != task.scheduler_id {
            debug!(
                task = %task.id,
                fired = %scheduler_id,
                current = %task.scheduler_id,
                "Ignoring stale alarm"
            );
            return Ok(Directive::Ignore);
        }

        self.refresh_suspension(now)?;
        match task.state {
            TaskState::Scheduled { wake_at, .. } => {
                if self.suspended_until(now).is_some() {
                    debug!(task = %task.id, "Alarm inside suspension window");
                    return Ok(self.arm(task, now));
                }
                match self.instances.try_acquire(task.id, task.max_instances)? {
                    Admission::Admitted(count) => {
                        task.state = TaskState::Running { started_at: now };
                        info!(task = %task.id, instances = count, "Dispatching task");
                        Ok(Directive::Dispatch {
                            task: Box::new(task.clone()),
                            scheduler_id: task.scheduler_id,
                        })
                    }
                    Admission::Busy(count) => {
                        let retry_at =
                            wake_at.max(now) + Duration::seconds(self.config.busy_backoff_secs as i64);
                        task.last_outcome = Some(RunOutcome::Busy);
                        info!(
                            task = %task.id,
                            instances = count,
                            ceiling = task.max_instances,
                            retry_at = %retry_at,
                            "Task busy, backing off"
                        );
                        Ok(self.arm(task, retry_at))
                    }
                }
            }
            TaskState::Suspended { .. } => {
                // Window over: catch up from now, the skipped run is dropped
                let wake = self.next_period(task, now)?;
                Ok(self.arm(task, wake))
            }
            TaskState::Idle | TaskState::Running { .. } => Ok(Directive::Ignore),
        }
    }

    fn on_worker_finished(
        &self,
        task: &mut Task,
        scheduler_id: SchedulerId,
        outcome: RunOutcome,
        now: DateTime<Utc>,
    ) -> Result<Directive, SchedulerError> {
        if scheduler_id != task.scheduler_id {
            // Counter was reset when the epoch changed; this worker is not in it
            debug!(
                task = %task.id,
                finished = %scheduler_id,
                current = %task.scheduler_id,
                outcome = ?outcome,
                "Ignoring completion from previous epoch"
            );
            return Ok(Directive::Ignore);
        }
        let remaining = self.instances.decrease(task.id)?;
        info!(task = %task.id, outcome = ?outcome, remaining, "Worker finished");
        task.last_outcome = Some(outcome);
        task.last_run = Some(now);

        if !task.enabled || !matches!(task.state, TaskState::Running { .. }) {
            return Ok(Directive::Ignore);
        }
        self.refresh_suspension(now)?;
        let wake = self.next_period(task, now)?;
        Ok(self.arm(task, wake))
    }

    fn on_edited(
        &self,
        task: &mut Task,
        target_changed: bool,
        now: DateTime<Utc>,
    ) -> Result<Directive, SchedulerError> {
        if target_changed {
            self.instances.reset(task.id)?;
        }
        if target_changed || !task.scheduler_id.is_valid() {
            let previous = task.scheduler_id;
            task.scheduler_id = self.allocate_id(now)?;
            info!(task = %task.id, previous = %previous, scheduler_id = %task.scheduler_id, "New scheduling epoch");
            if !task.scheduler_id.is_valid() {
                return Ok(self.unschedulable(task));
            }
        }

        if !task.enabled {
            task.state = TaskState::Idle;
            return Ok(Directive::Ignore);
        }
        if matches!(task.state, TaskState::Running { .. }) && !target_changed {
            // Completion re-arms with the new settings
            return Ok(Directive::Ignore);
        }
        let wake = self.next_period(task, now)?;
        Ok(self.arm(task, wake))
    }

    fn on_recheck(&self, task: &mut Task, now: DateTime<Utc>) -> Result<Directive, SchedulerError> {
        if !task.enabled || !task.scheduler_id.is_valid() {
            return Ok(Directive::Ignore);
        }
        match task.state {
            TaskState::Scheduled { wake_at, .. } => {
                if self.suspended_until(wake_at).is_none() {
                    return Ok(Directive::Ignore);
                }
                info!(task = %task.id, wake_at = %wake_at, "Wake-up now inside suspension window");
                Ok(self.arm(task, wake_at))
            }
            TaskState::Suspended { resume_at } => {
                let window_holds = resume_at > now
                    && self.suspended_until(resume_at - Duration::minutes(1)) == Some(resume_at);
                if window_holds {
                    Ok(Directive::Ignore)
                } else {
                    info!(task = %task.id, "Suspension window changed, rescheduling");
                    let wake = self.next_period(task, now)?;
                    Ok(self.arm(task, wake))
                }
            }
            TaskState::Idle | TaskState::Running { .. } => Ok(Directive::Ignore),
        }
    }

    // ==================== Helpers ====================

    fn require_task(&self, id: TaskId) -> Result<Task, SchedulerError> {
        self.store
            .load_task(id)?
            .ok_or_else(|| SchedulerError::TaskNotFound(id.to_string()))
    }

    fn persist(&self, original: &Task, task: &Task) -> Result<(), SchedulerError> {
        if original != task {
            self.store.save_task(task)?;
        }
        Ok(())
    }

    fn cache(&self) -> MutexGuard<'_, SuspensionCache> {
        self.suspension.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read_intervals(&self) -> RwLockReadGuard<'_, IntervalSet> {
        self.intervals.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Allocate a scheduler id inside one atomic ledger update.
    fn allocate_id(&self, now: DateTime<Utc>) -> Result<SchedulerId, SchedulerError> {
        let capacity = self.config.history_capacity;
        self.store.update_history(|entries| {
            let mut history = SchedulerIdHistory::from_entries(capacity, entries.drain(..));
            let id = self.ids.allocate(&mut history, now);
            *entries = history.into_entries();
            id
        })
    }

    fn unschedulable(&self, task: &mut Task) -> Directive {
        task.scheduler_id = SchedulerId::INVALID;
        task.state = TaskState::Idle;
        warn!(task = %task.id, "No scheduler id available, task is unschedulable");
        Directive::Unschedulable { task: task.id }
    }

    fn next_period(&self, task: &Task, now: DateTime<Utc>) -> Result<DateTime<Utc>, SchedulerError> {
        i64::try_from(task.interval_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|period| now.checked_add_signed(period))
            .ok_or_else(|| {
                SchedulerError::InvalidTask(format!(
                    "interval of {}s is out of range",
                    task.interval_secs
                ))
            })
    }

    /// End of the suspension window `at` falls in, as an instant.
    fn suspended_until(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.suspension_enabled() {
            return None;
        }
        let set = self.read_intervals();
        let time_of_day = local_time_of_day(at, &self.tz);
        set.window_end(time_of_day).map(|end| {
            floor_to_minute(at) + Duration::minutes(time_of_day.minutes_until(end) as i64)
        })
    }

    /// Move `wake` past any suspension windows, chaining back-to-back ones.
    fn place_wake(&self, wake: DateTime<Utc>) -> (DateTime<Utc>, bool) {
        let mut at = wake;
        let mut suspended = false;
        let windows = self.read_intervals().len();
        for _ in 0..=windows {
            match self.suspended_until(at) {
                Some(end) => {
                    at = end;
                    suspended = true;
                }
                None => break,
            }
        }
        (at, suspended)
    }

    /// Set the task's next wake-up, pushed to a window end when needed.
    fn arm(&self, task: &mut Task, wake: DateTime<Utc>) -> Directive {
        let (at, suspended) = self.place_wake(wake);
        task.state = if suspended {
            TaskState::Suspended { resume_at: at }
        } else {
            TaskState::Scheduled {
                wake_at: at,
                kind: task.alarm_kind(),
            }
        };
        debug!(task = %task.id, state = task.state.name(), at = %at, "Armed task");
        Directive::Arm {
            task: task.id,
            scheduler_id: task.scheduler_id,
            at,
            kind: task.alarm_kind(),
        }
    }
}
