//! Scheduler: owns the tasks, the active structure and the recorded run.
//!
//! The typical lifecycle looks like:
//! 1. [`Scheduler::new`]: validate the task set against the structure.
//! 2. [`Scheduler::schedule`]: lay out start times.
//! 3. [`Scheduler::run`]: step normalized time from `0` past `1`,
//!    executing tasks, relinking and recording one snapshot per step.
//! 4. [`Scheduler::snapshot`] / [`Scheduler::snapshot_at_time`]: play the
//!    recording back.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::layout;
use crate::primitives::ArapSettings;
use crate::relink::{RelinkStats, Relinker};
use crate::structure::Structure;
use crate::task::Task;
use crate::types::{PartId, Time};

/// Receives run notifications. Every method defaults to doing nothing.
pub trait SchedulerObserver {
    fn on_started(&mut self) {}

    /// Called right after snapshot `index` was recorded, before the
    /// cancellation check of that step.
    fn on_step(&mut self, _index: usize, _snapshot: &Structure) {}

    fn on_progress(&mut self, _percent: u8) {}

    fn on_done(&mut self) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl SchedulerObserver for NoopObserver {}

/// Shared cooperative cancellation flag.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { steps: usize },
    Cancelled { steps: usize },
}

#[derive(Debug)]
pub struct Scheduler {
    cfg: Config,
    tasks: Vec<Task>,
    active: Structure,
    snapshots: Vec<Structure>,
    relinker: Relinker,
    cancel: CancelHandle,
    total_time: Time,
}

impl Scheduler {
    /// Creates a scheduler over `active` and `tasks`.
    ///
    /// Fails on an invalid config, on a task set that cannot be laid out,
    /// or when a task is bound to a part that is not in `active`.
    pub fn new(active: Structure, tasks: Vec<Task>, cfg: Config) -> Result<Self> {
        cfg.validate()?;
        layout::validate(&tasks, &cfg.layout_order)?;
        if let Some(t) = tasks.iter().find(|t| active.part(&t.part).is_none()) {
            return Err(Error::UnknownPart(t.part.clone()));
        }

        let relinker = Relinker::new(ArapSettings {
            size: cfg.arap_size,
            iterations: cfg.arap_iterations,
        });
        let total_time = layout::total_execution_time(&tasks);

        info!(
            tasks = tasks.len(),
            parts = active.parts.len(),
            links = active.links.len(),
            "scheduler created"
        );
        Ok(Self {
            cfg,
            tasks,
            active,
            snapshots: Vec::new(),
            relinker,
            cancel: CancelHandle::default(),
            total_time,
        })
    }

    /// Lays out every task's start time and returns the total time.
    pub fn schedule(&mut self) -> Result<Time> {
        self.total_time = layout::layout(&mut self.tasks, &self.cfg.layout_order)?;
        info!(total = self.total_time, "tasks scheduled");
        Ok(self.total_time)
    }

    /// Starts every task at time zero instead of the layout's order.
    pub fn start_all_same_time(&mut self) {
        layout::start_all_same_time(&mut self.tasks);
        self.total_time = layout::total_execution_time(&self.tasks);
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task_for_part(&self, part: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.part == part)
    }

    /// Task indices ordered by start time.
    pub fn tasks_sorted_by_start(&self) -> Vec<usize> {
        layout::tasks_sorted_by_start(&self.tasks)
    }

    pub fn active_structure(&self) -> &Structure {
        &self.active
    }

    pub fn relinker(&self) -> &Relinker {
        &self.relinker
    }

    pub fn total_execution_time(&self) -> Time {
        self.total_time
    }

    /// Part ids whose tasks are active at timeline time `time`.
    pub fn active_tasks(&self, time: Time) -> Vec<PartId> {
        self.tasks
            .iter()
            .filter(|t| t.is_active(t.local_progress(time)))
            .map(|t| t.part.clone())
            .collect()
    }

    /// Number of steps a run takes: normalized time advances by
    /// `time_step` until the first step at or past `1`.
    pub fn step_count(&self) -> usize {
        let dt = self.cfg.time_step;
        // Tolerance keeps exact divisors from gaining a step to rounding.
        (1.0 / dt - 1e-9).ceil().max(0.0) as usize + 1
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Requests the running (or next) run to stop after its current step.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Executes the whole timeline, recording one snapshot per step.
    ///
    /// Snapshots from any earlier run are discarded. A cancellation request
    /// pending when the run starts is cleared.
    #[instrument(skip_all, name = "run")]
    pub fn run(&mut self, observer: &mut dyn SchedulerObserver) -> RunOutcome {
        self.cancel.reset();
        self.snapshots.clear();

        let steps = self.step_count();
        let total = self.total_time;
        info!(steps, total, time_step = self.cfg.time_step, "run starting");
        observer.on_started();

        for step in 0..steps {
            let global = step as f64 * self.cfg.time_step;
            let actual = global * total;

            let stats = self.execute_step(actual);
            debug!(step, actual, ?stats, "step done");

            let snapshot = self.active.clone();
            self.snapshots.push(snapshot);
            observer.on_step(step, &self.snapshots[step]);

            if self.cancel.is_cancelled() {
                info!(step, recorded = self.snapshots.len(), "run cancelled");
                return RunOutcome::Cancelled {
                    steps: self.snapshots.len(),
                };
            }

            observer.on_progress((global * 100.0).clamp(0.0, 100.0) as u8);
        }

        info!(recorded = self.snapshots.len(), "run done");
        observer.on_done();
        RunOutcome::Completed {
            steps: self.snapshots.len(),
        }
    }

    /// Runs every task for timeline time `actual` in task order, then
    /// relinks.
    fn execute_step(&mut self, actual: Time) -> RelinkStats {
        for i in 0..self.tasks.len() {
            let local = self.tasks[i].local_progress(actual);

            let running = self.active_tasks(actual);
            self.active.running_tasks = running;

            let task = &mut self.tasks[i];
            if let Err(err) = task.execute(&mut self.active, local) {
                warn!(part = %task.part, local, %err, "task step failed");
            }
            if let Some(part) = self.active.part_mut(&task.part) {
                part.local_progress = local;
            }
        }

        self.relinker.relink(&mut self.active, &self.tasks, actual)
    }

    pub fn snapshots(&self) -> &[Structure] {
        &self.snapshots
    }

    pub fn snapshot(&self, index: usize) -> Option<&Structure> {
        self.snapshots.get(index)
    }

    /// Snapshot shown at timeline time `time` in `[0, total]`.
    pub fn snapshot_at_time(&self, time: Time) -> Option<&Structure> {
        let len = self.snapshots.len();
        if len == 0 {
            return None;
        }
        let frac = if self.total_time > 0.0 {
            time / self.total_time
        } else {
            0.0
        };
        let idx = (len as f64 * frac).floor().clamp(0.0, (len - 1) as f64) as usize;
        self.snapshots.get(idx)
    }
}
