//! Temporal layout of tasks on the blend timeline.
//!
//! [`layout`] assigns every task a start time in one pass over the kind
//! precedence list, then anchors the morph feeding each split (and the
//! morph receiving each merge) to start together with it.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{Error, Result};
use crate::task::{Task, TaskKind};
use crate::types::Time;

/// Checks that the task set can be laid out.
///
/// Rejects two tasks on one part, a split/merge without a sibling part or
/// naming a part without a task, a kind absent from `order`, and negative or non-finite durations.
pub fn validate(tasks: &[Task], order: &[TaskKind]) -> Result<()> {
    let mut parts = HashSet::with_capacity(tasks.len());
    for t in tasks {
        if !parts.insert(t.part.as_str()) {
            return Err(Error::DuplicateTask(t.part.clone()));
        }
        if !(t.duration.is_finite() && t.duration >= 0.0) {
            return Err(Error::InvalidDuration {
                part: t.part.clone(),
                duration: t.duration,
            });
        }
        if !order.contains(&t.kind) {
            return Err(Error::KindNotOrdered(t.kind));
        }
    }

    for t in tasks {
        let siblings = [
            (TaskKind::Split, "split-from", &t.split_from),
            (TaskKind::Merge, "merge-to", &t.merge_to),
        ];
        for (kind, relation, sibling) in siblings {
            if t.kind != kind {
                continue;
            }
            let Some(id) = sibling else {
                return Err(Error::MissingSibling {
                    task: t.part.clone(),
                    relation,
                });
            };
            if !parts.contains(id.as_str()) {
                return Err(Error::DanglingSibling {
                    task: t.part.clone(),
                    relation,
                    missing: id.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Lays out `tasks` in place following `order`.
///
/// Every kind but morph starts all of its tasks together at the cursor and
/// moves the cursor to the latest end among them. Morph tasks are chained
/// one after another in task order. Afterwards each split (merge) task
/// pulls the task on its `split_from` (`merge_to`) part to its own start.
///
/// Returns the total execution time.
pub fn layout(tasks: &mut [Task], order: &[TaskKind]) -> Result<Time> {
    validate(tasks, order)?;

    let mut cursor: Time = 0.0;
    for &kind in order {
        let mut future = cursor;
        for task in tasks.iter_mut().filter(|t| t.kind == kind) {
            task.set_start(cursor);
            future = future.max(task.end_time());
            if kind == TaskKind::Morph {
                cursor = future;
            }
        }
        debug!(?kind, start = cursor, end = future, "kind group placed");
        cursor = future;
    }

    for i in 0..tasks.len() {
        let anchor = match tasks[i].kind {
            TaskKind::Split => tasks[i].split_from.clone(),
            TaskKind::Merge => tasks[i].merge_to.clone(),
            _ => None,
        };
        let Some(sibling) = anchor else { continue };

        let start = tasks[i].start;
        if let Some(target) = tasks.iter_mut().find(|t| t.part == sibling) {
            target.set_start(start);
        }
    }

    Ok(total_execution_time(tasks))
}

/// Latest end time over all tasks, `0` for no tasks.
pub fn total_execution_time(tasks: &[Task]) -> Time {
    tasks.iter().map(Task::end_time).fold(0.0, Time::max)
}

/// Starts every task at time zero.
pub fn start_all_same_time(tasks: &mut [Task]) {
    for t in tasks {
        t.set_start(0.0);
    }
}

/// Task indices ordered by start time, ties kept in task order.
pub fn tasks_sorted_by_start(tasks: &[Task]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..tasks.len()).collect();
    idx.sort_by(|&a, &b| tasks[a].start.total_cmp(&tasks[b].start));
    idx
}
