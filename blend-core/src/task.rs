//! Timed operations bound to one part each.
//!
//! A [`Task`] owns its timeline window and a boxed [`TaskAction`] that
//! knows how to turn local progress into new geometry for its part. The
//! scheduler only ever talks to the window and the typed flags; what the
//! action does to the geometry is its own business.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TaskError;
use crate::structure::Structure;
use crate::types::{PartId, Time};

/// Kind of structural operation a task performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Shrink,
    Merge,
    Morph,
    Split,
    Grow,
}

/// Geometry update performed by a task.
///
/// Implementations must be deterministic in `t`: the same local progress
/// always produces the same geometry for the same starting structure.
pub trait TaskAction {
    /// Updates the part `part` of `structure` for local progress `t` in `[0, 1]`.
    fn execute(&mut self, structure: &mut Structure, part: &str, t: f64)
    -> Result<(), TaskError>;
}

/// Action that leaves its part alone.
#[derive(Clone, Copy, Debug, Default)]
pub struct Hold;

impl TaskAction for Hold {
    fn execute(&mut self, structure: &mut Structure, part: &str, _t: f64) -> Result<(), TaskError> {
        structure
            .part(part)
            .map(|_| ())
            .ok_or_else(|| TaskError::MissingPart(part.to_string()))
    }
}

pub struct Task {
    pub part: PartId,
    pub kind: TaskKind,
    pub start: Time,
    pub duration: Time,
    /// Part acts as a propagation root during relinking.
    pub constraint: bool,
    /// For split tasks: the part whose morph feeds this split.
    pub split_from: Option<PartId>,
    /// For merge tasks: the part whose morph receives this merge.
    pub merge_to: Option<PartId>,
    action: Box<dyn TaskAction>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("part", &self.part)
            .field("kind", &self.kind)
            .field("start", &self.start)
            .field("duration", &self.duration)
            .field("constraint", &self.constraint)
            .field("split_from", &self.split_from)
            .field("merge_to", &self.merge_to)
            .finish_non_exhaustive()
    }
}

impl Task {
    pub fn new(
        part: impl Into<PartId>,
        kind: TaskKind,
        duration: Time,
        action: Box<dyn TaskAction>,
    ) -> Self {
        Self {
            part: part.into(),
            kind,
            start: 0.0,
            duration,
            constraint: false,
            split_from: None,
            merge_to: None,
            action,
        }
    }

    pub fn constraint(mut self, constraint: bool) -> Self {
        self.constraint = constraint;
        self
    }

    pub fn split_from(mut self, part: impl Into<PartId>) -> Self {
        self.split_from = Some(part.into());
        self
    }

    pub fn merge_to(mut self, part: impl Into<PartId>) -> Self {
        self.merge_to = Some(part.into());
        self
    }

    pub fn set_start(&mut self, start: Time) {
        self.start = start;
    }

    pub fn end_time(&self) -> Time {
        self.start + self.duration
    }

    /// Local progress of this task at timeline time `global`.
    ///
    /// `0` up to and including the start, `1` from the end on, linear in
    /// between. A zero-length task jumps from `0` to `1` at its start.
    pub fn local_progress(&self, global: Time) -> f64 {
        if global < self.start {
            return 0.0;
        }
        if global >= self.end_time() {
            return 1.0;
        }
        ((global - self.start) / self.duration).clamp(0.0, 1.0)
    }

    /// Whether local progress `t` lies strictly inside the task window.
    ///
    /// Both ends are excluded: at `t == 0` the task has not begun and at
    /// `t == 1` it has finished.
    pub fn is_active(&self, t: f64) -> bool {
        t > 0.0 && t < 1.0
    }

    /// Runs the action for local progress `t`.
    pub fn execute(&mut self, structure: &mut Structure, t: f64) -> Result<(), TaskError> {
        self.action.execute(structure, &self.part, t)
    }
}
