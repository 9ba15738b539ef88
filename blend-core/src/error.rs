//! Scheduler errors

use thiserror::Error;

use crate::arap::ArapError;
use crate::task::TaskKind;
use crate::types::{LinkId, PartId};

/// Scheduler result type
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration errors, all rejected before a run starts.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("more than one task is bound to part {0}")]
    DuplicateTask(PartId),

    #[error("task on {task} references {relation} part {missing}, which has no task")]
    DanglingSibling {
        task: PartId,
        relation: &'static str,
        missing: PartId,
    },

    #[error("{task} task needs a {relation} part")]
    MissingSibling {
        task: PartId,
        relation: &'static str,
    },

    #[error("task kind {0:?} does not appear in the layout order")]
    KindNotOrdered(TaskKind),

    #[error("task on {0} is bound to a part missing from the structure")]
    UnknownPart(PartId),

    #[error("time step must lie in (0, 1], got {0}")]
    InvalidTimeStep(f64),

    #[error("task on {part} has invalid duration {duration}")]
    InvalidDuration { part: PartId, duration: f64 },
}

/// Failure reported by a task action while executing one step.
///
/// Local to the task: the loop logs it and moves on to the next task.
#[derive(Debug, Error, PartialEq)]
pub enum TaskError {
    #[error("part {0} is not in the active structure")]
    MissingPart(PartId),

    #[error("part {part} geometry does not match the action: {message}")]
    GeometryMismatch { part: PartId, message: String },
}

/// Failure while resolving one part during relinking.
///
/// Never fatal: the relinker leaves the part at its geometry from before
/// the failed resolution and keeps propagating.
#[derive(Debug, Error, PartialEq)]
pub enum RelinkError {
    #[error("part {0} is not in the active structure")]
    MissingPart(PartId),

    #[error("link {link} does not touch part {part}")]
    DetachedLink { link: LinkId, part: PartId },

    #[error("part {0} is not a curve")]
    NotACurve(PartId),

    #[error("deformation of {part} failed: {source}")]
    Deform {
        part: PartId,
        #[source]
        source: ArapError,
    },
}
