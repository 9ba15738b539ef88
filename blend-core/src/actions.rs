//! Stock task actions.
//!
//! These cover the common per-part interpolations: a rigid translation for
//! morphs and a scale about the centroid for growing and shrinking parts.
//! Both update geometry incrementally or relative to the current centroid,
//! so moves made by the relinker between steps are kept.

use glam::Vec3;

use crate::error::TaskError;
use crate::structure::Structure;
use crate::task::TaskAction;

/// Moves a part rigidly by `offset` over the task window.
#[derive(Clone, Debug)]
pub struct Translate {
    pub offset: Vec3,
    applied: f64,
}

impl Translate {
    pub fn new(offset: Vec3) -> Self {
        Self {
            offset,
            applied: 0.0,
        }
    }
}

impl TaskAction for Translate {
    fn execute(&mut self, structure: &mut Structure, part: &str, t: f64) -> Result<(), TaskError> {
        let node = structure
            .part_mut(part)
            .ok_or_else(|| TaskError::MissingPart(part.to_string()))?;
        node.move_by(self.offset * (t - self.applied) as f32);
        self.applied = t;
        Ok(())
    }
}

/// Scales a part about its centroid from `from` to `to` times its shape at
/// the first step.
///
/// With `remove_when_done` the part is taken out of the structure once
/// progress reaches `1`, as a shrink or merge finishing does.
#[derive(Clone, Debug)]
pub struct Scale {
    pub from: f32,
    pub to: f32,
    pub remove_when_done: bool,
    shape: Option<Vec<Vec3>>,
    removed: bool,
}

impl Scale {
    pub fn new(from: f32, to: f32) -> Self {
        Self {
            from,
            to,
            remove_when_done: false,
            shape: None,
            removed: false,
        }
    }

    /// Grows from a point to full size.
    pub fn grow() -> Self {
        Self::new(0.0, 1.0)
    }

    /// Shrinks to a point and removes the part.
    pub fn shrink() -> Self {
        Self {
            remove_when_done: true,
            ..Self::new(1.0, 0.0)
        }
    }
}

impl TaskAction for Scale {
    fn execute(&mut self, structure: &mut Structure, part: &str, t: f64) -> Result<(), TaskError> {
        if self.removed {
            return Ok(());
        }
        let node = structure
            .part_mut(part)
            .ok_or_else(|| TaskError::MissingPart(part.to_string()))?;

        let center = node.centroid();
        let shape = self
            .shape
            .get_or_insert_with(|| node.control_points().iter().map(|p| *p - center).collect());

        let s = self.from + (self.to - self.from) * t as f32;
        let points = shape.iter().map(|d| center + *d * s).collect();
        if !node.set_control_points(points) {
            return Err(TaskError::GeometryMismatch {
                part: part.to_string(),
                message: "control point count changed since the first step".to_string(),
            });
        }

        if self.remove_when_done && t >= 1.0 {
            structure.remove_part(part);
            self.removed = true;
        }
        Ok(())
    }
}
