//! As-rigid-as-possible deformation of a curve's control polygon.
//!
//! The deformer follows the usual local/global alternation:
//!
//! 1. **Local step**: for every edge, fit the rotation that best maps the
//!    rest edges in its neighborhood (`size` edges on either side) onto the
//!    current edges, and rotate the rest edge by it.
//! 2. **Global step**: place the free points so consecutive differences
//!    match the rotated rest edges in the least-squares sense, with anchor
//!    and control points held at their targets. On a chain this has a
//!    closed form: spans between two constrained points spread their
//!    residual evenly over their edges, open spans are integrated from the
//!    nearest constrained point.
//!
//! Usage mirrors the control/anchor workflow of interactive deformers:
//! [`ArapCurveDeformer::clear_all`], [`ArapCurveDeformer::set_control`],
//! [`ArapCurveDeformer::set_anchor`], [`ArapCurveDeformer::make_ready`],
//! [`ArapCurveDeformer::update_control`], then [`ArapCurveDeformer::deform`].

use glam::{Quat, Vec3};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ArapError {
    #[error("control point index {index} out of range for {len} points")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("no control point has been set")]
    NoControl,

    #[error("deformer used before make_ready")]
    NotReady,

    #[error("index {0} is not a control point")]
    NotAControl(usize),

    #[error("deformation produced non-finite positions")]
    Diverged,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Role {
    Free,
    Anchor,
    Control,
}

#[derive(Debug)]
pub struct ArapCurveDeformer {
    /// Current deformed positions; equal to the rest pose until `deform`.
    pub points: Vec<Vec3>,
    rest: Vec<Vec3>,
    size: usize,
    roles: Vec<Role>,
    targets: Vec<Vec3>,
    ready: bool,
}

impl ArapCurveDeformer {
    /// Creates a deformer whose rest pose is `points`.
    ///
    /// ### Parameters
    /// - `points` - Control polygon in its rest pose.
    /// - `size` - Number of neighboring edges on each side used when fitting
    ///   a rotation; `0` fits every edge on its own.
    pub fn new(points: &[Vec3], size: usize) -> Self {
        Self {
            points: points.to_vec(),
            rest: points.to_vec(),
            size,
            roles: vec![Role::Free; points.len()],
            targets: points.to_vec(),
            ready: false,
        }
    }

    /// Drops every anchor and control, resetting targets to the rest pose.
    pub fn clear_all(&mut self) {
        self.roles.fill(Role::Free);
        self.targets.copy_from_slice(&self.rest);
        self.ready = false;
    }

    /// Marks `index` as a control point. A later `set_anchor` on the same
    /// index replaces the role.
    pub fn set_control(&mut self, index: usize) -> Result<(), ArapError> {
        self.set_role(index, Role::Control)
    }

    /// Pins `index` at its rest position.
    pub fn set_anchor(&mut self, index: usize) -> Result<(), ArapError> {
        self.set_role(index, Role::Anchor)
    }

    fn set_role(&mut self, index: usize, role: Role) -> Result<(), ArapError> {
        let len = self.roles.len();
        let slot = self
            .roles
            .get_mut(index)
            .ok_or(ArapError::IndexOutOfRange { index, len })?;
        *slot = role;
        self.targets[index] = self.rest[index];
        self.ready = false;
        Ok(())
    }

    /// Validates the constraint setup. Must be called after the last
    /// `set_control`/`set_anchor` and before `update_control`.
    pub fn make_ready(&mut self) -> Result<(), ArapError> {
        if !self.roles.contains(&Role::Control) {
            return Err(ArapError::NoControl);
        }
        self.ready = true;
        Ok(())
    }

    /// Sets the target position of a control point.
    pub fn update_control(&mut self, index: usize, target: Vec3) -> Result<(), ArapError> {
        if !self.ready {
            return Err(ArapError::NotReady);
        }
        match self.roles.get(index) {
            Some(Role::Control) => {
                self.targets[index] = target;
                Ok(())
            }
            Some(_) => Err(ArapError::NotAControl(index)),
            None => Err(ArapError::IndexOutOfRange {
                index,
                len: self.roles.len(),
            }),
        }
    }

    /// Runs `iterations` local/global rounds and returns the deformed points.
    ///
    /// The returned points are also kept in `self.points`.
    pub fn deform(&mut self, iterations: usize) -> Result<Vec<Vec3>, ArapError> {
        if !self.ready {
            return Err(ArapError::NotReady);
        }

        let rest_edges: Vec<Vec3> = self.rest.windows(2).map(|w| w[1] - w[0]).collect();

        // Initial guess: rest edges with the constraint residual spread
        // linearly along each span.
        let mut current = self.global_step(&rest_edges);

        for _ in 0..iterations {
            let rotated = self.local_step(&rest_edges, &current);
            current = self.global_step(&rotated);
        }

        if current.iter().any(|p| !p.is_finite()) {
            return Err(ArapError::Diverged);
        }

        self.points = current.clone();
        Ok(current)
    }

    fn local_step(&self, rest_edges: &[Vec3], current: &[Vec3]) -> Vec<Vec3> {
        let cur_edges: Vec<Vec3> = current.windows(2).map(|w| w[1] - w[0]).collect();
        let m = rest_edges.len();

        (0..m)
            .map(|i| {
                let lo = i.saturating_sub(self.size);
                let hi = (i + self.size + 1).min(m);

                let rest_dir: Vec3 = rest_edges[lo..hi]
                    .iter()
                    .map(|e| e.normalize_or_zero())
                    .sum();
                let cur_dir: Vec3 = cur_edges[lo..hi]
                    .iter()
                    .map(|e| e.normalize_or_zero())
                    .sum();

                let (from, to) = (rest_dir.normalize_or_zero(), cur_dir.normalize_or_zero());
                if from == Vec3::ZERO || to == Vec3::ZERO {
                    return rest_edges[i];
                }
                Quat::from_rotation_arc(from, to) * rest_edges[i]
            })
            .collect()
    }

    fn global_step(&self, edges: &[Vec3]) -> Vec<Vec3> {
        let n = self.rest.len();
        let mut out = self.targets.clone();

        let constrained: Vec<usize> = (0..n).filter(|&i| self.roles[i] != Role::Free).collect();
        let (Some(&first), Some(&last)) = (constrained.first(), constrained.last()) else {
            return out;
        };

        for i in (0..first).rev() {
            out[i] = out[i + 1] - edges[i];
        }
        for i in last..n.saturating_sub(1) {
            out[i + 1] = out[i] + edges[i];
        }

        for pair in constrained.windows(2) {
            let (l, r) = (pair[0], pair[1]);
            if r - l < 2 {
                continue;
            }
            let integrated: Vec3 = edges[l..r].iter().copied().sum();
            let residual = (out[r] - out[l] - integrated) / (r - l) as f32;
            for i in l..r - 1 {
                out[i + 1] = out[i] + edges[i] + residual;
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight(n: usize) -> Vec<Vec3> {
        (0..n).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect()
    }

    fn ready_deformer(points: &[Vec3], anchor: usize, control: usize) -> ArapCurveDeformer {
        let mut d = ArapCurveDeformer::new(points, 1);
        d.clear_all();
        d.set_control(control).unwrap();
        d.set_anchor(anchor).unwrap();
        d.make_ready().unwrap();
        d
    }

    #[test]
    fn anchor_stays_and_control_reaches_target() {
        let pts = straight(5);
        let mut d = ready_deformer(&pts, 0, 4);
        let target = Vec3::new(3.0, 2.0, 0.0);
        d.update_control(4, target).unwrap();

        let out = d.deform(4).unwrap();

        assert_eq!(out[0], pts[0]);
        assert_eq!(out[4], target);
        assert_eq!(d.points, out);
    }

    #[test]
    fn rigid_target_keeps_rest_shape() {
        // Moving the control to where a rotation would put it needs no stretch.
        let pts = straight(4);
        let mut d = ready_deformer(&pts, 0, 3);
        d.update_control(3, Vec3::new(0.0, 3.0, 0.0)).unwrap();

        let out = d.deform(8).unwrap();

        for w in out.windows(2) {
            assert!(((w[1] - w[0]).length() - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn open_end_follows_rest_edges() {
        let pts = straight(4);
        let mut d = ready_deformer(&pts, 3, 2);
        d.update_control(2, Vec3::new(2.0, 0.0, 0.0)).unwrap();

        let out = d.deform(2).unwrap();

        assert!((out[0] - Vec3::new(0.0, 0.0, 0.0)).length() < 1e-5);
        assert!((out[1] - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn deform_requires_a_control() {
        let mut d = ArapCurveDeformer::new(&straight(3), 1);
        d.set_anchor(0).unwrap();
        assert_eq!(d.make_ready(), Err(ArapError::NoControl));
        assert_eq!(d.deform(1), Err(ArapError::NotReady));
    }

    #[test]
    fn anchor_replaces_control_on_same_index() {
        let mut d = ArapCurveDeformer::new(&straight(1), 1);
        d.set_control(0).unwrap();
        d.set_anchor(0).unwrap();
        assert_eq!(d.make_ready(), Err(ArapError::NoControl));
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        let mut d = ArapCurveDeformer::new(&straight(2), 1);
        assert_eq!(
            d.set_control(5),
            Err(ArapError::IndexOutOfRange { index: 5, len: 2 })
        );
        d.set_control(1).unwrap();
        d.make_ready().unwrap();
        assert_eq!(d.update_control(0, Vec3::ONE), Err(ArapError::NotAControl(0)));
    }
}
