//! The blended structure: parts, attachment links and graph-level state.
//!
//! A [`Structure`] is the one live graph mutated by every task and by the
//! relinker during a run. Cloning it produces the deep copy recorded as a
//! snapshot.

use glam::{Vec2, Vec3};
use indexmap::IndexMap;

use crate::types::{LinkId, PartId};

/// Kind of structural unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PartKind {
    Curve,
    Sheet,
}

/// Control geometry of a part.
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    /// Ordered control polygon.
    Curve { points: Vec<Vec3> },
    /// Row-major grid of `rows * cols` control points.
    Sheet {
        rows: usize,
        cols: usize,
        points: Vec<Vec3>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Part {
    pub id: PartId,
    pub geometry: Geometry,
    /// Local progress of the task bound to this part, stamped every step.
    pub local_progress: f64,
    /// Values owned by collaborators outside the scheduler.
    pub properties: IndexMap<String, String>,
}

impl Part {
    pub fn curve(id: impl Into<PartId>, points: Vec<Vec3>) -> Self {
        Self {
            id: id.into(),
            geometry: Geometry::Curve { points },
            local_progress: 0.0,
            properties: IndexMap::new(),
        }
    }

    /// Creates a sheet from a row-major control grid.
    ///
    /// ### Panics
    /// Panics if `points.len() != rows * cols`.
    pub fn sheet(id: impl Into<PartId>, rows: usize, cols: usize, points: Vec<Vec3>) -> Self {
        assert_eq!(points.len(), rows * cols);
        Self {
            id: id.into(),
            geometry: Geometry::Sheet { rows, cols, points },
            local_progress: 0.0,
            properties: IndexMap::new(),
        }
    }

    pub fn kind(&self) -> PartKind {
        match self.geometry {
            Geometry::Curve { .. } => PartKind::Curve,
            Geometry::Sheet { .. } => PartKind::Sheet,
        }
    }

    pub fn control_points(&self) -> &[Vec3] {
        match &self.geometry {
            Geometry::Curve { points } | Geometry::Sheet { points, .. } => points,
        }
    }

    /// Replaces the control points, keeping the grid shape of a sheet.
    ///
    /// Returns `false` and leaves the part untouched when the point count
    /// does not match the existing geometry.
    pub fn set_control_points(&mut self, new_points: Vec<Vec3>) -> bool {
        match &mut self.geometry {
            Geometry::Curve { points } => {
                *points = new_points;
                true
            }
            Geometry::Sheet { points, .. } => {
                if points.len() != new_points.len() {
                    return false;
                }
                *points = new_points;
                true
            }
        }
    }

    /// Rigidly moves every control point by `delta`.
    pub fn move_by(&mut self, delta: Vec3) {
        let points = match &mut self.geometry {
            Geometry::Curve { points } | Geometry::Sheet { points, .. } => points,
        };
        for p in points {
            *p += delta;
        }
    }

    pub fn centroid(&self) -> Vec3 {
        let points = self.control_points();
        if points.is_empty() {
            return Vec3::ZERO;
        }
        points.iter().copied().sum::<Vec3>() / points.len() as f32
    }

    /// Evaluates the world position at a parametric coordinate.
    ///
    /// A curve reads `coord.x` as a uniform parameter along its control
    /// polygon; a sheet interpolates its grid bilinearly at `(u, v)` with
    /// `u` across columns and `v` across rows. Parameters are clamped to
    /// `[0, 1]`. Empty geometry evaluates to the origin.
    pub fn position_at(&self, coord: Vec2) -> Vec3 {
        match &self.geometry {
            Geometry::Curve { points } => eval_polyline(points, coord.x),
            Geometry::Sheet { rows, cols, points } => {
                if points.is_empty() {
                    return Vec3::ZERO;
                }
                let (r0, r1, fv) = bracket(coord.y, *rows);
                let (c0, c1, fu) = bracket(coord.x, *cols);
                let at = |r: usize, c: usize| points[r * cols + c];
                let top = at(r0, c0).lerp(at(r0, c1), fu);
                let bottom = at(r1, c0).lerp(at(r1, c1), fu);
                top.lerp(bottom, fv)
            }
        }
    }

    /// Index of the control point closest to a curve parameter.
    ///
    /// Returns `None` for sheets and for curves without control points.
    pub fn control_point_index_from_coord(&self, u: f32) -> Option<usize> {
        match &self.geometry {
            Geometry::Curve { points } if !points.is_empty() => {
                let last = points.len() - 1;
                let idx = (u.clamp(0.0, 1.0) * last as f32).round() as usize;
                Some(idx.min(last))
            }
            _ => None,
        }
    }
}

/// Splits a parameter over `n` samples into the two bracketing indices and
/// the blend factor between them.
fn bracket(t: f32, n: usize) -> (usize, usize, f32) {
    if n <= 1 {
        return (0, 0, 0.0);
    }
    let s = t.clamp(0.0, 1.0) * (n - 1) as f32;
    let i0 = (s.floor() as usize).min(n - 2);
    (i0, i0 + 1, s - i0 as f32)
}

fn eval_polyline(points: &[Vec3], t: f32) -> Vec3 {
    match points.len() {
        0 => Vec3::ZERO,
        1 => points[0],
        n => {
            let (i0, i1, f) = bracket(t, n);
            points[i0].lerp(points[i1], f)
        }
    }
}

/// Undirected joint between two parts.
#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    pub a: PartId,
    pub b: PartId,
    /// Where the joint sits on `a`.
    pub coord_a: Vec2,
    /// Where the joint sits on `b`.
    pub coord_b: Vec2,
}

impl Link {
    pub fn new(a: impl Into<PartId>, coord_a: Vec2, b: impl Into<PartId>, coord_b: Vec2) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
            coord_a,
            coord_b,
        }
    }

    pub fn has_part(&self, id: &str) -> bool {
        self.a == id || self.b == id
    }

    /// The endpoint opposite to `id`, or `None` if `id` is not on this link.
    pub fn other(&self, id: &str) -> Option<&PartId> {
        if self.a == id {
            Some(&self.b)
        } else if self.b == id {
            Some(&self.a)
        } else {
            None
        }
    }

    /// Parametric coordinate of the joint on part `id`.
    pub fn coord(&self, id: &str) -> Option<Vec2> {
        if self.a == id {
            Some(self.coord_a)
        } else if self.b == id {
            Some(self.coord_b)
        } else {
            None
        }
    }
}

/// The live graph of parts and links.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Structure {
    pub parts: IndexMap<PartId, Part>,
    pub links: Vec<Link>,
    /// Ids of the parts whose tasks are active at the current instant.
    pub running_tasks: Vec<PartId>,
    /// Graph-level values owned by collaborators outside the scheduler.
    pub properties: IndexMap<String, String>,
}

impl Structure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a part, returning the part it replaced if the id was taken.
    pub fn add_part(&mut self, part: Part) -> Option<Part> {
        self.parts.insert(part.id.clone(), part)
    }

    /// Removes a part together with every link incident to it.
    pub fn remove_part(&mut self, id: &str) -> Option<Part> {
        let removed = self.parts.shift_remove(id)?;
        self.links.retain(|l| !l.has_part(id));
        Some(removed)
    }

    pub fn add_link(&mut self, link: Link) -> LinkId {
        self.links.push(link);
        self.links.len() - 1
    }

    pub fn part(&self, id: &str) -> Option<&Part> {
        self.parts.get(id)
    }

    pub fn part_mut(&mut self, id: &str) -> Option<&mut Part> {
        self.parts.get_mut(id)
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id)
    }

    /// Links incident to `id`, in insertion order.
    pub fn incident_links(&self, id: &str) -> Vec<LinkId> {
        self.links
            .iter()
            .enumerate()
            .filter_map(|(i, l)| if l.has_part(id) { Some(i) } else { None })
            .collect()
    }

    /// Current world position of the joint on part `id`.
    pub fn link_position(&self, link: LinkId, id: &str) -> Option<Vec3> {
        let link = self.links.get(link)?;
        let coord = link.coord(id)?;
        Some(self.parts.get(id)?.position_at(coord))
    }

    /// Current world position of the joint on the part opposite to `id`.
    pub fn link_position_other(&self, link: LinkId, id: &str) -> Option<Vec3> {
        let link = self.links.get(link)?;
        let other = link.other(id)?;
        let coord = link.coord(other)?;
        Some(self.parts.get(other.as_str())?.position_at(coord))
    }
}
