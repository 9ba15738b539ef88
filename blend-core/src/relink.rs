//! Positional consistency between joined parts.
//!
//! After every simulated instant the relinker walks the active graph and
//! re-attaches parts whose neighbors moved:
//!
//! - Every active **constraint-driven** task seeds a breadth-first wave
//!   from its part ([`Relinker::relink_constraint_node`]). A part visited by
//!   the wave is resolved against the neighbors already fixed by it, then
//!   becomes fixed itself.
//! - Every active **free** task on a sheet re-attaches its part to all of
//!   its neighbors directly ([`Relinker::relink_free_node`]).
//!
//! The fixed map lives on the relinker, not on the parts, and is rebuilt
//! from scratch by each constraint wave. When two constraint roots are
//! active in the same instant, the later one in task order wipes the
//! earlier one's fixed marks before propagating; geometry already moved by
//! the earlier wave stays moved.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use crate::error::RelinkError;
use crate::primitives::{
    ArapSettings, deform_curve_by_link, rigid_translate_by_link, translate_to_match_midpoint,
};
use crate::structure::{PartKind, Structure};
use crate::task::Task;
use crate::types::{LinkId, PartId, Time};

/// Counters for one relink pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelinkStats {
    /// Constraint waves started.
    pub roots: usize,
    /// Free sheets re-attached.
    pub free: usize,
    /// Parts moved by a primitive.
    pub resolved: usize,
    /// Resolutions that failed and were rolled back.
    pub failed: usize,
}

#[derive(Debug)]
pub struct Relinker {
    settings: ArapSettings,
    fixed: IndexMap<PartId, bool>,
}

impl Relinker {
    pub fn new(settings: ArapSettings) -> Self {
        Self {
            settings,
            fixed: IndexMap::new(),
        }
    }

    /// Fixed marks left by the most recent constraint wave.
    pub fn fixed(&self) -> &IndexMap<PartId, bool> {
        &self.fixed
    }

    pub fn is_fixed(&self, id: &str) -> bool {
        self.fixed.get(id).copied().unwrap_or(false)
    }

    /// Relinks every task active at timeline time `time`, in task order.
    pub fn relink(&mut self, structure: &mut Structure, tasks: &[Task], time: Time) -> RelinkStats {
        let mut stats = RelinkStats::default();

        for task in tasks {
            if !task.is_active(task.local_progress(time)) {
                continue;
            }
            if task.constraint {
                stats.roots += 1;
                self.relink_constraint_node(structure, &task.part, &mut stats);
            } else if structure.part(&task.part).map(|p| p.kind()) == Some(PartKind::Sheet) {
                stats.free += 1;
                self.relink_free_node(structure, &task.part, &mut stats);
            }
        }

        trace!(time, ?stats, "relink pass");
        stats
    }

    /// Propagates a fixing wave outward from `root`.
    ///
    /// Each part is enqueued at most once. A part dequeued with no fixed
    /// neighbor is left in place but still becomes fixed; the root is always
    /// in that state, so it never moves.
    pub fn relink_constraint_node(
        &mut self,
        structure: &mut Structure,
        root: &str,
        stats: &mut RelinkStats,
    ) {
        self.fixed.clear();
        self.fixed
            .extend(structure.parts.keys().map(|id| (id.clone(), false)));

        if structure.part(root).is_none() {
            debug!(root, "constraint root not in structure");
            return;
        }

        let mut queue = VecDeque::from([root.to_string()]);
        let mut seen = HashSet::from([root.to_string()]);

        while let Some(id) = queue.pop_front() {
            let mut fixed_links = Vec::new();
            for link in structure.incident_links(&id) {
                let Some(other) = structure.link(link).and_then(|l| l.other(&id)) else {
                    continue;
                };
                if self.is_fixed(other) {
                    fixed_links.push(link);
                } else if seen.insert(other.clone()) {
                    queue.push_back(other.clone());
                }
            }

            if !fixed_links.is_empty() {
                self.resolve(structure, &id, &fixed_links, stats);
            }

            self.fixed.insert(id, true);
        }
    }

    /// Re-attaches a free sheet to all of its neighbors.
    pub fn relink_free_node(&self, structure: &mut Structure, id: &str, stats: &mut RelinkStats) {
        if structure.part(id).map(|p| p.kind()) != Some(PartKind::Sheet) {
            return;
        }
        let links = structure.incident_links(id);
        if matches!(links.len(), 1 | 2) {
            self.resolve(structure, id, &links, stats);
        }
    }

    fn resolve(
        &self,
        structure: &mut Structure,
        id: &str,
        links: &[LinkId],
        stats: &mut RelinkStats,
    ) {
        let Some(kind) = structure.part(id).map(|p| p.kind()) else {
            return;
        };

        let result = match (kind, links) {
            (_, &[link]) => rigid_translate_by_link(structure, id, link),
            (PartKind::Sheet, &[a, b]) => translate_to_match_midpoint(structure, id, a, b),
            (PartKind::Curve, &[a, b]) => self.deform_curve_by_two_links(structure, id, a, b),
            _ => {
                debug!(
                    part = id,
                    fixed = links.len(),
                    "no resolution rule for this many fixed neighbors"
                );
                return;
            }
        };

        match result {
            Ok(()) => stats.resolved += 1,
            Err(err) => {
                stats.failed += 1;
                warn!(part = id, %err, "relink left part in place");
            }
        }
    }

    /// Deforms along `a` then along `b`; `b` sees `a`'s output. Either
    /// failing restores the geometry from before `a`.
    fn deform_curve_by_two_links(
        &self,
        structure: &mut Structure,
        id: &str,
        a: LinkId,
        b: LinkId,
    ) -> Result<(), RelinkError> {
        let before = structure
            .part(id)
            .map(|p| p.geometry.clone())
            .ok_or_else(|| RelinkError::MissingPart(id.to_string()))?;

        let result = deform_curve_by_link(structure, id, a, self.settings)
            .and_then(|()| deform_curve_by_link(structure, id, b, self.settings));

        if result.is_err()
            && let Some(part) = structure.part_mut(id)
        {
            part.geometry = before;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::{Link, Part};
    use crate::task::{Hold, TaskKind};
    use glam::{Vec2, Vec3};

    fn settings() -> ArapSettings {
        ArapSettings {
            size: 1,
            iterations: 4,
        }
    }

    fn unit_sheet(id: &str, origin: Vec3) -> Part {
        Part::sheet(
            id,
            2,
            2,
            vec![
                origin,
                origin + Vec3::X,
                origin + Vec3::Y,
                origin + Vec3::X + Vec3::Y,
            ],
        )
    }

    fn active(part: &str, constraint: bool) -> Task {
        Task::new(part, TaskKind::Morph, 10.0, Box::new(Hold)).constraint(constraint)
    }

    /// a - b - c chain of sheets, each joined right edge to left edge,
    /// with `b` and `c` drifted away from where their joints should be.
    fn drifted_chain() -> Structure {
        let mut g = Structure::new();
        g.add_part(unit_sheet("a", Vec3::ZERO));
        g.add_part(unit_sheet("b", Vec3::new(3.0, 0.0, 0.0)));
        g.add_part(unit_sheet("c", Vec3::new(7.0, 1.0, 0.0)));
        g.add_link(Link::new("a", Vec2::new(1.0, 0.0), "b", Vec2::new(0.0, 0.0)));
        g.add_link(Link::new("b", Vec2::new(1.0, 0.0), "c", Vec2::new(0.0, 0.0)));
        g
    }

    fn joints_closed(g: &Structure) -> bool {
        (0..g.links.len()).all(|l| {
            let Link { a, .. } = &g.links[l];
            let own = g.link_position(l, a).unwrap();
            let other = g.link_position_other(l, a).unwrap();
            (own - other).length() < 1e-5
        })
    }

    #[test]
    fn constraint_wave_pulls_chain_onto_root() {
        let mut g = drifted_chain();
        let mut r = Relinker::new(settings());
        let mut stats = RelinkStats::default();

        r.relink_constraint_node(&mut g, "a", &mut stats);

        assert!(joints_closed(&g));
        assert_eq!(g.part("a").unwrap().control_points()[0], Vec3::ZERO);
        assert_eq!(stats.resolved, 2);
        assert!(r.fixed().values().all(|&f| f));
    }

    #[test]
    fn root_never_moves() {
        let mut g = drifted_chain();
        let mut r = Relinker::new(settings());
        let before = g.part("b").unwrap().clone();

        r.relink_constraint_node(&mut g, "b", &mut RelinkStats::default());

        assert_eq!(g.part("b").unwrap(), &before);
        assert!(joints_closed(&g));
    }

    #[test]
    fn unreachable_parts_stay_unfixed() {
        let mut g = drifted_chain();
        g.add_part(unit_sheet("island", Vec3::splat(9.0)));
        let mut r = Relinker::new(settings());

        r.relink_constraint_node(&mut g, "a", &mut RelinkStats::default());

        assert!(!r.is_fixed("island"));
        assert!(r.is_fixed("c"));
    }

    #[test]
    fn curve_between_two_fixed_sheets_is_deformed_once_per_link() {
        // l and r are fixed by the time the curve is reached from both sides.
        let mut g = Structure::new();
        g.add_part(unit_sheet("root", Vec3::ZERO));
        g.add_part(unit_sheet("l", Vec3::new(0.0, 2.0, 0.0)));
        g.add_part(unit_sheet("r", Vec3::new(4.0, 2.0, 0.0)));
        g.add_part(Part::curve(
            "c",
            (0..5).map(|i| Vec3::new(i as f32, 3.5, 0.0)).collect(),
        ));
        g.add_link(Link::new("root", Vec2::new(0.0, 1.0), "l", Vec2::ZERO));
        g.add_link(Link::new("root", Vec2::new(1.0, 1.0), "r", Vec2::ZERO));
        g.add_link(Link::new("c", Vec2::new(0.0, 0.0), "l", Vec2::new(0.0, 1.0)));
        g.add_link(Link::new("c", Vec2::new(1.0, 0.0), "r", Vec2::new(1.0, 1.0)));

        let mut r = Relinker::new(settings());
        let mut stats = RelinkStats::default();
        r.relink_constraint_node(&mut g, "root", &mut stats);

        // Each pass drives the far end onto that link's target: the pass
        // along `l` moves the last point, then the pass along `r` anchors
        // the last point and moves the first.
        let pts = g.part("c").unwrap().control_points();
        assert!((pts[4] - Vec3::new(0.0, 2.0, 0.0)).length() < 1e-4);
        assert!((pts[0] - Vec3::new(2.0, 2.0, 0.0)).length() < 1e-4);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn part_with_three_fixed_neighbors_is_left_alone() {
        let mut g = Structure::new();
        g.add_part(unit_sheet("root", Vec3::ZERO));
        for (i, id) in ["x", "y", "z"].into_iter().enumerate() {
            g.add_part(unit_sheet(id, Vec3::new(i as f32 * 2.0, 3.0, 0.0)));
            g.add_link(Link::new("root", Vec2::ZERO, id, Vec2::ZERO));
        }
        g.add_part(unit_sheet("hub", Vec3::new(10.0, 10.0, 0.0)));
        for id in ["x", "y", "z"] {
            g.add_link(Link::new("hub", Vec2::ZERO, id, Vec2::ONE));
        }
        let hub_before = g.part("hub").unwrap().clone();

        let mut r = Relinker::new(settings());
        r.relink_constraint_node(&mut g, "root", &mut RelinkStats::default());

        assert_eq!(g.part("hub").unwrap(), &hub_before);
        assert!(r.is_fixed("hub"));
    }

    #[test]
    fn failed_second_pass_restores_curve_and_counts_failure() {
        let mut g = Structure::new();
        g.add_part(unit_sheet("l", Vec3::new(0.0, 2.0, 0.0)));
        g.add_part(Part::sheet("bad", 2, 2, vec![Vec3::NAN; 4]));
        g.add_part(Part::curve(
            "c",
            (0..5).map(|i| Vec3::new(i as f32, 3.5, 0.0)).collect(),
        ));
        let a = g.add_link(Link::new("c", Vec2::new(0.0, 0.0), "l", Vec2::new(0.0, 1.0)));
        let b = g.add_link(Link::new("c", Vec2::new(1.0, 0.0), "bad", Vec2::ZERO));
        let before = g.part("c").unwrap().clone();

        let r = Relinker::new(settings());
        let mut stats = RelinkStats::default();
        r.resolve(&mut g, "c", &[a, b], &mut stats);

        assert_eq!(g.part("c").unwrap(), &before);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.resolved, 0);
    }

    #[test]
    fn one_point_curve_between_fixed_sheets_is_left_in_place() {
        let mut g = Structure::new();
        g.add_part(unit_sheet("root", Vec3::ZERO));
        g.add_part(unit_sheet("l", Vec3::new(0.0, 2.0, 0.0)));
        g.add_part(unit_sheet("r", Vec3::new(4.0, 2.0, 0.0)));
        g.add_part(Part::curve("c", vec![Vec3::new(9.0, 9.0, 9.0)]));
        g.add_link(Link::new("root", Vec2::new(0.0, 1.0), "l", Vec2::ZERO));
        g.add_link(Link::new("root", Vec2::new(1.0, 1.0), "r", Vec2::ZERO));
        g.add_link(Link::new("c", Vec2::ZERO, "l", Vec2::new(0.0, 1.0)));
        g.add_link(Link::new("c", Vec2::ZERO, "r", Vec2::new(1.0, 1.0)));

        let mut r = Relinker::new(settings());
        let mut stats = RelinkStats::default();
        r.relink_constraint_node(&mut g, "root", &mut stats);

        assert_eq!(
            g.part("c").unwrap().control_points(),
            &[Vec3::new(9.0, 9.0, 9.0)]
        );
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.resolved, 2);
        assert!(r.is_fixed("c"));
    }

    /// A part dequeued with no fixed neighbor is marked fixed without being
    /// moved. In breadth-first order only the root can be in that state,
    /// since every other part is discovered by a neighbor that is fixed
    /// before the part is dequeued.
    #[test]
    fn part_without_fixed_neighbor_is_fixed_unmoved() {
        let mut g = Structure::new();
        g.add_part(unit_sheet("root", Vec3::splat(2.0)));
        g.add_part(unit_sheet("a", Vec3::new(5.0, 5.0, 0.0)));
        g.add_link(Link::new("root", Vec2::ONE, "a", Vec2::ZERO));
        let root_before = g.part("root").unwrap().clone();

        let mut r = Relinker::new(settings());
        let mut stats = RelinkStats::default();
        r.relink_constraint_node(&mut g, "root", &mut stats);

        assert!(r.is_fixed("root"));
        assert_eq!(g.part("root").unwrap(), &root_before);
        assert!(r.is_fixed("a"));
        assert_eq!(stats.resolved, 1);
    }

    #[test]
    fn relink_is_idempotent() {
        let mut g = drifted_chain();
        let tasks = vec![active("a", true), active("c", false)];
        let mut r = Relinker::new(settings());

        r.relink(&mut g, &tasks, 5.0);
        let once = g.clone();
        r.relink(&mut g, &tasks, 5.0);

        for (id, part) in &once.parts {
            let again = g.part(id).unwrap();
            for (p, q) in part.control_points().iter().zip(again.control_points()) {
                assert!((*p - *q).length() < 1e-5, "{id} moved on second pass");
            }
        }
    }

    #[test]
    fn inactive_tasks_are_skipped() {
        let mut g = drifted_chain();
        let before = g.clone();
        let tasks = vec![active("a", true)];
        let mut r = Relinker::new(settings());

        // Local progress 0 and 1 are both outside the active window.
        assert_eq!(r.relink(&mut g, &tasks, 0.0), RelinkStats::default());
        assert_eq!(r.relink(&mut g, &tasks, 10.0), RelinkStats::default());
        assert_eq!(g, before);
    }

    #[test]
    fn free_sheet_follows_its_single_neighbor() {
        let mut g = drifted_chain();
        let tasks = vec![active("c", false)];
        let mut r = Relinker::new(settings());

        let stats = r.relink(&mut g, &tasks, 5.0);

        assert_eq!(stats.free, 1);
        assert_eq!(stats.roots, 0);
        assert_eq!(
            g.link_position(1, "c").unwrap(),
            g.link_position_other(1, "c").unwrap()
        );
        // b is not touched by a free relink of c.
        assert_eq!(
            g.part("b").unwrap().control_points()[0],
            Vec3::new(3.0, 0.0, 0.0)
        );
    }

    #[test]
    fn free_curve_is_not_relinked() {
        let mut g = Structure::new();
        g.add_part(unit_sheet("s", Vec3::ZERO));
        g.add_part(Part::curve("c", vec![Vec3::splat(4.0), Vec3::splat(5.0)]));
        g.add_link(Link::new("s", Vec2::ZERO, "c", Vec2::ZERO));
        let before = g.clone();

        let stats = Relinker::new(settings()).relink(&mut g, &[active("c", false)], 5.0);

        assert_eq!(stats, RelinkStats::default());
        assert_eq!(g, before);
    }

    #[test]
    fn second_root_overwrites_first_roots_fixed_marks() {
        // Two components: p1 - q1 and p2 - q2.
        let mut g = Structure::new();
        g.add_part(unit_sheet("p1", Vec3::ZERO));
        g.add_part(unit_sheet("q1", Vec3::new(4.0, 0.0, 0.0)));
        g.add_part(unit_sheet("p2", Vec3::new(0.0, 10.0, 0.0)));
        g.add_part(unit_sheet("q2", Vec3::new(4.0, 10.0, 0.0)));
        g.add_link(Link::new("p1", Vec2::new(1.0, 0.0), "q1", Vec2::ZERO));
        g.add_link(Link::new("p2", Vec2::new(1.0, 0.0), "q2", Vec2::ZERO));

        let tasks = vec![active("p1", true), active("p2", true)];
        let mut r = Relinker::new(settings());
        let stats = r.relink(&mut g, &tasks, 5.0);

        assert_eq!(stats.roots, 2);
        assert!(!r.is_fixed("p1"));
        assert!(!r.is_fixed("q1"));
        assert!(r.is_fixed("p2"));
        assert!(r.is_fixed("q2"));
        // q1 was moved by the first wave and stays moved.
        assert_eq!(
            g.part("q1").unwrap().control_points()[0],
            Vec3::new(1.0, 0.0, 0.0)
        );
    }
}
