//! Ready-made structures and task sets for demos and tests.

use glam::{Vec2, Vec3};
use rand::Rng;

use crate::actions::{Scale, Translate};
use crate::structure::{Link, Part, Structure};
use crate::task::{Task, TaskKind};

/// A structure together with the tasks that blend it.
#[derive(Debug)]
pub struct Scenario {
    pub structure: Structure,
    pub tasks: Vec<Task>,
}

fn sheet_at(id: String, origin: Vec3) -> Part {
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

fn curve_at(id: String, origin: Vec3, points: usize) -> Part {
    let step = 1.0 / (points.max(2) - 1) as f32;
    Part::curve(
        id,
        (0..points)
            .map(|i| origin + Vec3::new(i as f32 * step, 0.5, 0.0))
            .collect(),
    )
}

fn random_offset(rng: &mut impl Rng, half_range: f32) -> Vec3 {
    Vec3::new(
        rng.random_range(-half_range..=half_range),
        rng.random_range(-half_range..=half_range),
        rng.random_range(-half_range..=half_range),
    )
}

impl Scenario {
    /// Builds a chain of `count` parts alternating sheet, curve, sheet, ...
    /// joined end to end, plus one piece split off the second part and one
    /// piece merging into the last part.
    ///
    /// The first part carries a constraint-driven morph; the others get a
    /// mix of morphs, grows and partial shrinks with random offsets and
    /// durations.
    ///
    /// ### Parameters
    /// - `count` - Number of chain parts; at least 2 are always built.
    /// - `half_range` - Bound on each coordinate of a random morph offset.
    /// - `rng` - Source of offsets and durations.
    pub fn random_chain(count: usize, half_range: f32, rng: &mut impl Rng) -> Self {
        let count = count.max(2);
        let mut structure = Structure::new();
        let mut tasks = Vec::with_capacity(count + 2);

        for i in 0..count {
            let id = format!("p{i}");
            let origin = Vec3::new(i as f32, 0.0, 0.0);
            let part = if i % 2 == 0 {
                sheet_at(id.clone(), origin)
            } else {
                curve_at(id.clone(), origin, 4)
            };
            structure.add_part(part);

            if i > 0 {
                structure.add_link(Link::new(
                    format!("p{}", i - 1),
                    Vec2::new(1.0, 0.5),
                    id.clone(),
                    Vec2::new(0.0, 0.5),
                ));
            }

            let duration = rng.random_range(5.0..20.0);
            let task = match i % 4 {
                0 | 1 => Task::new(
                    id,
                    TaskKind::Morph,
                    duration,
                    Box::new(Translate::new(random_offset(rng, half_range))),
                ),
                2 => Task::new(id, TaskKind::Grow, duration, Box::new(Scale::grow())),
                _ => Task::new(id, TaskKind::Shrink, duration, Box::new(Scale::new(1.0, 0.5))),
            };
            tasks.push(task.constraint(i == 0));
        }

        let last = format!("p{}", count - 1);

        structure.add_part(sheet_at("split-piece".to_string(), Vec3::new(1.0, 1.0, 0.0)));
        structure.add_link(Link::new(
            "p1",
            Vec2::new(0.5, 0.0),
            "split-piece",
            Vec2::ZERO,
        ));
        tasks.push(
            Task::new(
                "split-piece",
                TaskKind::Split,
                rng.random_range(5.0..20.0),
                Box::new(Scale::grow()),
            )
            .split_from("p1"),
        );

        structure.add_part(sheet_at(
            "merge-piece".to_string(),
            Vec3::new(count as f32, 1.0, 0.0),
        ));
        structure.add_link(Link::new(
            last.clone(),
            Vec2::new(1.0, 1.0),
            "merge-piece",
            Vec2::ZERO,
        ));
        tasks.push(
            Task::new(
                "merge-piece",
                TaskKind::Merge,
                rng.random_range(5.0..20.0),
                Box::new(Scale::shrink()),
            )
            .merge_to(last),
        );

        Self { structure, tasks }
    }
}
