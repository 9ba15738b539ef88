//! Geometric adjustments that re-attach one part to its neighbors.
//!
//! Each primitive reads the joint positions of one or two links (the
//! position on the part being moved, and the position on the neighbor it
//! must follow) and updates only the moved part.

use glam::Vec3;
use tracing::trace;

use crate::arap::{ArapCurveDeformer, ArapError};
use crate::error::RelinkError;
use crate::structure::{PartKind, Structure};
use crate::types::LinkId;

/// Deformer settings for [`deform_curve_by_link`].
#[derive(Clone, Copy, Debug)]
pub struct ArapSettings {
    pub size: usize,
    pub iterations: usize,
}

/// Own-side and other-side joint positions of `link` as seen from `part`.
fn joint(structure: &Structure, part: &str, link: LinkId) -> Result<(Vec3, Vec3), RelinkError> {
    let detached = || RelinkError::DetachedLink {
        link,
        part: part.to_string(),
    };
    let own = structure.link_position(link, part).ok_or_else(detached)?;
    let other = structure.link_position_other(link, part).ok_or_else(detached)?;
    Ok((own, other))
}

/// Moves `part` rigidly so its joint on `link` lands on the neighbor's joint.
///
/// Every control point shifts by `new - old`, where `old` is the joint on
/// `part` and `new` the joint on the other side.
pub fn rigid_translate_by_link(
    structure: &mut Structure,
    part: &str,
    link: LinkId,
) -> Result<(), RelinkError> {
    let (old, new) = joint(structure, part, link)?;
    let node = structure
        .part_mut(part)
        .ok_or_else(|| RelinkError::MissingPart(part.to_string()))?;
    node.move_by(new - old);
    trace!(part, delta = ?(new - old), "rigid translate");
    Ok(())
}

/// Moves `part` rigidly so the midpoint of its two joints matches the
/// midpoint of the two neighbors' joints.
pub fn translate_to_match_midpoint(
    structure: &mut Structure,
    part: &str,
    link_a: LinkId,
    link_b: LinkId,
) -> Result<(), RelinkError> {
    let (old_a, new_a) = joint(structure, part, link_a)?;
    let (old_b, new_b) = joint(structure, part, link_b)?;

    let old_mid = (old_a + old_b) * 0.5;
    let new_mid = (new_a + new_b) * 0.5;

    let node = structure
        .part_mut(part)
        .ok_or_else(|| RelinkError::MissingPart(part.to_string()))?;
    node.move_by(new_mid - old_mid);
    trace!(part, delta = ?(new_mid - old_mid), "midpoint translate");
    Ok(())
}

/// Bends curve `part` so the end away from `link` reaches `link`'s target.
///
/// The control point nearest the joint parameter is anchored. The driven
/// point is the far end of the curve: the last point when the anchor lies
/// in the first half, the first point otherwise. The driven point moves to
/// the joint position on the neighbor and the rest follows an
/// as-rigid-as-possible solve. On failure the curve is untouched.
pub fn deform_curve_by_link(
    structure: &mut Structure,
    part: &str,
    link: LinkId,
    settings: ArapSettings,
) -> Result<(), RelinkError> {
    let (_, target) = joint(structure, part, link)?;
    let coord = structure
        .link(link)
        .and_then(|l| l.coord(part))
        .ok_or_else(|| RelinkError::DetachedLink {
            link,
            part: part.to_string(),
        })?;

    let node = structure
        .part_mut(part)
        .ok_or_else(|| RelinkError::MissingPart(part.to_string()))?;
    if node.kind() != PartKind::Curve {
        return Err(RelinkError::NotACurve(part.to_string()));
    }

    let count = node.control_points().len();
    let anchor = node
        .control_point_index_from_coord(coord.x)
        .ok_or_else(|| RelinkError::NotACurve(part.to_string()))?;
    let control = if (anchor as f32) < count as f32 * 0.5 {
        count - 1
    } else {
        0
    };

    let deform = |node_points: &[Vec3]| -> Result<Vec<Vec3>, ArapError> {
        let mut deformer = ArapCurveDeformer::new(node_points, settings.size);
        deformer.clear_all();
        deformer.set_control(control)?;
        deformer.set_anchor(anchor)?;
        deformer.make_ready()?;
        deformer.update_control(control, target)?;
        deformer.deform(settings.iterations)
    };

    let points = deform(node.control_points()).map_err(|source| RelinkError::Deform {
        part: part.to_string(),
        source,
    })?;
    node.set_control_points(points);
    trace!(part, anchor, control, "curve deformed");
    Ok(())
}
