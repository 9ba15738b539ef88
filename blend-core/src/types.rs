/// Identifier for a part in a [`crate::structure::Structure`].
///
/// Part ids are stable strings chosen by whoever builds the structure and
/// survive snapshots, so they can be used to look a part up in any recorded
/// frame of a run.
pub type PartId = String;

/// Normalized or absolute time on the blend timeline.
pub type Time = f64;

/// Index of a link in `Structure::links`.
///
/// Only meaningful until the next part removal, which may drop links.
pub type LinkId = usize;
