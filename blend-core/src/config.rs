use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::task::TaskKind;

/// Order in which task kinds are laid out on the timeline.
pub const DEFAULT_LAYOUT_ORDER: [TaskKind; 5] = [
    TaskKind::Shrink,
    TaskKind::Merge,
    TaskKind::Morph,
    TaskKind::Split,
    TaskKind::Grow,
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Normalized global time advanced per step, in `(0, 1]`.
    pub time_step: f64,
    /// Neighborhood half-width used by the curve deformer's rotation fit.
    pub arap_size: usize,
    /// Local/global rounds per curve deformation.
    pub arap_iterations: usize,
    /// Kind precedence for the layout pass.
    pub layout_order: Vec<TaskKind>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            time_step: 0.01,
            arap_size: 2,
            arap_iterations: 4,
            layout_order: DEFAULT_LAYOUT_ORDER.to_vec(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !(self.time_step > 0.0 && self.time_step <= 1.0) {
            return Err(Error::InvalidTimeStep(self.time_step));
        }
        Ok(())
    }
}
