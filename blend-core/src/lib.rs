//! Task scheduling and constraint relinking for blending one part-based
//! structure into another.
//!
//! Main components:
//! - [`structure`]: parts, attachment links and the active graph.
//! - [`task`]: timed per-part operations and the action trait they run.
//! - [`actions`]: stock task actions (translate, scale).
//! - [`layout`]: temporal layout of tasks by kind precedence.
//! - [`arap`]: as-rigid-as-possible curve deformer.
//! - [`primitives`]: geometric re-attachment of one part to its links.
//! - [`relink`]: breadth-first positional consistency propagation.
//! - [`scheduler`]: lifecycle and the stepped execution loop.
//! - [`scenario`]: generated structures for demos and tests.
//! - [`config`]: run configuration.
//! - [`error`]: error types.
//! - [`types`]: shared type aliases and IDs.

pub mod actions;
pub mod arap;
pub mod config;
pub mod error;
pub mod layout;
pub mod primitives;
pub mod relink;
pub mod scenario;
pub mod scheduler;
pub mod structure;
pub mod task;
pub mod types;

pub use error::{Error, Result};
