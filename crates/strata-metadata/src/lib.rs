//! Compilation-unit metadata and the immutable dependency graph built from it.

mod graph;
mod unit;
mod workspace;

pub use graph::MetadataGraph;
pub use unit::{UnitError, UnitMetadata, SYNTHETIC_UNIT_PREFIX};
pub use workspace::{compute_workspace_units, WorkspaceScope};
