//! Persistent (structurally shared) ordered collections.
//!
//! Snapshots clone their file, unit, and marker maps on every workspace
//! change; these collections make that clone O(1) while keeping each clone
//! isolated from writes made through any other.

mod map;
mod set;

pub use map::{Iter, Map};
pub use set::Set;
