//! Virtual file system layer for Strata.
//!
//! The VFS is responsible for:
//! - Immutable [`FileHandle`]s identifying one observed version of a file.
//! - The persistent [`FileMap`] owned by each snapshot, with its directory index.
//! - Describing edit batches ([`Modification`], [`StateChange`]).
//! - Reading files from disk, with in-memory overlays (editor buffers) taking
//!   precedence over disk.

mod change;
mod file_map;
mod handle;
mod overlay;
mod source;

pub use change::{changed_on_disk, file_was_saved, FileAction, Modification, StateChange};
pub use file_map::FileMap;
pub use handle::{FileHandle, FileIdentity, FileKind};
pub use overlay::OverlaySource;
pub use source::{DiskSource, FileSource, ReadError};
