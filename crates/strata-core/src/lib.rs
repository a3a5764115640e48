//! Core shared types for Strata.
//!
//! This crate is intentionally small: identifiers for compilation units and
//! documents, the content [`Fingerprint`], and the non-fatal bug reporter used
//! for invariant violations.

pub mod bug;
mod fingerprint;
mod ids;
mod uri;

pub use fingerprint::{Fingerprint, FingerprintBuilder};
pub use ids::{ImportPath, UnitId, UnitPath};
pub use uri::{in_dir, DocumentUri};

/// Version string recorded in persisted artifacts.
pub const STRATA_VERSION: &str = env!("CARGO_PKG_VERSION");
