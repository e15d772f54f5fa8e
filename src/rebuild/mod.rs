//! Replica Rebuild
//!
//! Brings a replica back in line with its primary, preferring an incremental
//! rewind and falling back to a full copy bracketed by backup mode on the
//! primary.

mod engine;
mod plan;

pub use engine::{RebuildEngine, RebuildReport, SyncPath};
pub use plan::SyncPlan;
