//! Orchestrator
//!
//! The facade callers use: it owns the remote channel, inventory, DNS
//! updater, templates and counters, enforces one operation per instance and
//! one failover or demotion per herd, and runs batches.
//!
//! Components below it never lock and never cache records; the facade hands
//! them a freshly loaded record for each request.

mod batch;
mod bootstrap;
mod fleet;
mod locks;

pub use batch::{BatchOutcome, BatchReport, LifecycleAction};
pub use bootstrap::parse_server_version;
pub use fleet::{HerdStatus, Orchestrator};
pub use locks::{LockGuard, LockTable};
