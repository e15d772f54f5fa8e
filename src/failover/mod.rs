//! DR Failover
//!
//! Full site failover for a herd: stop the primary, let the chosen replica
//! catch up, promote it, move the virtual hostname and re-point the rest of
//! the herd. Also measures DR pair lag for status reporting.

mod catchup;
mod coordinator;
mod dns;

pub use catchup::{CatchUp, CatchUpWait};
pub use coordinator::{FailoverCoordinator, FailoverReport, FollowerOutcome};
pub use dns::{DnsRequest, DnsUpdater, NsupdateDns, RecordingDns};
