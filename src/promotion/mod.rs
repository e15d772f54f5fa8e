//! Role transitions
//!
//! Promotion, demotion and remastering of herd members, plus the standby
//! configuration file every replica carries.
//!
//! Invariant: a herd is never left without a primary by a demotion. The
//! guard runs before any remote command is issued.

mod standby;
mod transition;

pub use standby::{validate_file_name, write_standby_config, StandbyConfig, StandbySettings};
pub use transition::RoleTransition;
