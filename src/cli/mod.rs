//! CLI module for herdsman
//!
//! Thin shell over the orchestrator:
//! - start/stop/reload/restart/rebuild: batch lifecycle actions
//! - promote/demote/remaster: role transitions
//! - failover: move a herd to a new primary
//! - register/status: bootstrap and inspection
//!
//! Results are written to stdout as one JSON object; logs go to stderr.

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{run, run_cli};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};
