//! Instance lifecycle
//!
//! `CommandRunner` turns action names into remote commands for one instance;
//! `InstanceController` builds the start/stop/reload state machine on top.

mod controller;
mod runner;

pub use controller::InstanceController;
pub use runner::{CommandOutcome, CommandRunner};
