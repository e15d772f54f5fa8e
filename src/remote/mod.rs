//! Remote Execution Channel
//!
//! Leaf dependency of every lifecycle operation: runs plain OS command lines
//! on a named host and delivers generated files. There is no structured RPC.
//!
//! - `SshChannel` talks to real hosts over OpenSSH with bounded timeouts
//! - `RecordingChannel` records calls without touching any host (dry runs)

mod channel;
mod errors;
mod ssh;

pub use channel::{RecordingChannel, RemoteCall, RemoteChannel};
pub use errors::{RemoteError, RemoteResult};
pub use ssh::{shell_quote, HostKeyPolicy, SshChannel, SshSettings};
