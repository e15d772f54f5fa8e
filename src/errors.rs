//! Orchestrator Error Types
//!
//! Every lifecycle operation returns an `OrchestratorError` on failure.
//! Multi-step sequences stop at the first error and leave the herd in the
//! exact intermediate state reached; nothing is rolled back automatically.
//!
//! Benign remote failures (the target was already in the requested state)
//! are recognized by `classify`, which consults a single phrase table.

use std::fmt;

use crate::inventory::{InstanceId, InventoryError};
use crate::remote::RemoteError;

/// Orchestrator error type
#[derive(Debug, Clone)]
pub struct OrchestratorError {
    /// Error kind
    pub kind: OrchestratorErrorKind,
    /// Error message
    pub message: String,
    /// Instance the failing step was acting on, if any
    pub instance: Option<InstanceId>,
    /// Diagnostics written by the remote side, if the failure came from a host
    pub remote_diagnostics: Option<String>,
}

/// Orchestrator error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorErrorKind {
    /// Host unreachable, authentication failure or timeout
    Connection,

    /// Remote command exited non-zero or wrote diagnostics
    Command,

    /// An invariant guard rejected the request before any remote action
    SafetyViolation,

    /// Replica resynchronization failed
    Sync,

    /// Operation preconditions not met (missing master, wrong herd, ...)
    Precondition,

    /// Another operation already holds the instance or herd
    Busy,

    /// Inventory lookup or save failed
    Inventory,

    /// Virtual hostname update failed
    Dns,

    /// Invalid configuration
    Configuration,
}

impl OrchestratorErrorKind {
    /// Stable code used in CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection => "HERD_CONNECTION_ERROR",
            Self::Command => "HERD_COMMAND_ERROR",
            Self::SafetyViolation => "HERD_SAFETY_VIOLATION",
            Self::Sync => "HERD_SYNC_ERROR",
            Self::Precondition => "HERD_PRECONDITION_FAILED",
            Self::Busy => "HERD_BUSY",
            Self::Inventory => "HERD_INVENTORY_ERROR",
            Self::Dns => "HERD_DNS_ERROR",
            Self::Configuration => "HERD_CONFIG_ERROR",
        }
    }
}

impl OrchestratorError {
    /// Create a new orchestrator error.
    pub fn new(kind: OrchestratorErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            instance: None,
            remote_diagnostics: None,
        }
    }

    /// Attach the instance the failing step was acting on.
    pub fn for_instance(mut self, id: InstanceId) -> Self {
        self.instance.get_or_insert(id);
        self
    }

    /// Prefix the message with the step that failed.
    pub fn during(mut self, step: &str) -> Self {
        self.message = format!("{}: {}", step, self.message);
        self
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(OrchestratorErrorKind::Connection, message)
    }

    /// Create a command error.
    pub fn command(message: impl Into<String>) -> Self {
        Self::new(OrchestratorErrorKind::Command, message)
    }

    /// Create a safety violation error.
    pub fn safety_violation(message: impl Into<String>) -> Self {
        Self::new(OrchestratorErrorKind::SafetyViolation, message)
    }

    /// Create a sync error.
    pub fn sync(message: impl Into<String>) -> Self {
        Self::new(OrchestratorErrorKind::Sync, message)
    }

    /// Create a precondition error.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::new(OrchestratorErrorKind::Precondition, message)
    }

    /// Create a busy error.
    pub fn busy(message: impl Into<String>) -> Self {
        Self::new(OrchestratorErrorKind::Busy, message)
    }

    /// Create a DNS error.
    pub fn dns(message: impl Into<String>) -> Self {
        Self::new(OrchestratorErrorKind::Dns, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(OrchestratorErrorKind::Configuration, message)
    }

    /// Stable error code.
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Text inspected for benign phrases: the remote diagnostics when the
    /// failure came from a host, the message otherwise.
    pub fn diagnostics(&self) -> &str {
        self.remote_diagnostics.as_deref().unwrap_or(&self.message)
    }
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.instance {
            Some(id) => write!(f, "{} (instance {}): {}", self.code(), id, self.message),
            None => write!(f, "{}: {}", self.code(), self.message),
        }
    }
}

impl std::error::Error for OrchestratorError {}

impl From<RemoteError> for OrchestratorError {
    fn from(e: RemoteError) -> Self {
        let mut error = match e {
            RemoteError::Connection { .. } | RemoteError::Timeout { .. } => {
                Self::connection(e.to_string())
            }
            RemoteError::Command { .. } | RemoteError::Transfer { .. } => {
                Self::command(e.to_string())
            }
        };
        error.remote_diagnostics = Some(e.diagnostics().to_string());
        error
    }
}

impl From<InventoryError> for OrchestratorError {
    fn from(e: InventoryError) -> Self {
        Self::new(OrchestratorErrorKind::Inventory, e.to_string())
    }
}

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

// =============================================================================
// Failure classification
// =============================================================================

/// Why a failed remote command still counts as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenignReason {
    /// Start requested but the server is already up
    AlreadyRunning,
    /// Stop requested but the server is already down
    NotRunning,
    /// Pid file or cluster directory already gone
    DoesNotExist,
    /// Backup mode was already entered
    BackupInProgress,
    /// Backup mode was already left
    NoBackupInProgress,
}

/// Known phrases that mark a remote failure as benign.
///
/// Matched case-insensitively against the command diagnostics, in order.
/// More specific phrases come first ("not in progress" before "in progress").
pub const BENIGN_PHRASES: &[(&str, BenignReason)] = &[
    ("already running", BenignReason::AlreadyRunning),
    ("not running", BenignReason::NotRunning),
    ("not exist", BenignReason::DoesNotExist),
    ("not in progress", BenignReason::NoBackupInProgress),
    ("already in progress", BenignReason::BackupInProgress),
];

/// How a caller should treat a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Target already in the requested state; treat as success
    Benign(BenignReason),
    /// Propagate to the caller
    Fatal,
    /// Rejected by an invariant guard; no side effects happened
    SafetyViolation,
    /// Host unreachable; nothing was mutated
    ConnectionError,
}

/// Match command diagnostics against the benign phrase table.
pub fn benign_reason(diagnostics: &str) -> Option<BenignReason> {
    let lowered = diagnostics.to_lowercase();
    BENIGN_PHRASES
        .iter()
        .find(|(phrase, _)| lowered.contains(phrase))
        .map(|(_, reason)| *reason)
}

/// Classify an error into an explicit disposition.
pub fn classify(error: &OrchestratorError) -> Disposition {
    match error.kind {
        OrchestratorErrorKind::Connection => Disposition::ConnectionError,
        OrchestratorErrorKind::SafetyViolation => Disposition::SafetyViolation,
        OrchestratorErrorKind::Command => match benign_reason(error.diagnostics()) {
            Some(reason) => Disposition::Benign(reason),
            None => Disposition::Fatal,
        },
        _ => Disposition::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_benign_phrases() {
        let err = OrchestratorError::command("Cluster is already running.");
        assert_eq!(
            classify(&err),
            Disposition::Benign(BenignReason::AlreadyRunning)
        );

        let err = OrchestratorError::command("pg_ctl: PID file does not exist");
        assert_eq!(classify(&err), Disposition::Benign(BenignReason::DoesNotExist));
    }

    #[test]
    fn test_benign_match_is_case_insensitive() {
        assert_eq!(
            benign_reason("Cluster is NOT RUNNING."),
            Some(BenignReason::NotRunning)
        );
    }

    #[test]
    fn test_backup_phrases_prefer_specific_match() {
        assert_eq!(
            benign_reason("ERROR:  a backup is already in progress"),
            Some(BenignReason::BackupInProgress)
        );
        assert_eq!(
            benign_reason("ERROR:  exclusive backup not in progress"),
            Some(BenignReason::NoBackupInProgress)
        );
    }

    #[test]
    fn test_fatal_command() {
        let err = OrchestratorError::command("rsync: connection unexpectedly closed");
        assert_eq!(classify(&err), Disposition::Fatal);
    }

    #[test]
    fn test_non_command_kinds_never_benign() {
        // Only command diagnostics are inspected.
        let err = OrchestratorError::precondition("already running");
        assert_eq!(classify(&err), Disposition::Fatal);

        let err = OrchestratorError::connection("host not running");
        assert_eq!(classify(&err), Disposition::ConnectionError);

        let err = OrchestratorError::safety_violation("last primary");
        assert_eq!(classify(&err), Disposition::SafetyViolation);
    }

    #[test]
    fn test_remote_diagnostics_drive_classification() {
        // The command text mentions "not running"; stderr does not.
        let err = OrchestratorError::from(RemoteError::Command {
            host: "db1".into(),
            command: "echo not running; false".into(),
            status: Some(1),
            stderr: "permission denied".into(),
        });
        assert_eq!(err.diagnostics(), "permission denied");
        assert_eq!(classify(&err), Disposition::Fatal);

        let err = OrchestratorError::from(RemoteError::Connection {
            host: "db1".into(),
            reason: "control socket does not exist".into(),
        });
        assert_eq!(classify(&err), Disposition::ConnectionError);
    }

    #[test]
    fn test_display_names_instance() {
        let err = OrchestratorError::sync("copy failed").for_instance(InstanceId(7));
        let display = err.to_string();
        assert!(display.contains("HERD_SYNC_ERROR"));
        assert!(display.contains("instance 7"));
    }

    #[test]
    fn test_during_prefixes_step() {
        let err = OrchestratorError::command("boom").during("stop primary");
        assert_eq!(err.message, "stop primary: boom");
    }
}
