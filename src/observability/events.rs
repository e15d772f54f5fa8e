//! Observable orchestrator events
//!
//! Events are explicit and typed; the string form is what appears in the
//! `event` field of a log line.

use std::fmt;

use super::logger::Severity;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Configuration loaded
    ConfigLoaded,
    /// Inventory opened
    InventoryLoaded,

    // Remote execution
    /// Command dispatched to a host
    RemoteCommand,
    /// File delivered to a host
    RemoteTransfer,
    /// Empty command skipped
    CommandSkipped,
    /// Remote failure recognized as benign
    BenignFailure,

    // Instance lifecycle
    /// Instance started
    InstanceStarted,
    /// Instance stopped
    InstanceStopped,
    /// Instance configuration reloaded
    InstanceReloaded,
    /// Lifecycle request needed no remote action
    InstanceUnchanged,

    // Topology
    /// Herd has no primary
    HerdWithoutPrimary,
    /// Herd has more than one primary
    HerdSplitPrimary,
    /// Instance registered into a herd
    InstanceRegistered,

    // Rebuild
    /// Incremental resync succeeded
    RewindComplete,
    /// Incremental resync failed; falling back
    RewindFailed,
    /// Primary entered backup mode
    BackupModeEntered,
    /// Primary left backup mode
    BackupModeLeft,
    /// Primary could not leave backup mode
    BackupModeStuck,

    // Role transitions
    /// Replica promoted
    Promoted,
    /// Demotion rejected by the single-primary guard
    DemotionRejected,
    /// Standby configuration written
    StandbyConfigWritten,
    /// Replica now follows a new primary
    Remastered,

    // Failover
    /// Replica caught up with the stopped primary
    CatchUpReached,
    /// Catch-up wait expired
    CatchUpTimeout,
    /// Virtual hostname re-pointed
    VhostRepointed,
    /// A follower could not be re-pointed
    FollowerRepointFailed,

    /// Metrics snapshot
    Metrics,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::InventoryLoaded => "INVENTORY_LOADED",

            Event::RemoteCommand => "REMOTE_COMMAND",
            Event::RemoteTransfer => "REMOTE_TRANSFER",
            Event::CommandSkipped => "COMMAND_SKIPPED",
            Event::BenignFailure => "BENIGN_FAILURE",

            Event::InstanceStarted => "INSTANCE_STARTED",
            Event::InstanceStopped => "INSTANCE_STOPPED",
            Event::InstanceReloaded => "INSTANCE_RELOADED",
            Event::InstanceUnchanged => "INSTANCE_UNCHANGED",

            Event::HerdWithoutPrimary => "HERD_WITHOUT_PRIMARY",
            Event::HerdSplitPrimary => "HERD_SPLIT_PRIMARY",
            Event::InstanceRegistered => "INSTANCE_REGISTERED",

            Event::RewindComplete => "REWIND_COMPLETE",
            Event::RewindFailed => "REWIND_FAILED",
            Event::BackupModeEntered => "BACKUP_MODE_ENTERED",
            Event::BackupModeLeft => "BACKUP_MODE_LEFT",
            Event::BackupModeStuck => "BACKUP_MODE_STUCK",

            Event::Promoted => "PROMOTED",
            Event::DemotionRejected => "DEMOTION_REJECTED",
            Event::StandbyConfigWritten => "STANDBY_CONFIG_WRITTEN",
            Event::Remastered => "REMASTERED",

            Event::CatchUpReached => "CATCHUP_REACHED",
            Event::CatchUpTimeout => "CATCHUP_TIMEOUT",
            Event::VhostRepointed => "VHOST_REPOINTED",
            Event::FollowerRepointFailed => "FOLLOWER_REPOINT_FAILED",

            Event::Metrics => "METRICS",
        }
    }

    /// Severity this event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::RemoteCommand | Event::RemoteTransfer => Severity::Trace,
            Event::CommandSkipped
            | Event::BenignFailure
            | Event::HerdWithoutPrimary
            | Event::HerdSplitPrimary
            | Event::RewindFailed
            | Event::DemotionRejected
            | Event::CatchUpTimeout => Severity::Warn,
            Event::BackupModeStuck | Event::FollowerRepointFailed => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(Event::RewindFailed.as_str(), "REWIND_FAILED");
        assert_eq!(Event::VhostRepointed.to_string(), "VHOST_REPOINTED");
    }

    #[test]
    fn test_event_severity() {
        assert_eq!(Event::RemoteCommand.severity(), Severity::Trace);
        assert_eq!(Event::RewindFailed.severity(), Severity::Warn);
        assert_eq!(Event::BackupModeStuck.severity(), Severity::Error);
        assert_eq!(Event::Promoted.severity(), Severity::Info);
    }
}
