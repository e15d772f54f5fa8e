//! Standby configuration
//!
//! A replica learns where to stream from through a small key/value file in
//! its data directory. The file always names the herd's virtual hostname, so
//! it stays valid across failovers once DNS has moved.

use crate::errors::{OrchestratorError, OrchestratorResult};
use crate::inventory::{Instance, Placement};
use crate::lifecycle::CommandRunner;
use crate::observability::{log_event, Event};

/// Where and as whom replicas connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandbySettings {
    pub replication_user: String,
    /// File name inside the data directory
    pub file_name: String,
}

impl Default for StandbySettings {
    fn default() -> Self {
        Self {
            replication_user: "replication".to_string(),
            file_name: "recovery.conf".to_string(),
        }
    }
}

/// Rendered standby configuration for one replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandbyConfig {
    pub user: String,
    pub upstream: String,
    pub port: u16,
    pub application_name: String,
}

impl StandbyConfig {
    /// Configuration for a replica at `placement`.
    pub fn new(settings: &StandbySettings, placement: &Placement) -> Self {
        Self {
            user: settings.replication_user.clone(),
            upstream: placement.herd.vhost.clone(),
            port: placement.herd.port,
            application_name: format!("{}_{}", placement.host, placement.herd.instance_name),
        }
    }

    pub fn conninfo(&self) -> String {
        format!(
            "user={} host={} port={} application_name={}",
            self.user, self.upstream, self.port, self.application_name
        )
    }

    pub fn render(&self) -> String {
        format!(
            "standby_mode = 'on'\n\
             recovery_target_timeline = 'latest'\n\
             primary_conninfo = '{}'\n",
            self.conninfo()
        )
    }
}

/// Write the standby file into the instance's effective data directory.
///
/// Returns the remote path written.
pub fn write_standby_config(
    runner: &CommandRunner<'_>,
    settings: &StandbySettings,
    instance: &Instance,
) -> OrchestratorResult<String> {
    let placement = runner.placement(instance)?;
    let config = StandbyConfig::new(settings, &placement);
    let path = format!(
        "{}/{}",
        instance.pgdata(&placement.herd).trim_end_matches('/'),
        settings.file_name
    );

    runner
        .transfer(&placement.host, &config.render(), &path)
        .map_err(|e| e.for_instance(instance.id).during("write standby configuration"))?;

    log_event(
        Event::StandbyConfigWritten,
        &[
            ("instance", &instance.id.to_string()),
            ("path", &path),
            ("upstream", &config.upstream),
        ],
    );
    Ok(path)
}

/// Reject a standby file name that would escape the data directory.
pub fn validate_file_name(name: &str) -> OrchestratorResult<()> {
    if name.is_empty() || name.contains('/') {
        return Err(OrchestratorError::configuration(format!(
            "invalid standby file name '{}'",
            name
        )));
    }
    Ok(())
}
