//! Orchestrator configuration
//!
//! Loaded from a JSON file. Every field except `inventory` has a default, so
//! the smallest valid file is `{"inventory": "./inventory.json"}`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{OrchestratorError, OrchestratorResult};
use crate::observability::Severity;
use crate::promotion::{validate_file_name, StandbySettings};
use crate::remote::{HostKeyPolicy, SshSettings};
use crate::templates::CommandTemplates;

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path of the JSON inventory document (required)
    pub inventory: PathBuf,

    /// Minimum log severity (default "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub ssh: SshConfig,

    /// Template overrides keyed by action name
    #[serde(default)]
    pub templates: BTreeMap<String, String>,

    /// Role replicas authenticate as when streaming
    #[serde(default = "default_replication_user")]
    pub replication_user: String,

    /// Standby configuration file name inside the data directory
    #[serde(default = "default_standby_file")]
    pub standby_file: String,

    #[serde(default)]
    pub rebuild: RebuildConfig,

    #[serde(default)]
    pub failover: FailoverConfig,

    #[serde(default)]
    pub dns: DnsConfig,

    /// Upper bound on instances handled concurrently by one batch
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

/// Remote channel settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_ssh_user")]
    pub user: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// "strict" (default) or "add"
    #[serde(default)]
    pub host_keys: HostKeyPolicy,
}

/// Rebuild timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildConfig {
    /// Pause after starting a rebuilt replica
    #[serde(default = "default_rebuild_settle")]
    pub settle_ms: u64,
}

/// Failover timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverConfig {
    /// Fixed wait used when replication positions cannot be measured
    #[serde(default = "default_failover_settle")]
    pub settle_ms: u64,
    /// Upper bound on the catch-up poll
    #[serde(default = "default_catchup_timeout")]
    pub catchup_timeout_ms: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

/// Dynamic DNS settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Host that runs `nsupdate`; DNS updates are disabled when unset
    #[serde(default)]
    pub update_host: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    /// Authoritative name servers; every one receives the update
    #[serde(default)]
    pub nameservers: Vec<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_replication_user() -> String {
    "replication".to_string()
}
fn default_standby_file() -> String {
    "recovery.conf".to_string()
}
fn default_max_parallel() -> usize {
    8
}
fn default_ssh_user() -> String {
    "postgres".to_string()
}
fn default_ssh_port() -> u16 {
    22
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_command_timeout() -> u64 {
    3600
}
fn default_rebuild_settle() -> u64 {
    2000
}
fn default_failover_settle() -> u64 {
    5000
}
fn default_catchup_timeout() -> u64 {
    30000
}
fn default_poll_interval() -> u64 {
    500
}
fn default_ttl() -> u32 {
    300
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: default_ssh_user(),
            port: default_ssh_port(),
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
            host_keys: HostKeyPolicy::default(),
        }
    }
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_rebuild_settle(),
        }
    }
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_failover_settle(),
            catchup_timeout_ms: default_catchup_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            update_host: None,
            zone: None,
            ttl: default_ttl(),
            nameservers: Vec::new(),
        }
    }
}

impl RebuildConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl FailoverConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn catchup_timeout(&self) -> Duration {
        Duration::from_millis(self.catchup_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Configuration with every default and the given inventory path.
    pub fn with_inventory(inventory: impl Into<PathBuf>) -> Self {
        Self {
            inventory: inventory.into(),
            log_level: default_log_level(),
            ssh: SshConfig::default(),
            templates: BTreeMap::new(),
            replication_user: default_replication_user(),
            standby_file: default_standby_file(),
            rebuild: RebuildConfig::default(),
            failover: FailoverConfig::default(),
            dns: DnsConfig::default(),
            max_parallel: default_max_parallel(),
        }
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> OrchestratorResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            OrchestratorError::configuration(format!("Failed to read config: {}", e))
        })?;

        let mut config: Config = serde_json::from_str(&content).map_err(|e| {
            OrchestratorError::configuration(format!("Invalid config JSON: {}", e))
        })?;

        // A relative inventory path is relative to the config file.
        if config.inventory.is_relative() {
            if let Some(dir) = path.parent() {
                config.inventory = dir.join(&config.inventory);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> OrchestratorResult<()> {
        self.severity()?;

        if self.max_parallel == 0 {
            return Err(OrchestratorError::configuration("max_parallel must be > 0"));
        }

        if self.ssh.connect_timeout_secs == 0 || self.ssh.command_timeout_secs == 0 {
            return Err(OrchestratorError::configuration(
                "ssh timeouts must be > 0; an unreachable host must not block forever",
            ));
        }

        if self.failover.poll_interval_ms == 0 {
            return Err(OrchestratorError::configuration(
                "failover.poll_interval_ms must be > 0",
            ));
        }

        validate_file_name(&self.standby_file)?;

        if self.dns.update_host.is_some() && self.dns.nameservers.is_empty() {
            return Err(OrchestratorError::configuration(
                "dns.nameservers is required when dns.update_host is set",
            ));
        }

        Ok(())
    }

    /// Parsed minimum log severity
    pub fn severity(&self) -> OrchestratorResult<Severity> {
        self.log_level
            .parse()
            .map_err(|e: String| OrchestratorError::configuration(e))
    }

    /// Built-in templates with this file's overrides applied
    pub fn command_templates(&self) -> CommandTemplates {
        CommandTemplates::with_overrides(&self.templates)
    }

    /// Replication user and standby file name
    pub fn standby_settings(&self) -> StandbySettings {
        StandbySettings {
            replication_user: self.replication_user.clone(),
            file_name: self.standby_file.clone(),
        }
    }

    /// Settings for the SSH channel
    pub fn ssh_settings(&self) -> SshSettings {
        SshSettings {
            user: self.ssh.user.clone(),
            port: self.ssh.port,
            connect_timeout: Duration::from_secs(self.ssh.connect_timeout_secs),
            command_timeout: Duration::from_secs(self.ssh.command_timeout_secs),
            host_keys: self.ssh.host_keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("herdsman.json");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let (dir, path) = write_config(r#"{"inventory": "inventory.json"}"#);
        let config = Config::load(&path).unwrap();

        assert_eq!(config.inventory, dir.path().join("inventory.json"));
        assert_eq!(config.replication_user, "replication");
        assert_eq!(config.standby_file, "recovery.conf");
        assert_eq!(config.ssh.user, "postgres");
        assert_eq!(config.ssh_settings().host_keys, HostKeyPolicy::Strict);
        assert_eq!(config.failover.settle(), Duration::from_secs(5));
        assert_eq!(config.severity().unwrap(), Severity::Info);
    }

    #[test]
    fn test_template_overrides_applied() {
        let (_dir, path) = write_config(
            r#"{"inventory": "/tmp/inv.json", "templates": {"pg_ctl": "sudo pg_ctlcluster {major} {instance}"}}"#,
        );
        let config = Config::load(&path).unwrap();
        let templates = config.command_templates();
        assert_eq!(
            templates.get("pg_ctl"),
            Some("sudo pg_ctlcluster {major} {instance}")
        );
        assert_eq!(templates.get("start"), Some("{pg_ctl} start"));
    }

    #[test]
    fn test_host_key_policy_opt_in() {
        let (_dir, path) = write_config(
            r#"{"inventory": "/tmp/inv.json", "ssh": {"host_keys": "add"}}"#,
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.ssh_settings().host_keys, HostKeyPolicy::Add);

        let (_dir, path) = write_config(
            r#"{"inventory": "/tmp/inv.json", "ssh": {"host_keys": "accept"}}"#,
        );
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_missing_inventory_rejected() {
        let (_dir, path) = write_config(r#"{"log_level": "info"}"#);
        let err = Config::load(&path).unwrap_err();
        assert!(err.message.contains("Invalid config JSON"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::with_inventory("/tmp/inv.json");
        config.log_level = "loud".into();
        assert!(config.validate().is_err());

        let mut config = Config::with_inventory("/tmp/inv.json");
        config.standby_file = "../recovery.conf".into();
        assert!(config.validate().is_err());

        let mut config = Config::with_inventory("/tmp/inv.json");
        config.ssh.command_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::with_inventory("/tmp/inv.json");
        config.dns.update_host = Some("ns-admin".into());
        assert!(config.validate().is_err());
    }
}
