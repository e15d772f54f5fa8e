//! Virtual hostname updates
//!
//! A herd's vhost is a CNAME to the primary's host. Moving it is a
//! delete-then-add sent to every authoritative name server in turn.

use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::config::DnsConfig;
use crate::errors::{OrchestratorError, OrchestratorResult};
use crate::remote::RemoteChannel;

/// Re-points a virtual hostname.
pub trait DnsUpdater: Send + Sync {
    /// Make `vhost` a CNAME for `target_host` on every name server.
    ///
    /// Synchronous: returns once every server accepted the update.
    fn repoint(&self, vhost: &str, target_host: &str) -> OrchestratorResult<()>;

    /// Reject an update `repoint` could never deliver.
    ///
    /// Runs before a failover touches any host.
    fn check(&self, vhost: &str, target_host: &str) -> OrchestratorResult<()> {
        check_names(vhost, target_host)
    }
}

/// Names end up inside an nsupdate script; one token each.
fn check_names(vhost: &str, target_host: &str) -> OrchestratorResult<()> {
    for (field, value) in [("vhost", vhost), ("target host", target_host)] {
        if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(OrchestratorError::precondition(format!(
                "{} {:?} is not a valid DNS name",
                field, value
            )));
        }
    }
    Ok(())
}

/// Drives `nsupdate` on an administration host through the remote channel.
///
/// Requires an update host and at least one name server.
pub struct NsupdateDns {
    channel: Arc<dyn RemoteChannel>,
    config: DnsConfig,
}

impl NsupdateDns {
    pub fn new(channel: Arc<dyn RemoteChannel>, config: DnsConfig) -> Self {
        Self { channel, config }
    }

    /// The nsupdate script sent to one name server.
    pub fn script(&self, nameserver: &str, vhost: &str, target_host: &str) -> String {
        let mut script = format!("server {}\n", nameserver);
        if let Some(zone) = &self.config.zone {
            script.push_str(&format!("zone {}\n", zone));
        }
        script.push_str(&format!("update delete {} CNAME\n", vhost));
        script.push_str(&format!(
            "update add {} {} CNAME {}\n",
            vhost, self.config.ttl, target_host
        ));
        script.push_str("send\n");
        script
    }

    fn update_host(&self) -> OrchestratorResult<&str> {
        match self.config.update_host.as_deref() {
            Some(host) if !self.config.nameservers.is_empty() => Ok(host),
            _ => Err(OrchestratorError::configuration(
                "dns.update_host and dns.nameservers are required to move a vhost",
            )),
        }
    }
}

impl DnsUpdater for NsupdateDns {
    fn repoint(&self, vhost: &str, target_host: &str) -> OrchestratorResult<()> {
        self.check(vhost, target_host)?;
        let host = self.update_host()?;

        for nameserver in &self.config.nameservers {
            let command = format!(
                "nsupdate <<'HERDSMAN_EOF'\n{}HERDSMAN_EOF",
                self.script(nameserver, vhost, target_host)
            );
            self.channel.execute(host, &command).map_err(|e| {
                OrchestratorError::dns(format!("{} rejected update of {}: {}", nameserver, vhost, e))
            })?;
        }
        Ok(())
    }

    fn check(&self, vhost: &str, target_host: &str) -> OrchestratorResult<()> {
        self.update_host()?;
        check_names(vhost, target_host)
    }
}

/// One request seen by `RecordingDns`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DnsRequest {
    pub vhost: String,
    pub target: String,
}

/// Records requests instead of sending them.
#[derive(Debug, Default)]
pub struct RecordingDns {
    requests: Mutex<Vec<DnsRequest>>,
    failure: Mutex<Option<String>>,
}

impl RecordingDns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later request fail with `reason`.
    pub fn fail_with(&self, reason: &str) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(reason.to_string());
        }
    }

    pub fn requests(&self) -> Vec<DnsRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl DnsUpdater for RecordingDns {
    fn repoint(&self, vhost: &str, target_host: &str) -> OrchestratorResult<()> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(DnsRequest {
                vhost: vhost.to_string(),
                target: target_host.to_string(),
            });
        }
        match self.failure.lock().ok().and_then(|f| f.clone()) {
            Some(reason) => Err(OrchestratorError::dns(reason)),
            None => Ok(()),
        }
    }
}
