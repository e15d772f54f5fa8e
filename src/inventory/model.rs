//! Inventory records
//!
//! Herds, servers and instances as the orchestrator sees them. The records
//! are owned by the inventory; the orchestrator works on fresh copies and
//! writes changes back through `Inventory::save_instance`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lsn::Lsn;

macro_rules! record_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(HerdId);
record_id!(ServerId);
record_id!(InstanceId);

/// A replica set: one primary plus its streaming replicas.
///
/// Port, data root and base instance name are shared by every member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Herd {
    pub id: HerdId,
    pub name: String,
    /// Cluster name used by the cluster-control tools on every host
    pub instance_name: String,
    pub port: u16,
    /// Canonical data directory on every host
    pub pgdata: String,
    /// DNS name that always resolves to the current primary
    pub vhost: String,
    #[serde(default)]
    pub environment: Option<String>,
}

/// A host reachable through the remote channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub id: ServerId,
    pub hostname: String,
    #[serde(default)]
    pub environment: Option<String>,
}

/// One member of a herd placed on one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub herd_id: HerdId,
    pub server_id: ServerId,
    /// Overrides the herd data directory on this host
    #[serde(default)]
    pub local_pgdata: Option<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub is_online: bool,
    /// Last observed replication position
    #[serde(default)]
    pub xlog_pos: Option<Lsn>,
    /// Upstream primary; `None` means this instance is a primary
    #[serde(default)]
    pub master: Option<InstanceId>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
}

impl Instance {
    /// Create an offline primary record.
    pub fn new(id: InstanceId, herd_id: HerdId, server_id: ServerId) -> Self {
        Self {
            id,
            herd_id,
            server_id,
            local_pgdata: None,
            version: String::new(),
            is_online: false,
            xlog_pos: None,
            master: None,
            modified_at: None,
        }
    }

    pub fn is_primary(&self) -> bool {
        self.master.is_none()
    }

    /// Effective data directory: local override or the herd default.
    pub fn pgdata<'a>(&'a self, herd: &'a Herd) -> &'a str {
        self.local_pgdata.as_deref().unwrap_or(&herd.pgdata)
    }

    /// Record a newly observed replication position.
    ///
    /// Positions never move backwards; a stale observation is ignored and
    /// `false` is returned.
    pub fn advance_position(&mut self, observed: Lsn) -> bool {
        match self.xlog_pos {
            Some(current) if observed < current => false,
            _ => {
                self.xlog_pos = Some(observed);
                true
            }
        }
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance {} (herd {})", self.id, self.herd_id)
    }
}

/// Everything needed to address one instance on its host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub herd: Herd,
    pub host: String,
}

/// Observed relationship between a herd primary and its DR secondary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrPair {
    pub herd: HerdId,
    pub primary: InstanceId,
    pub secondary: InstanceId,
    pub secondary_host: String,
    /// Bytes the secondary trails the primary; `None` when not measurable
    pub lag_bytes: Option<u64>,
    pub vhost: String,
}
