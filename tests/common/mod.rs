//! Shared fixture: one herd on recording collaborators.

#![allow(dead_code)]

use std::sync::Arc;

use herdsman::config::Config;
use herdsman::failover::RecordingDns;
use herdsman::inventory::{
    Herd, HerdId, Instance, InstanceId, Inventory, MemoryInventory, Server, ServerId,
};
use herdsman::orchestrator::Orchestrator;
use herdsman::remote::RecordingChannel;

pub const VERSION: &str = "12.4";

/// Configuration with every wait shortened to keep tests fast.
pub fn quick_config() -> Config {
    let mut config = Config::with_inventory("inventory.json");
    config.rebuild.settle_ms = 0;
    config.failover.settle_ms = 0;
    config.failover.catchup_timeout_ms = 50;
    config.failover.poll_interval_ms = 1;
    config
}

pub struct Herdsman {
    pub orchestrator: Orchestrator,
    pub channel: Arc<RecordingChannel>,
    pub dns: Arc<RecordingDns>,
    pub inventory: Arc<MemoryInventory>,
}

impl Herdsman {
    /// Herd 1 "orders": instance 1 is the primary on db1, instances
    /// 2..=size are online replicas of it on db2..dbN.
    pub fn herd(size: u64) -> Self {
        Self::herd_with(size, quick_config())
    }

    pub fn herd_with(size: u64, config: Config) -> Self {
        let inventory = Arc::new(MemoryInventory::new());
        inventory.put_herd(Herd {
            id: HerdId(1),
            name: "orders".into(),
            instance_name: "orders".into(),
            port: 5432,
            pgdata: "/db/orders".into(),
            vhost: "orders-db".into(),
            environment: None,
        });
        for id in 1..=size {
            inventory.put_server(Server {
                id: ServerId(id),
                hostname: format!("db{}", id),
                environment: None,
            });
            let mut instance = Instance::new(InstanceId(id), HerdId(1), ServerId(id));
            instance.version = VERSION.into();
            instance.is_online = true;
            if id != 1 {
                instance.master = Some(InstanceId(1));
            }
            inventory.put_instance(instance);
        }

        let channel = Arc::new(RecordingChannel::new());
        let dns = Arc::new(RecordingDns::new());
        let orchestrator = Orchestrator::new(
            config,
            channel.clone(),
            inventory.clone(),
            dns.clone(),
        );

        Self {
            orchestrator,
            channel,
            dns,
            inventory,
        }
    }

    pub fn get(&self, id: u64) -> Instance {
        self.inventory.instance(InstanceId(id)).unwrap()
    }

    /// Overwrite one record without going through the orchestrator.
    pub fn edit(&self, id: u64, change: impl FnOnce(&mut Instance)) {
        let mut instance = self.get(id);
        change(&mut instance);
        self.inventory.put_instance(instance);
    }

    /// Hosts that executed a command containing `pattern`, in call order.
    pub fn hosts_running(&self, pattern: &str) -> Vec<String> {
        self.channel
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                herdsman::remote::RemoteCall::Execute { host, command } if command.contains(pattern) => {
                    Some(host)
                }
                _ => None,
            })
            .collect()
    }
}
