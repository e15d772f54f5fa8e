//! Copy commands for a full resync
//!
//! All copies run on the replica's host and pull from the primary, so the
//! replica needs nothing but ssh access to the primary.

use crate::remote::shell_quote;
use crate::templates::{CommandTemplates, TemplateContext};

/// The three copy passes of a full resync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    /// Data directory minus the standby file, pid files and WAL contents
    pub bulk: String,
    /// WAL directory, copied after backup mode ends
    pub wal: String,
    /// Configuration directory; `None` when no `config_dir` template exists
    pub config: Option<String>,
}

impl SyncPlan {
    /// Build the copy commands, or `None` when the `sync` template is empty.
    pub fn build(
        templates: &CommandTemplates,
        replica: &TemplateContext,
        source: &TemplateContext,
        standby_file: &str,
    ) -> Option<Self> {
        let sync = templates.resolve("sync", replica);
        if sync.trim().is_empty() {
            return None;
        }

        let source_data = source.pgdata.trim_end_matches('/');
        let target_data = replica.pgdata.trim_end_matches('/');
        let wal_dir = source.wal_dir();

        let bulk = format!(
            "{} --exclude={} --exclude={} --exclude={} {} {}",
            sync,
            shell_quote(standby_file),
            shell_quote("postmaster.*"),
            shell_quote(&format!("{}/*", wal_dir)),
            shell_quote(&format!("{}:{}/", source.host, source_data)),
            shell_quote(target_data),
        );

        let wal = format!(
            "{} {} {}",
            sync,
            shell_quote(&format!("{}:{}/{}", source.host, source_data, wal_dir)),
            shell_quote(target_data),
        );

        let source_config = templates.resolve("config_dir", source);
        let target_config = templates.resolve("config_dir", replica);
        let config = if source_config.is_empty() || target_config.is_empty() {
            None
        } else {
            Some(format!(
                "{} {} {}",
                sync,
                shell_quote(&format!(
                    "{}:{}/",
                    source.host,
                    source_config.trim_end_matches('/')
                )),
                shell_quote(target_config.trim_end_matches('/')),
            ))
        };

        Some(Self { bulk, wal, config })
    }

    /// Commands in execution order.
    pub fn commands(&self) -> Vec<&str> {
        let mut commands = vec![self.bulk.as_str(), self.wal.as_str()];
        if let Some(config) = &self.config {
            commands.push(config);
        }
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{Herd, HerdId, Instance, InstanceId, Placement, ServerId};

    fn context(id: u64, host: &str, version: &str) -> TemplateContext {
        let mut instance = Instance::new(InstanceId(id), HerdId(1), ServerId(id));
        instance.version = version.into();
        let placement = Placement {
            herd: Herd {
                id: HerdId(1),
                name: "orders".into(),
                instance_name: "orders".into(),
                port: 5432,
                pgdata: "/db/orders/".into(),
                vhost: "orders-db".into(),
                environment: None,
            },
            host: host.into(),
        };
        TemplateContext::new(&instance, &placement)
    }

    #[test]
    fn test_plan_modern_version() {
        let plan = SyncPlan::build(
            &CommandTemplates::defaults(),
            &context(2, "db2", "12.4"),
            &context(1, "db1", "12.4"),
            "recovery.conf",
        )
        .unwrap();

        assert_eq!(
            plan.bulk,
            "rsync -a --rsh=ssh -W --delete --exclude='recovery.conf' \
             --exclude='postmaster.*' --exclude='pg_wal/*' 'db1:/db/orders/' '/db/orders'"
        );
        assert_eq!(
            plan.wal,
            "rsync -a --rsh=ssh -W --delete 'db1:/db/orders/pg_wal' '/db/orders'"
        );
        assert_eq!(
            plan.config.as_deref(),
            Some("rsync -a --rsh=ssh -W --delete 'db1:/etc/postgresql/12/orders/' '/etc/postgresql/12/orders'")
        );
        assert_eq!(plan.commands().len(), 3);
    }

    #[test]
    fn test_plan_legacy_wal_dir() {
        let plan = SyncPlan::build(
            &CommandTemplates::defaults(),
            &context(2, "db2", "9.6.3"),
            &context(1, "db1", "9.6.3"),
            "recovery.conf",
        )
        .unwrap();
        assert!(plan.bulk.contains("--exclude='pg_xlog/*'"));
        assert!(plan.wal.ends_with("'db1:/db/orders/pg_xlog' '/db/orders'"));
    }

    #[test]
    fn test_plan_without_sync_or_config_dir() {
        let mut templates = CommandTemplates::defaults();
        templates.set("config_dir", "");
        let plan = SyncPlan::build(
            &templates,
            &context(2, "db2", "12"),
            &context(1, "db1", "12"),
            "recovery.conf",
        )
        .unwrap();
        assert!(plan.config.is_none());
        assert_eq!(plan.commands().len(), 2);

        templates.set("sync", "");
        assert!(SyncPlan::build(
            &templates,
            &context(2, "db2", "12"),
            &context(1, "db1", "12"),
            "recovery.conf"
        )
        .is_none());
    }
}
