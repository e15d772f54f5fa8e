//! Substitution context for command templates

use std::collections::BTreeMap;

use crate::inventory::{Instance, Placement};

/// Values a template may reference, derived from one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateContext {
    pub instance_name: String,
    pub herd_name: String,
    pub instance_id: String,
    pub host: String,
    pub port: u16,
    pub pgdata: String,
    pub version: String,
    extra: BTreeMap<String, String>,
}

impl TemplateContext {
    /// Build the context for an instance at its placement.
    pub fn new(instance: &Instance, placement: &Placement) -> Self {
        Self {
            instance_name: placement.herd.instance_name.clone(),
            herd_name: placement.herd.name.clone(),
            instance_id: instance.id.to_string(),
            host: placement.host.clone(),
            port: placement.herd.port,
            pgdata: instance.pgdata(&placement.herd).to_string(),
            version: instance.version.clone(),
            extra: BTreeMap::new(),
        }
    }

    /// Add a caller-specific variable such as `source_host`.
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.extra.insert(name.to_string(), value.into());
        self
    }

    fn version_parts(&self) -> Vec<&str> {
        if self.version.is_empty() {
            Vec::new()
        } else {
            self.version.split('.').collect()
        }
    }

    fn is_modern(&self) -> bool {
        self.version_parts()
            .first()
            .and_then(|p| p.parse::<u32>().ok())
            .map_or(true, |major| major >= 10)
    }

    /// Major version as the cluster tools name it: `12` or `9.6`.
    pub fn major(&self) -> String {
        let parts = self.version_parts();
        if self.is_modern() {
            parts.first().map(|p| p.to_string()).unwrap_or_default()
        } else {
            parts.iter().take(2).copied().collect::<Vec<_>>().join(".")
        }
    }

    /// Name of the write-ahead log directory inside the data directory.
    pub fn wal_dir(&self) -> &'static str {
        if self.is_modern() {
            "pg_wal"
        } else {
            "pg_xlog"
        }
    }

    /// Look up a placeholder. `index` selects a version part.
    pub fn lookup(&self, name: &str, index: Option<usize>) -> Option<String> {
        if let Some(i) = index {
            return match name {
                "version" => Some(
                    self.version_parts()
                        .get(i)
                        .map(|p| p.to_string())
                        .unwrap_or_default(),
                ),
                _ => None,
            };
        }

        let modern = self.is_modern();
        let value = match name {
            "instance" => self.instance_name.clone(),
            "herd" => self.herd_name.clone(),
            "instance_id" => self.instance_id.clone(),
            "host" => self.host.clone(),
            "port" => self.port.to_string(),
            "pgdata" => self.pgdata.clone(),
            "version" => self.version.clone(),
            "major" => self.major(),
            "wal_dir" => self.wal_dir().to_string(),
            "wal" => if modern { "wal" } else { "xlog" }.to_string(),
            "lsn" => if modern { "lsn" } else { "location" }.to_string(),
            other => return self.extra.get(other).cloned(),
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{Herd, HerdId, InstanceId, ServerId};

    fn context(version: &str) -> TemplateContext {
        let herd = Herd {
            id: HerdId(1),
            name: "ledger".into(),
            instance_name: "main".into(),
            port: 5444,
            pgdata: "/db/ledger".into(),
            vhost: "ledger-db".into(),
            environment: None,
        };
        let mut inst = Instance::new(InstanceId(4), herd.id, ServerId(1));
        inst.version = version.to_string();
        TemplateContext::new(
            &inst,
            &Placement {
                herd,
                host: "db-b".into(),
            },
        )
    }

    #[test]
    fn test_major_modern_and_legacy() {
        assert_eq!(context("12.4").major(), "12");
        assert_eq!(context("9.6.3").major(), "9.6");
        assert_eq!(context("").major(), "");
    }

    #[test]
    fn test_wal_naming() {
        assert_eq!(context("13.1").wal_dir(), "pg_wal");
        assert_eq!(context("9.4.10").wal_dir(), "pg_xlog");
        assert_eq!(context("9.4.10").lookup("lsn", None).unwrap(), "location");
        assert_eq!(context("15.2").lookup("wal", None).unwrap(), "wal");
    }

    #[test]
    fn test_version_parts() {
        let ctx = context("9.6.3");
        assert_eq!(ctx.lookup("version", Some(0)).unwrap(), "9");
        assert_eq!(ctx.lookup("version", Some(2)).unwrap(), "3");
        assert_eq!(ctx.lookup("version", Some(5)).unwrap(), "");
        assert_eq!(ctx.lookup("port", Some(0)), None);
    }

    #[test]
    fn test_extra_variables() {
        let ctx = context("12.4").with("source_host", "db-a");
        assert_eq!(ctx.lookup("source_host", None).unwrap(), "db-a");
        assert_eq!(ctx.lookup("unknown", None), None);
    }
}
