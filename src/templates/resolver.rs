//! Command template resolution

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use super::context::TemplateContext;

/// Built-in templates for Debian-style `pg_ctlcluster` hosts.
const DEFAULT_TEMPLATES: &[(&str, &str)] = &[
    ("pg_ctl", "pg_ctlcluster {major} {instance}"),
    ("psql", "psql -At -X -p {port} -d postgres"),
    ("start", "{pg_ctl} start"),
    ("stop", "{pg_ctl} stop -m fast"),
    ("reload", "{pg_ctl} reload"),
    ("promote", "{pg_ctl} promote"),
    ("init", "pg_createcluster {major} {instance} -d {pgdata} -p {port}"),
    (
        "rewind",
        "/usr/lib/postgresql/{major}/bin/pg_rewind --target-pgdata={pgdata} \
         --source-server='host={source_host} port={port} user=postgres dbname=postgres'",
    ),
    (
        "backup_start",
        "{psql} -c \"SELECT pg_start_backup('herdsman', true)\"",
    ),
    ("backup_stop", "{psql} -c \"SELECT pg_stop_backup()\""),
    ("position", "{psql} -c \"SELECT pg_current_{wal}_{lsn}()\""),
    (
        "replay_position",
        "{psql} -c \"SELECT pg_last_{wal}_replay_{lsn}()\"",
    ),
    ("server_version", "{psql} -c \"SHOW server_version\""),
    ("sync", "rsync -a --rsh=ssh -W --delete"),
    ("config_dir", "/etc/postgresql/{major}/{instance}"),
];

fn placeholder() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)(?:\[(\d+)\])?\}").expect("static pattern")
    })
}

/// Mapping from action name to command template.
///
/// Passed explicitly to every component that runs commands; there is no
/// process-wide template table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplates {
    templates: BTreeMap<String, String>,
}

impl Default for CommandTemplates {
    fn default() -> Self {
        Self::defaults()
    }
}

impl CommandTemplates {
    /// The built-in template set.
    pub fn defaults() -> Self {
        Self {
            templates: DEFAULT_TEMPLATES
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// An empty template set.
    pub fn empty() -> Self {
        Self {
            templates: BTreeMap::new(),
        }
    }

    /// Built-in templates overlaid with operator overrides.
    ///
    /// An override with an empty value disables that action.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Self {
        let mut templates = Self::defaults();
        for (action, template) in overrides {
            templates.set(action, template);
        }
        templates
    }

    pub fn set(&mut self, action: &str, template: &str) {
        self.templates
            .insert(action.to_string(), template.to_string());
    }

    /// Raw template for an action.
    pub fn get(&self, action: &str) -> Option<&str> {
        self.templates.get(action).map(String::as_str)
    }

    /// Resolve an action into a command line.
    ///
    /// Unknown actions resolve to an empty string. Callers must treat an empty
    /// command as a no-op and never send it to a host.
    pub fn resolve(&self, action: &str, ctx: &TemplateContext) -> String {
        let Some(template) = self.get(action) else {
            return String::new();
        };

        let expanded = self.expand_macros(template);
        placeholder()
            .replace_all(&expanded, |caps: &Captures| {
                let index = caps.get(2).and_then(|m| m.as_str().parse().ok());
                ctx.lookup(&caps[1], index)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .trim()
            .to_string()
    }

    /// Replace references to other templates with their raw text, once.
    fn expand_macros(&self, template: &str) -> String {
        placeholder()
            .replace_all(template, |caps: &Captures| {
                match (caps.get(2), self.templates.get(&caps[1])) {
                    (None, Some(inner)) => inner.clone(),
                    _ => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}
