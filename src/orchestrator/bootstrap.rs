//! Instance registration
//!
//! A newly recorded instance is queried once so its record starts out true:
//!
//! - online flag and engine version from a version query
//! - upstream primary from the herd topology when none is recorded
//! - the primary's version when the query could not answer
//! - current (or replayed) replication position

use std::sync::OnceLock;

use regex::Regex;

use crate::errors::OrchestratorResult;
use crate::inventory::{Instance, Lsn};
use crate::lifecycle::{CommandOutcome, CommandRunner};
use crate::observability::{log_event, Event};
use crate::topology::resolve_primary;

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+(?:\.\d+)*").expect("static pattern"))
}

/// Pull the dotted version out of `SHOW server_version` output such as
/// `12.4 (Debian 12.4-1.pgdg100+1)`.
pub fn parse_server_version(output: &str) -> Option<String> {
    version_pattern()
        .find(output.trim())
        .map(|m| m.as_str().to_string())
}

/// Query `instance`, attach it to its herd's primary and persist the result.
pub fn register(runner: CommandRunner<'_>, mut instance: Instance) -> OrchestratorResult<Instance> {
    let reported = match runner.run("server_version", &instance, &[]) {
        Ok(CommandOutcome::Completed(out)) => parse_server_version(&out),
        _ => None,
    };
    instance.is_online = reported.is_some();
    if let Some(version) = &reported {
        instance.version = version.clone();
    }

    if instance.is_primary() {
        let members = runner.inventory().members(instance.herd_id)?;
        if let Some(primary) = resolve_primary(&members, Some(instance.id)) {
            instance.master = Some(primary.id);
            if reported.is_none() {
                instance.version = primary.version.clone();
            }
        }
    }

    if instance.is_online {
        let action = if instance.is_primary() {
            "position"
        } else {
            "replay_position"
        };
        if let Ok(CommandOutcome::Completed(out)) = runner.run(action, &instance, &[]) {
            if let Ok(position) = Lsn::parse_output(&out) {
                instance.advance_position(position);
            }
        }
    }

    runner.save(&instance)?;

    let master = instance.master.map(|m| m.to_string()).unwrap_or_default();
    log_event(
        Event::InstanceRegistered,
        &[
            ("instance", &instance.id.to_string()),
            ("master", &master),
            ("online", if instance.is_online { "true" } else { "false" }),
            ("version", &instance.version),
        ],
    );
    Ok(instance)
}
