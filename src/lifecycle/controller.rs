//! Instance Controller
//!
//! State machine per instance:
//!
//! ```text
//! Offline --start--> Online
//! Online  --stop---> Offline
//! Online  --reload-> Online
//! ```
//!
//! Requests that match the recorded state are no-ops. A remote failure whose
//! diagnostics say the server is already in the requested state counts as
//! success. The online flag is persisted before an operation returns.

use crate::errors::{BenignReason, OrchestratorResult};
use crate::inventory::Instance;
use crate::observability::{log_event, Counter, Event};

use super::runner::{CommandOutcome, CommandRunner};

/// Diagnostics accepted from start and stop.
const LIFECYCLE_BENIGN: &[BenignReason] = &[
    BenignReason::AlreadyRunning,
    BenignReason::NotRunning,
    BenignReason::DoesNotExist,
];

/// Start, stop and reload single instances.
pub struct InstanceController<'a> {
    runner: CommandRunner<'a>,
}

impl<'a> InstanceController<'a> {
    pub fn new(runner: CommandRunner<'a>) -> Self {
        Self { runner }
    }

    /// Bring an offline instance online.
    pub fn start(&self, instance: Instance) -> OrchestratorResult<Instance> {
        if instance.is_online {
            self.unchanged(&instance, "start", "already online");
            return Ok(instance);
        }

        self.transition(instance, true)
    }

    /// Take an online instance offline.
    pub fn stop(&self, instance: Instance) -> OrchestratorResult<Instance> {
        if !instance.is_online {
            self.unchanged(&instance, "stop", "already offline");
            return Ok(instance);
        }

        self.transition(instance, false)
    }

    /// Ask a running instance to re-read its configuration.
    ///
    /// An offline instance has nothing to reload.
    pub fn reload(&self, instance: Instance) -> OrchestratorResult<Instance> {
        if !instance.is_online {
            self.unchanged(&instance, "reload", "offline");
            return Ok(instance);
        }

        if self.runner.run("reload", &instance, &[])?.ran() {
            self.runner.metrics().increment(Counter::Reloads);
            log_event(
                Event::InstanceReloaded,
                &[("instance", &instance.id.to_string())],
            );
        }
        Ok(instance)
    }

    /// Stop, then start, whatever the recorded state says.
    pub fn restart(&self, instance: Instance) -> OrchestratorResult<Instance> {
        let stopped = self.transition(instance, false)?;
        self.transition(stopped, true)
    }

    /// Run start or stop and record the new state once the host agrees.
    fn transition(&self, instance: Instance, online: bool) -> OrchestratorResult<Instance> {
        let action = if online { "start" } else { "stop" };
        let outcome = self
            .runner
            .run_tolerating(action, &instance, &[], LIFECYCLE_BENIGN)?;
        if outcome == CommandOutcome::Skipped {
            return Ok(instance);
        }

        let mut instance = instance;
        instance.is_online = online;
        self.runner.save(&instance)?;

        let id = instance.id.to_string();
        if online {
            self.runner.metrics().increment(Counter::Starts);
            log_event(Event::InstanceStarted, &[("instance", &id)]);
        } else {
            self.runner.metrics().increment(Counter::Stops);
            log_event(Event::InstanceStopped, &[("instance", &id)]);
        }
        Ok(instance)
    }

    /// Run an arbitrary action without touching recorded state.
    pub fn run(&self, action: &str, instance: &Instance) -> OrchestratorResult<CommandOutcome> {
        self.runner.run(action, instance, &[])
    }

    fn unchanged(&self, instance: &Instance, action: &str, reason: &str) {
        log_event(
            Event::InstanceUnchanged,
            &[
                ("action", action),
                ("instance", &instance.id.to_string()),
                ("reason", reason),
            ],
        );
    }
}
