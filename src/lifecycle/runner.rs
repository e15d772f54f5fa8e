//! Resolved-command dispatch
//!
//! Every component that touches a host goes through a `CommandRunner`: it
//! resolves the action template against the instance, skips empty commands,
//! dispatches through the remote channel and keeps the counters current.

use crate::errors::{classify, BenignReason, Disposition, OrchestratorError, OrchestratorResult};
use crate::inventory::{Instance, Inventory, Placement};
use crate::observability::{log_event, Counter, Event, MetricsRegistry};
use crate::remote::RemoteChannel;
use crate::templates::{CommandTemplates, TemplateContext};

/// What happened to one resolved action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Command ran; carries its standard output
    Completed(String),
    /// Template resolved to an empty command; nothing ran
    Skipped,
    /// Command failed with a diagnostic recognized as harmless
    Benign(BenignReason),
}

impl CommandOutcome {
    /// True when a remote command actually ran to success.
    pub fn ran(&self) -> bool {
        matches!(self, CommandOutcome::Completed(_))
    }

    /// Standard output of a completed command.
    pub fn output(&self) -> Option<&str> {
        match self {
            CommandOutcome::Completed(out) => Some(out),
            _ => None,
        }
    }
}

/// Borrowed collaborators shared by the lifecycle components.
#[derive(Clone, Copy)]
pub struct CommandRunner<'a> {
    channel: &'a dyn RemoteChannel,
    inventory: &'a dyn Inventory,
    templates: &'a CommandTemplates,
    metrics: &'a MetricsRegistry,
}

impl<'a> CommandRunner<'a> {
    pub fn new(
        channel: &'a dyn RemoteChannel,
        inventory: &'a dyn Inventory,
        templates: &'a CommandTemplates,
        metrics: &'a MetricsRegistry,
    ) -> Self {
        Self {
            channel,
            inventory,
            templates,
            metrics,
        }
    }

    pub fn inventory(&self) -> &'a dyn Inventory {
        self.inventory
    }

    pub fn templates(&self) -> &'a CommandTemplates {
        self.templates
    }

    pub fn metrics(&self) -> &'a MetricsRegistry {
        self.metrics
    }

    /// Herd and host of an instance.
    pub fn placement(&self, instance: &Instance) -> OrchestratorResult<Placement> {
        self.inventory
            .placement_of(instance)
            .map_err(|e| OrchestratorError::from(e).for_instance(instance.id))
    }

    /// Template context for an instance.
    pub fn context(&self, instance: &Instance) -> OrchestratorResult<TemplateContext> {
        let placement = self.placement(instance)?;
        Ok(TemplateContext::new(instance, &placement))
    }

    /// Persist one instance record.
    pub fn save(&self, instance: &Instance) -> OrchestratorResult<()> {
        self.inventory
            .save_instance(instance)
            .map_err(|e| OrchestratorError::from(e).for_instance(instance.id))
    }

    /// Resolve and run `action` on the instance's host.
    ///
    /// `extra` adds caller variables to the template context.
    pub fn run(
        &self,
        action: &str,
        instance: &Instance,
        extra: &[(&str, String)],
    ) -> OrchestratorResult<CommandOutcome> {
        self.run_tolerating(action, instance, extra, &[])
    }

    /// Like `run`, but a failure whose diagnostics match one of `accept`
    /// counts as success.
    pub fn run_tolerating(
        &self,
        action: &str,
        instance: &Instance,
        extra: &[(&str, String)],
        accept: &[BenignReason],
    ) -> OrchestratorResult<CommandOutcome> {
        let mut ctx = self.context(instance)?;
        for (name, value) in extra {
            ctx = ctx.with(name, value.clone());
        }

        let command = self.templates.resolve(action, &ctx);
        let id = instance.id.to_string();
        if command.trim().is_empty() {
            log_event(
                Event::CommandSkipped,
                &[("action", action), ("instance", &id)],
            );
            return Ok(CommandOutcome::Skipped);
        }

        match self.execute(&ctx.host, &command) {
            Ok(out) => Ok(CommandOutcome::Completed(out)),
            Err(e) => {
                let e = e.for_instance(instance.id);
                match classify(&e) {
                    Disposition::Benign(reason) if accept.contains(&reason) => {
                        self.metrics.increment(Counter::BenignFailures);
                        log_event(
                            Event::BenignFailure,
                            &[
                                ("action", action),
                                ("instance", &id),
                                ("diagnostics", e.diagnostics()),
                            ],
                        );
                        Ok(CommandOutcome::Benign(reason))
                    }
                    _ => Err(e),
                }
            }
        }
    }

    /// Run an already-built command line on `host`.
    pub fn execute(&self, host: &str, command: &str) -> OrchestratorResult<String> {
        self.metrics.increment(Counter::RemoteCommands);
        log_event(Event::RemoteCommand, &[("host", host), ("command", command)]);
        self.channel.execute(host, command).map_err(|e| {
            self.metrics.increment(Counter::RemoteFailures);
            OrchestratorError::from(e)
        })
    }

    /// Deliver a generated file to `host`.
    pub fn transfer(&self, host: &str, content: &str, path: &str) -> OrchestratorResult<()> {
        self.metrics.increment(Counter::RemoteCommands);
        log_event(Event::RemoteTransfer, &[("host", host), ("path", path)]);
        self.channel.transfer(host, content, path).map_err(|e| {
            self.metrics.increment(Counter::RemoteFailures);
            OrchestratorError::from(e)
        })
    }
}
