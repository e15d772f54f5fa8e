//! Role Transition Engine
//!
//! Moves instances between the primary and replica roles:
//!
//! - promote: replica becomes a primary
//! - demote: primary becomes a replica of another primary, rebuilt in full
//! - remaster: replica switches to a different upstream without a rebuild
//!
//! Demotion is the only request that can leave a herd without a primary, so
//! it is refused before any remote action when no adoptive primary exists.

use std::time::Duration;

use crate::errors::{OrchestratorError, OrchestratorResult};
use crate::inventory::{Instance, InstanceId};
use crate::lifecycle::{CommandRunner, InstanceController};
use crate::observability::{log_event, Counter, Event, ObservationScope};
use crate::rebuild::{RebuildEngine, RebuildReport};
use crate::topology::resolve_primary;

use super::standby::{write_standby_config, StandbySettings};

/// Promote, demote and remaster instances.
pub struct RoleTransition<'a> {
    runner: CommandRunner<'a>,
    standby: &'a StandbySettings,
    rebuild_settle: Duration,
}

impl<'a> RoleTransition<'a> {
    pub fn new(
        runner: CommandRunner<'a>,
        standby: &'a StandbySettings,
        rebuild_settle: Duration,
    ) -> Self {
        Self {
            runner,
            standby,
            rebuild_settle,
        }
    }

    /// Make a replica writable and forget its upstream.
    ///
    /// An instance that is already a primary is returned unchanged.
    pub fn promote(&self, instance: Instance) -> OrchestratorResult<Instance> {
        let id = instance.id.to_string();
        if instance.is_primary() {
            log_event(
                Event::InstanceUnchanged,
                &[
                    ("action", "promote"),
                    ("instance", &id),
                    ("reason", "already primary"),
                ],
            );
            return Ok(instance);
        }

        let outcome = self
            .runner
            .run("promote", &instance, &[])
            .map_err(|e| e.during("promote"))?;
        if !outcome.ran() {
            return Err(OrchestratorError::configuration(
                "promote command is empty; the server would stay a standby",
            )
            .for_instance(instance.id));
        }

        let mut instance = instance;
        let previous = instance.master.take();
        self.runner.save(&instance)?;

        self.runner.metrics().increment(Counter::Promotions);
        let previous = previous.map(|m| m.to_string()).unwrap_or_default();
        log_event(
            Event::Promoted,
            &[("instance", &id), ("previous_master", &previous)],
        );
        Ok(instance)
    }

    /// Turn `instance` into a replica of the herd's remaining primary and
    /// rebuild it from there.
    pub fn demote(&self, instance: Instance) -> OrchestratorResult<RebuildReport> {
        let scope = ObservationScope::begin("DEMOTE", &[("instance", instance.id.to_string())]);

        let members = self.runner.inventory().members(instance.herd_id)?;
        let adoptive = match resolve_primary(&members, Some(instance.id)) {
            Some(primary) => primary.id,
            None => {
                self.runner.metrics().increment(Counter::SafetyViolations);
                let id = instance.id.to_string();
                log_event(
                    Event::DemotionRejected,
                    &[("instance", &id), ("reason", "no other primary in herd")],
                );
                let err = OrchestratorError::safety_violation(
                    "demotion would leave the herd without a primary",
                )
                .for_instance(instance.id);
                scope.fail(&err.to_string());
                return Err(err);
            }
        };

        let result = self.adopt(instance, adoptive);
        match &result {
            Ok(report) => scope.complete(&[
                ("master", &report.master.to_string()),
                ("path", report.path.as_str()),
            ]),
            Err(e) => scope.fail(&e.to_string()),
        }
        result
    }

    fn adopt(
        &self,
        mut instance: Instance,
        adoptive: InstanceId,
    ) -> OrchestratorResult<RebuildReport> {
        instance.master = Some(adoptive);
        self.runner.save(&instance)?;
        self.runner.metrics().increment(Counter::Demotions);

        write_standby_config(&self.runner, self.standby, &instance)?;

        RebuildEngine::new(self.runner, self.standby, self.rebuild_settle).rebuild(instance)
    }

    /// Point a replica at `new_master` with a configuration reload.
    ///
    /// Assumes the two are already compatible; no data is copied.
    pub fn remaster(&self, instance: Instance, new_master: &Instance) -> OrchestratorResult<Instance> {
        if new_master.id == instance.id {
            return Err(OrchestratorError::precondition("instance cannot follow itself")
                .for_instance(instance.id));
        }
        if new_master.herd_id != instance.herd_id {
            return Err(OrchestratorError::precondition(format!(
                "new master {} belongs to herd {}, not herd {}",
                new_master.id, new_master.herd_id, instance.herd_id
            ))
            .for_instance(instance.id));
        }
        if !new_master.is_primary() {
            return Err(OrchestratorError::precondition(format!(
                "new master {} is itself a replica of {}",
                new_master.id,
                new_master.master.map(|m| m.to_string()).unwrap_or_default()
            ))
            .for_instance(instance.id));
        }

        write_standby_config(&self.runner, self.standby, &instance)?;
        let mut instance = InstanceController::new(self.runner)
            .reload(instance)
            .map_err(|e| e.during("reload"))?;

        instance.master = Some(new_master.id);
        self.runner.save(&instance)?;

        self.runner.metrics().increment(Counter::Remasters);
        log_event(
            Event::Remastered,
            &[
                ("instance", &instance.id.to_string()),
                ("master", &new_master.id.to_string()),
            ],
        );
        Ok(instance)
    }
}
