//! Orchestrator facade
//!
//! Owns the collaborators, loads a fresh record for every request, takes the
//! operation locks and hands off to the components.

use std::sync::Arc;
use std::thread;

use serde::Serialize;

use crate::config::Config;
use crate::errors::{OrchestratorError, OrchestratorResult};
use crate::failover::{DnsUpdater, FailoverCoordinator, FailoverReport};
use crate::inventory::{DrPair, Herd, HerdId, Instance, InstanceId, Inventory};
use crate::lifecycle::{CommandOutcome, CommandRunner, InstanceController};
use crate::observability::{MetricsRegistry, MetricsSnapshot};
use crate::promotion::{RoleTransition, StandbySettings};
use crate::rebuild::{RebuildEngine, RebuildReport};
use crate::remote::RemoteChannel;
use crate::templates::CommandTemplates;
use crate::topology::{herd_health, HerdHealth};

use super::batch::{BatchOutcome, BatchReport, LifecycleAction};
use super::bootstrap;
use super::locks::LockTable;

/// Snapshot of one herd for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct HerdStatus {
    pub herd: Herd,
    pub health: HerdHealth,
    pub members: Vec<Instance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dr_pair: Option<DrPair>,
    /// Why no DR pair could be measured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dr_error: Option<String>,
}

/// Entry point for every orchestrated operation.
pub struct Orchestrator {
    config: Config,
    channel: Arc<dyn RemoteChannel>,
    inventory: Arc<dyn Inventory>,
    dns: Arc<dyn DnsUpdater>,
    templates: CommandTemplates,
    standby: StandbySettings,
    metrics: MetricsRegistry,
    locks: LockTable,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        channel: Arc<dyn RemoteChannel>,
        inventory: Arc<dyn Inventory>,
        dns: Arc<dyn DnsUpdater>,
    ) -> Self {
        let templates = config.command_templates();
        let standby = config.standby_settings();
        Self {
            config,
            channel,
            inventory,
            dns,
            templates,
            standby,
            metrics: MetricsRegistry::new(),
            locks: LockTable::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn inventory(&self) -> &dyn Inventory {
        self.inventory.as_ref()
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn runner(&self) -> CommandRunner<'_> {
        CommandRunner::new(
            self.channel.as_ref(),
            self.inventory.as_ref(),
            &self.templates,
            &self.metrics,
        )
    }

    fn controller(&self) -> InstanceController<'_> {
        InstanceController::new(self.runner())
    }

    fn transition(&self) -> RoleTransition<'_> {
        RoleTransition::new(self.runner(), &self.standby, self.config.rebuild.settle())
    }

    fn coordinator(&self) -> FailoverCoordinator<'_> {
        FailoverCoordinator::new(
            self.runner(),
            &self.standby,
            self.dns.as_ref(),
            &self.config.failover,
            self.config.rebuild.settle(),
        )
    }

    /// Load an instance and hold its lock for the duration of `op`.
    fn with_instance<T>(
        &self,
        id: InstanceId,
        op: impl FnOnce(Instance) -> OrchestratorResult<T>,
    ) -> OrchestratorResult<T> {
        let instance = self.inventory.instance(id)?;
        let _guard = self.locks.lock_instance(instance.herd_id, id)?;
        // Re-read under the lock so the record is current.
        let instance = self.inventory.instance(id)?;
        op(instance).map_err(|e| match e.instance {
            Some(_) => e,
            None => e.for_instance(id),
        })
    }

    pub fn start(&self, id: InstanceId) -> OrchestratorResult<Instance> {
        self.with_instance(id, |i| self.controller().start(i))
    }

    pub fn stop(&self, id: InstanceId) -> OrchestratorResult<Instance> {
        self.with_instance(id, |i| self.controller().stop(i))
    }

    pub fn reload(&self, id: InstanceId) -> OrchestratorResult<Instance> {
        self.with_instance(id, |i| self.controller().reload(i))
    }

    pub fn restart(&self, id: InstanceId) -> OrchestratorResult<Instance> {
        self.with_instance(id, |i| self.controller().restart(i))
    }

    /// Run any template action (for example `init`) on one instance.
    pub fn run_action(&self, action: &str, id: InstanceId) -> OrchestratorResult<CommandOutcome> {
        self.with_instance(id, |i| self.controller().run(action, &i))
    }

    pub fn rebuild(&self, id: InstanceId) -> OrchestratorResult<RebuildReport> {
        self.with_instance(id, |i| {
            RebuildEngine::new(self.runner(), &self.standby, self.config.rebuild.settle())
                .rebuild(i)
        })
    }

    pub fn promote(&self, id: InstanceId) -> OrchestratorResult<Instance> {
        self.with_instance(id, |i| self.transition().promote(i))
    }

    pub fn remaster(&self, id: InstanceId, master: InstanceId) -> OrchestratorResult<Instance> {
        self.with_instance(id, |i| {
            let new_master = self.inventory.instance(master)?;
            self.transition().remaster(i, &new_master)
        })
    }

    /// Demote a primary. Holds the whole herd.
    pub fn demote(&self, id: InstanceId) -> OrchestratorResult<RebuildReport> {
        let instance = self.inventory.instance(id)?;
        let members = self.member_ids(instance.herd_id)?;
        let _guard = self.locks.lock_herd(instance.herd_id, &members)?;

        let instance = self.inventory.instance(id)?;
        self.transition().demote(instance)
    }

    /// Fail a herd over to `target`. Holds the whole herd.
    pub fn failover(&self, herd: HerdId, target: InstanceId) -> OrchestratorResult<FailoverReport> {
        let members = self.member_ids(herd)?;
        let _guard = self.locks.lock_herd(herd, &members)?;
        self.coordinator().failover(herd, target)
    }

    /// Query and attach a newly recorded instance.
    pub fn register(&self, id: InstanceId) -> OrchestratorResult<Instance> {
        self.with_instance(id, |i| bootstrap::register(self.runner(), i))
    }

    /// Herd consistency, members and, when measurable, DR pair lag.
    ///
    /// Persists measured positions, so it holds the whole herd.
    pub fn status(&self, herd_id: HerdId) -> OrchestratorResult<HerdStatus> {
        let herd = self.inventory.herd(herd_id)?;
        let members = self.member_ids(herd_id)?;
        let _guard = self.locks.lock_herd(herd_id, &members)?;

        let (dr_pair, dr_error) = match self.coordinator().observe_dr_pair(herd_id) {
            Ok(pair) => (Some(pair), None),
            Err(e) => (None, Some(e.to_string())),
        };

        // Read members after the observation so measured positions show up.
        let members = self.inventory.members(herd_id)?;
        Ok(HerdStatus {
            health: herd_health(&members),
            herd,
            members,
            dr_pair,
            dr_error,
        })
    }

    /// Apply one lifecycle action to many instances.
    ///
    /// Up to `max_parallel` instances run at a time, each on its own thread.
    pub fn batch(&self, action: LifecycleAction, ids: &[InstanceId]) -> BatchReport {
        let width = self.config.max_parallel.max(1);
        let mut outcomes = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(width) {
            thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|id| scope.spawn(move || self.batch_one(action, *id)))
                    .collect();
                for (handle, id) in handles.into_iter().zip(chunk) {
                    let outcome = handle.join().unwrap_or_else(|_| BatchOutcome::Failed {
                        instance: *id,
                        code: "HERD_PANIC".to_string(),
                        error: "worker thread panicked".to_string(),
                    });
                    outcomes.push(outcome);
                }
            });
        }

        BatchReport { action, outcomes }
    }

    fn batch_one(&self, action: LifecycleAction, id: InstanceId) -> BatchOutcome {
        let current = match self.inventory.instance(id) {
            Ok(instance) => instance,
            Err(e) => return BatchOutcome::failed(id, &OrchestratorError::from(e)),
        };

        let skip = match action {
            LifecycleAction::Start if current.is_online => Some("already online"),
            LifecycleAction::Stop if !current.is_online => Some("already offline"),
            LifecycleAction::Reload if !current.is_online => Some("offline"),
            _ => None,
        };
        if let Some(reason) = skip {
            return BatchOutcome::Skipped {
                instance: id,
                reason: reason.to_string(),
            };
        }

        let result = match action {
            LifecycleAction::Start => self.start(id),
            LifecycleAction::Stop => self.stop(id),
            LifecycleAction::Reload => self.reload(id),
            LifecycleAction::Restart => self.restart(id),
            LifecycleAction::Rebuild => self.rebuild(id).map(|report| report.instance),
        };
        match result {
            Ok(instance) => BatchOutcome::Done {
                instance: id,
                online: instance.is_online,
            },
            Err(e) => BatchOutcome::failed(id, &e),
        }
    }

    fn member_ids(&self, herd: HerdId) -> OrchestratorResult<Vec<InstanceId>> {
        Ok(self
            .inventory
            .members(herd)?
            .into_iter()
            .map(|m| m.id)
            .collect())
    }
}
