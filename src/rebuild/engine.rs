//! Replica Rebuild Engine
//!
//! Resynchronizes a replica from its primary:
//!
//! 1. Stop the replica if it is online
//! 2. Try an incremental rewind against the primary
//! 3. Otherwise copy the data directory while the primary is in backup mode
//! 4. Regenerate the standby configuration
//! 5. Start the replica and let it settle
//! 6. Record the primary's version on the replica
//!
//! A failing step aborts the rebuild and leaves everything as it is for
//! inspection. The only cleanup is releasing backup mode on the primary when
//! the bulk copy fails.

use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::errors::{classify, BenignReason, Disposition, OrchestratorError, OrchestratorResult};
use crate::inventory::{Instance, InstanceId};
use crate::lifecycle::{CommandOutcome, CommandRunner, InstanceController};
use crate::observability::{log_event, Counter, Event, ObservationScope};
use crate::promotion::{write_standby_config, StandbySettings};

use super::plan::SyncPlan;

/// How the replica's data was brought back in line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPath {
    Rewind,
    FullResync,
}

impl SyncPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPath::Rewind => "rewind",
            SyncPath::FullResync => "full_resync",
        }
    }
}

/// Result of a successful rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    /// The replica as persisted after the rebuild
    pub instance: Instance,
    pub master: InstanceId,
    pub path: SyncPath,
}

/// Rebuilds replicas from their primaries.
pub struct RebuildEngine<'a> {
    runner: CommandRunner<'a>,
    standby: &'a StandbySettings,
    settle: Duration,
}

impl<'a> RebuildEngine<'a> {
    pub fn new(runner: CommandRunner<'a>, standby: &'a StandbySettings, settle: Duration) -> Self {
        Self {
            runner,
            standby,
            settle,
        }
    }

    /// Rebuild `instance` from the master it currently follows.
    pub fn rebuild(&self, instance: Instance) -> OrchestratorResult<RebuildReport> {
        let scope = ObservationScope::begin("REBUILD", &[("instance", instance.id.to_string())]);

        match self.run(instance) {
            Ok(report) => {
                scope.complete(&[
                    ("master", &report.master.to_string()),
                    ("path", report.path.as_str()),
                ]);
                Ok(report)
            }
            Err(e) => {
                scope.fail(&e.to_string());
                Err(e)
            }
        }
    }

    fn run(&self, instance: Instance) -> OrchestratorResult<RebuildReport> {
        let master = self.master_of(&instance)?;
        let controller = InstanceController::new(self.runner);

        let instance = controller
            .stop(instance)
            .map_err(|e| e.during("stop replica"))?;

        let path = if self.rewind(&instance, &master)? {
            SyncPath::Rewind
        } else {
            self.full_resync(&instance, &master)?;
            SyncPath::FullResync
        };

        write_standby_config(&self.runner, self.standby, &instance)?;

        let mut instance = controller
            .start(instance)
            .map_err(|e| e.during("start replica"))?;
        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }

        instance.version = master.version.clone();
        self.runner.save(&instance)?;
        self.runner.metrics().increment(Counter::Rebuilds);

        Ok(RebuildReport {
            instance,
            master: master.id,
            path,
        })
    }

    /// Load and check the upstream of a replica.
    fn master_of(&self, instance: &Instance) -> OrchestratorResult<Instance> {
        let master_id = instance.master.ok_or_else(|| {
            OrchestratorError::precondition("instance has no master to rebuild from")
                .for_instance(instance.id)
        })?;

        let master = self.runner.inventory().instance(master_id).map_err(|e| {
            OrchestratorError::precondition(format!("master {} unavailable: {}", master_id, e))
                .for_instance(instance.id)
        })?;

        if master.herd_id != instance.herd_id {
            return Err(OrchestratorError::precondition(format!(
                "master {} belongs to herd {}, not herd {}",
                master.id, master.herd_id, instance.herd_id
            ))
            .for_instance(instance.id));
        }
        Ok(master)
    }

    /// Incremental fast path. `Ok(false)` means fall back to a full copy.
    ///
    /// Only a failed command falls back; an unreachable replica aborts.
    fn rewind(&self, instance: &Instance, master: &Instance) -> OrchestratorResult<bool> {
        let source_host = self.runner.placement(master)?.host;
        let id = instance.id.to_string();

        match self
            .runner
            .run("rewind", instance, &[("source_host", source_host)])
        {
            Ok(CommandOutcome::Completed(_)) => {
                self.runner.metrics().increment(Counter::RewindsSucceeded);
                log_event(Event::RewindComplete, &[("instance", &id)]);
                Ok(true)
            }
            Ok(_) => Ok(false),
            Err(e) if classify(&e) == Disposition::ConnectionError => Err(e.during("rewind")),
            Err(e) => {
                self.runner.metrics().increment(Counter::RewindsFailed);
                log_event(
                    Event::RewindFailed,
                    &[("instance", &id), ("reason", &e.message)],
                );
                Ok(false)
            }
        }
    }

    fn full_resync(&self, instance: &Instance, master: &Instance) -> OrchestratorResult<()> {
        let replica_ctx = self.runner.context(instance)?;
        let source_ctx = self.runner.context(master)?;
        let plan = SyncPlan::build(
            self.runner.templates(),
            &replica_ctx,
            &source_ctx,
            &self.standby.file_name,
        )
        .ok_or_else(|| {
            OrchestratorError::configuration("no sync command configured for full resync")
                .for_instance(instance.id)
        })?;

        self.runner
            .run_tolerating(
                "backup_start",
                master,
                &[],
                &[BenignReason::BackupInProgress],
            )
            .map_err(|e| e.during("enter backup mode"))?;
        log_event(
            Event::BackupModeEntered,
            &[("instance", &master.id.to_string())],
        );

        if let Err(e) = self.runner.execute(&replica_ctx.host, &plan.bulk) {
            // Never leave the primary in backup mode behind a failed copy.
            if let Err(release) = self.leave_backup_mode(master) {
                log_event(
                    Event::BackupModeStuck,
                    &[
                        ("instance", &master.id.to_string()),
                        ("reason", &release.message),
                    ],
                );
            }
            return Err(OrchestratorError::sync(format!("bulk copy failed: {}", e.message))
                .for_instance(instance.id));
        }

        self.leave_backup_mode(master)
            .map_err(|e| e.during("leave backup mode"))?;

        let trailing = std::iter::once(&plan.wal).chain(plan.config.iter());
        for command in trailing {
            self.runner
                .execute(&replica_ctx.host, command)
                .map_err(|e| {
                    OrchestratorError::sync(format!("copy failed: {}", e.message))
                        .for_instance(instance.id)
                })?;
        }

        self.runner.metrics().increment(Counter::FullResyncs);
        Ok(())
    }

    fn leave_backup_mode(&self, master: &Instance) -> OrchestratorResult<()> {
        self.runner.run_tolerating(
            "backup_stop",
            master,
            &[],
            &[BenignReason::NoBackupInProgress],
        )?;
        log_event(
            Event::BackupModeLeft,
            &[("instance", &master.id.to_string())],
        );
        Ok(())
    }
}
