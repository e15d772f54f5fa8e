//! DR Failover Coordinator
//!
//! Swaps a herd's primary ("sage") with one of its replicas ("newb"):
//!
//! 0. Record sage's final position while it is still up (best effort)
//! 1. Stop sage
//! 2. Wait for newb to replay up to that position
//! 3. Promote newb
//! 4. Record sage as a replica of newb
//! 5. Move the vhost to newb's host
//! 6. Re-point every other follower of sage at newb
//!
//! Steps 1 to 5 abort the failover on error and the error names the step.
//! Step 6 records per-follower results and always runs to the end. Sage is
//! left stopped; it needs a rebuild before it can stream from newb.

use std::time::Duration;

use serde::Serialize;

use crate::config::FailoverConfig;
use crate::errors::{OrchestratorError, OrchestratorResult};
use crate::inventory::{DrPair, HerdId, Instance, InstanceId, Lsn};
use crate::lifecycle::{CommandOutcome, CommandRunner, InstanceController};
use crate::observability::{log_event, Counter, Event, ObservationScope};
use crate::promotion::{RoleTransition, StandbySettings};
use crate::topology::{designated_secondary, replicas_of, resolve_primary};

use super::catchup::{CatchUp, CatchUpWait};
use super::dns::DnsUpdater;

/// Result of re-pointing one follower.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FollowerOutcome {
    pub instance: InstanceId,
    pub repointed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a completed failover.
#[derive(Debug, Clone, Serialize)]
pub struct FailoverReport {
    pub herd: HerdId,
    pub old_primary: InstanceId,
    pub new_primary: InstanceId,
    pub vhost: String,
    pub new_host: String,
    pub catch_up: CatchUp,
    pub followers: Vec<FollowerOutcome>,
}

impl FailoverReport {
    /// Followers that still point at the old primary.
    pub fn stranded(&self) -> Vec<InstanceId> {
        self.followers
            .iter()
            .filter(|f| !f.repointed)
            .map(|f| f.instance)
            .collect()
    }
}

/// Runs site failovers and DR pair observation.
pub struct FailoverCoordinator<'a> {
    runner: CommandRunner<'a>,
    standby: &'a StandbySettings,
    dns: &'a dyn DnsUpdater,
    settings: &'a FailoverConfig,
    rebuild_settle: Duration,
}

impl<'a> FailoverCoordinator<'a> {
    pub fn new(
        runner: CommandRunner<'a>,
        standby: &'a StandbySettings,
        dns: &'a dyn DnsUpdater,
        settings: &'a FailoverConfig,
        rebuild_settle: Duration,
    ) -> Self {
        Self {
            runner,
            standby,
            dns,
            settings,
            rebuild_settle,
        }
    }

    /// Fail `herd` over to `newb`.
    pub fn failover(&self, herd: HerdId, newb: InstanceId) -> OrchestratorResult<FailoverReport> {
        let scope = ObservationScope::begin(
            "FAILOVER",
            &[("herd", herd.to_string()), ("target", newb.to_string())],
        );

        match self.run(herd, newb) {
            Ok(report) => {
                let stranded = report.stranded().len().to_string();
                scope.complete(&[
                    ("catch_up", report.catch_up.as_str()),
                    ("old_primary", &report.old_primary.to_string()),
                    ("stranded_followers", &stranded),
                ]);
                Ok(report)
            }
            Err(e) => {
                scope.fail(&e.to_string());
                Err(e)
            }
        }
    }

    fn run(&self, herd_id: HerdId, newb_id: InstanceId) -> OrchestratorResult<FailoverReport> {
        let herd = self.runner.inventory().herd(herd_id)?;
        let members = self.runner.inventory().members(herd_id)?;

        let sage = resolve_primary(&members, None).cloned().ok_or_else(|| {
            OrchestratorError::precondition(format!("herd {} has no primary", herd_id))
        })?;
        let newb = members
            .iter()
            .find(|m| m.id == newb_id)
            .cloned()
            .ok_or_else(|| {
                OrchestratorError::precondition(format!(
                    "instance {} is not a member of herd {}",
                    newb_id, herd_id
                ))
            })?;
        if newb.master != Some(sage.id) {
            return Err(OrchestratorError::precondition(format!(
                "instance {} does not follow primary {}",
                newb.id, sage.id
            ))
            .for_instance(newb.id));
        }

        let new_host = self.runner.placement(&newb)?.host;
        self.dns.check(&herd.vhost, &new_host)?;

        let controller = InstanceController::new(self.runner);
        let transition =
            RoleTransition::new(self.runner, self.standby, self.rebuild_settle);

        // 0. final position
        let mut sage = sage;
        let target = if sage.is_online {
            self.measure("position", &sage)
        } else {
            None
        };
        if let Some(position) = target {
            sage.advance_position(position);
        }

        // 1. stop primary
        let mut sage = controller
            .stop(sage)
            .map_err(|e| e.during("stop primary"))?;

        // 2. catch-up
        let catch_up = CatchUpWait::from(self.settings)
            .wait(target, || self.measure("replay_position", &newb));
        let event = match catch_up {
            CatchUp::TimedOut { .. } => Event::CatchUpTimeout,
            _ => Event::CatchUpReached,
        };
        log_event(
            event,
            &[
                ("instance", &newb.id.to_string()),
                ("outcome", catch_up.as_str()),
            ],
        );
        let mut newb = newb;
        if let Some(replayed) = catch_up.replayed() {
            newb.advance_position(replayed);
        }

        // 3. promote replica
        let newb = transition
            .promote(newb)
            .map_err(|e| e.during("promote replica"))?;

        // 4. old primary follows the new one
        sage.master = Some(newb.id);
        self.runner
            .save(&sage)
            .map_err(|e| e.during("record old primary as replica"))?;

        // 5. move the vhost
        self.dns
            .repoint(&herd.vhost, &new_host)
            .map_err(|e| e.during("repoint vhost"))?;
        log_event(
            Event::VhostRepointed,
            &[("target", &new_host), ("vhost", &herd.vhost)],
        );

        // 6. siblings
        let followers = replicas_of(&members, sage.id)
            .into_iter()
            .filter(|f| f.id != newb.id)
            .map(|follower| match transition.remaster(follower.clone(), &newb) {
                Ok(_) => FollowerOutcome {
                    instance: follower.id,
                    repointed: true,
                    error: None,
                },
                Err(e) => {
                    log_event(
                        Event::FollowerRepointFailed,
                        &[
                            ("instance", &follower.id.to_string()),
                            ("reason", &e.message),
                        ],
                    );
                    FollowerOutcome {
                        instance: follower.id,
                        repointed: false,
                        error: Some(e.to_string()),
                    }
                }
            })
            .collect();

        self.runner.metrics().increment(Counter::Failovers);
        Ok(FailoverReport {
            herd: herd_id,
            old_primary: sage.id,
            new_primary: newb.id,
            vhost: herd.vhost,
            new_host,
            catch_up,
            followers,
        })
    }

    /// Measure the herd's primary and its designated secondary, persist the
    /// advanced positions and report the lag between them.
    pub fn observe_dr_pair(&self, herd_id: HerdId) -> OrchestratorResult<DrPair> {
        let herd = self.runner.inventory().herd(herd_id)?;
        let members = self.runner.inventory().members(herd_id)?;

        let primary = resolve_primary(&members, None).cloned().ok_or_else(|| {
            OrchestratorError::precondition(format!("herd {} has no primary", herd_id))
        })?;
        let secondary = designated_secondary(&members, primary.id)
            .cloned()
            .ok_or_else(|| {
                OrchestratorError::precondition(format!(
                    "primary {} has no replica to pair with",
                    primary.id
                ))
            })?;

        let primary_id = primary.id;
        let primary_pos = self.observe(primary, "position")?;
        let secondary_pos = self.observe(secondary.clone(), "replay_position")?;
        let lag_bytes = match (primary_pos, secondary_pos) {
            (Some(p), Some(s)) => Some(s.lag_behind(p)),
            _ => None,
        };

        Ok(DrPair {
            herd: herd_id,
            primary: primary_id,
            secondary: secondary.id,
            secondary_host: self.runner.placement(&secondary)?.host,
            lag_bytes,
            vhost: herd.vhost,
        })
    }

    /// Measure one instance and persist a forward move.
    ///
    /// Only the position changes; the rest of the stored record is kept.
    fn observe(&self, instance: Instance, action: &str) -> OrchestratorResult<Option<Lsn>> {
        if !instance.is_online {
            return Ok(None);
        }
        let position = self.measure(action, &instance);
        if let Some(p) = position {
            let mut current = self.runner.inventory().instance(instance.id)?;
            if current.advance_position(p) {
                self.runner.save(&current)?;
            }
        }
        Ok(position)
    }

    /// Best-effort position read; any failure reads as "unknown".
    fn measure(&self, action: &str, instance: &Instance) -> Option<Lsn> {
        match self.runner.run(action, instance, &[]) {
            Ok(CommandOutcome::Completed(out)) => Lsn::parse_output(&out).ok(),
            _ => None,
        }
    }
}
