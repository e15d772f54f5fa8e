//! DR Failover Tests
//!
//! Herd 1: P (instance 1, db1) primary; R (2, db2) and S (3, db3) replicas.
//! Failing over to R must:
//! - stop P and record it as R's replica
//! - promote R
//! - move the vhost to R's host
//! - repoint S with a reload, not a rebuild
//! - refuse to start when the vhost cannot be moved

mod common;

use std::sync::Arc;

use common::{quick_config, Herdsman};
use herdsman::config::DnsConfig;
use herdsman::failover::{CatchUp, DnsRequest, NsupdateDns};
use herdsman::orchestrator::Orchestrator;
use herdsman::inventory::{HerdId, InstanceId, Inventory, Lsn};
use herdsman::topology::{herd_health, HerdHealth};

const PRIMARY_LSN: &str = "0/3000060";

fn caught_up_herd() -> Herdsman {
    let h = Herdsman::herd(3);
    h.channel.respond("pg_current_wal_lsn", PRIMARY_LSN);
    h.channel.respond("pg_last_wal_replay_lsn", PRIMARY_LSN);
    h
}

#[test]
fn test_failover_end_to_end() {
    let h = caught_up_herd();

    let report = h.orchestrator.failover(HerdId(1), InstanceId(2)).unwrap();

    assert_eq!(report.old_primary, InstanceId(1));
    assert_eq!(report.new_primary, InstanceId(2));
    assert_eq!(report.new_host, "db2");
    assert!(matches!(report.catch_up, CatchUp::Reached { .. }));
    assert!(report.stranded().is_empty());

    // P stopped and following R
    let p = h.get(1);
    assert!(!p.is_online);
    assert_eq!(p.master, Some(InstanceId(2)));
    assert_eq!(h.hosts_running("orders stop"), vec!["db1"]);

    // R promoted
    assert!(h.get(2).is_primary());
    assert_eq!(h.hosts_running("orders promote"), vec!["db2"]);

    // vhost moved
    assert_eq!(
        h.dns.requests(),
        vec![DnsRequest {
            vhost: "orders-db".into(),
            target: "db2".into(),
        }]
    );

    // S repointed by reload only
    assert_eq!(h.get(3).master, Some(InstanceId(2)));
    assert_eq!(h.hosts_running("orders reload"), vec!["db3"]);
    assert!(h.channel.commands_matching("pg_rewind").is_empty());
    assert!(h.channel.commands_matching("rsync").is_empty());

    let members = h.inventory.members(HerdId(1)).unwrap();
    assert_eq!(herd_health(&members), HerdHealth::Consistent(InstanceId(2)));
    assert_eq!(h.orchestrator.metrics().failovers, 1);
}

#[test]
fn test_failover_order_of_steps() {
    let h = caught_up_herd();

    h.orchestrator.failover(HerdId(1), InstanceId(2)).unwrap();

    let commands = h.channel.commands();
    let position = |pattern: &str| commands.iter().position(|c| c.contains(pattern)).unwrap();
    assert!(position("pg_current_wal_lsn") < position("stop -m fast"));
    assert!(position("stop -m fast") < position("pg_last_wal_replay_lsn"));
    assert!(position("pg_last_wal_replay_lsn") < position("promote"));
    assert!(position("promote") < position("reload"));
}

#[test]
fn test_final_position_recorded_on_old_primary() {
    let h = caught_up_herd();

    h.orchestrator.failover(HerdId(1), InstanceId(2)).unwrap();

    let expected: Lsn = PRIMARY_LSN.parse().unwrap();
    assert_eq!(h.get(1).xlog_pos, Some(expected));
    assert_eq!(h.get(2).xlog_pos, Some(expected));
}

#[test]
fn test_catch_up_timeout_is_not_fatal() {
    let h = Herdsman::herd(2);
    h.channel.respond("pg_current_wal_lsn", PRIMARY_LSN);
    h.channel.respond("pg_last_wal_replay_lsn", "0/2FFFFFF");

    let report = h.orchestrator.failover(HerdId(1), InstanceId(2)).unwrap();

    assert!(matches!(report.catch_up, CatchUp::TimedOut { .. }));
    assert!(h.get(2).is_primary());
}

#[test]
fn test_unmeasured_primary_waits_settle_interval() {
    let mut config = quick_config();
    config.failover.settle_ms = 5;
    let h = Herdsman::herd_with(2, config);

    let report = h.orchestrator.failover(HerdId(1), InstanceId(2)).unwrap();

    assert_eq!(report.catch_up, CatchUp::Settled { waited_ms: 5 });
    assert!(h.channel.commands_matching("pg_last_wal_replay_lsn").is_empty());
}

#[test]
fn test_follower_failure_does_not_abort() {
    let h = Herdsman::herd(4);
    h.channel.fail_on("db3", "orders reload", "pg_ctl: could not send reload signal");

    let report = h.orchestrator.failover(HerdId(1), InstanceId(2)).unwrap();

    assert_eq!(report.stranded(), vec![InstanceId(3)]);
    assert_eq!(h.get(3).master, Some(InstanceId(1)));
    assert_eq!(h.get(4).master, Some(InstanceId(2)));
    assert!(h.get(2).is_primary());
}

#[test]
fn test_target_must_follow_primary() {
    let h = Herdsman::herd(3);
    h.edit(3, |i| i.master = Some(InstanceId(2)));

    let err = h.orchestrator.failover(HerdId(1), InstanceId(3)).unwrap_err();

    assert_eq!(err.code(), "HERD_PRECONDITION_FAILED");
    assert!(h.channel.calls().is_empty());
    assert!(h.dns.requests().is_empty());
}

#[test]
fn test_failover_without_dns_rejected_before_any_step() {
    let h = caught_up_herd();
    let orchestrator = Orchestrator::new(
        quick_config(),
        h.channel.clone(),
        h.inventory.clone(),
        Arc::new(NsupdateDns::new(h.channel.clone(), DnsConfig::default())),
    );

    let err = orchestrator.failover(HerdId(1), InstanceId(2)).unwrap_err();

    assert_eq!(err.code(), "HERD_CONFIG_ERROR");
    assert!(h.channel.calls().is_empty());
    assert!(h.get(1).is_primary());
    assert!(h.get(1).is_online);
    assert_eq!(h.get(3).master, Some(InstanceId(1)));
}

#[test]
fn test_dns_failure_surfaces_after_promotion() {
    let h = caught_up_herd();
    h.dns.fail_with("update failed: REFUSED");

    let err = h.orchestrator.failover(HerdId(1), InstanceId(2)).unwrap_err();

    assert_eq!(err.code(), "HERD_DNS_ERROR");
    assert!(err.message.contains("repoint vhost"));
    // promotion already happened and is not rolled back
    assert!(h.get(2).is_primary());
    assert_eq!(h.get(1).master, Some(InstanceId(2)));
    // followers are not touched after the failure
    assert_eq!(h.get(3).master, Some(InstanceId(1)));
}

#[test]
fn test_failover_while_member_busy() {
    let h = caught_up_herd();
    let _guard = h
        .orchestrator
        .locks()
        .lock_instance(HerdId(1), InstanceId(3))
        .unwrap();

    let err = h.orchestrator.failover(HerdId(1), InstanceId(2)).unwrap_err();

    assert_eq!(err.code(), "HERD_BUSY");
    assert!(h.channel.calls().is_empty());
}

// =============================================================================
// DR pair observation
// =============================================================================

#[test]
fn test_status_reports_dr_pair_lag() {
    let h = Herdsman::herd(3);
    h.channel.respond("pg_current_wal_lsn", "0/3000060");
    h.channel.respond("pg_last_wal_replay_lsn", "0/3000000");

    let status = h.orchestrator.status(HerdId(1)).unwrap();

    assert_eq!(status.health, HerdHealth::Consistent(InstanceId(1)));
    let pair = status.dr_pair.unwrap();
    assert_eq!(pair.primary, InstanceId(1));
    assert_eq!(pair.secondary, InstanceId(2));
    assert_eq!(pair.secondary_host, "db2");
    assert_eq!(pair.lag_bytes, Some(96));
    assert_eq!(pair.vhost, "orders-db");
    // measured positions are persisted
    assert!(status.members[0].xlog_pos.is_some());
    assert!(status.members[1].xlog_pos.is_some());
    assert!(status.members[2].xlog_pos.is_none());
}

#[test]
fn test_status_without_replicas_explains_missing_pair() {
    let h = Herdsman::herd(1);

    let status = h.orchestrator.status(HerdId(1)).unwrap();

    assert!(status.dr_pair.is_none());
    assert!(status.dr_error.unwrap().contains("no replica"));
}

#[test]
fn test_status_waits_for_herd_operation() {
    let h = caught_up_herd();
    let _guard = h
        .orchestrator
        .locks()
        .lock_herd(HerdId(1), &[InstanceId(1), InstanceId(2), InstanceId(3)])
        .unwrap();

    let err = h.orchestrator.status(HerdId(1)).unwrap_err();

    assert_eq!(err.code(), "HERD_BUSY");
    assert!(h.channel.calls().is_empty());
    assert!(h.get(1).xlog_pos.is_none());
}

#[test]
fn test_status_keeps_roles_recorded_since_load() {
    let h = caught_up_herd();
    h.orchestrator.status(HerdId(1)).unwrap();
    h.orchestrator.failover(HerdId(1), InstanceId(2)).unwrap();

    let status = h.orchestrator.status(HerdId(1)).unwrap();

    assert_eq!(status.health, HerdHealth::Consistent(InstanceId(2)));
    assert_eq!(h.get(1).master, Some(InstanceId(2)));
}
