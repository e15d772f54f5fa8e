//! Primary resolution over herd members

use serde::Serialize;

use crate::inventory::{Instance, InstanceId};
use crate::observability::{log_event, Event};

/// Consistency of a herd's primary assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "instances", rename_all = "snake_case")]
pub enum HerdHealth {
    /// Exactly one primary
    Consistent(InstanceId),
    /// Every member follows someone
    NoPrimary,
    /// More than one member claims to be primary
    MultiplePrimaries(Vec<InstanceId>),
}

impl HerdHealth {
    pub fn is_consistent(&self) -> bool {
        matches!(self, HerdHealth::Consistent(_))
    }
}

/// Members following `id`.
pub fn replicas_of(members: &[Instance], id: InstanceId) -> Vec<&Instance> {
    members.iter().filter(|m| m.master == Some(id)).collect()
}

/// Pick the herd's primary.
///
/// Candidates are members without an upstream, minus `excluding`. The one
/// with the most followers wins; remaining ties go to the lowest id.
pub fn resolve_primary(members: &[Instance], excluding: Option<InstanceId>) -> Option<&Instance> {
    let candidates: Vec<&Instance> = members
        .iter()
        .filter(|m| m.is_primary() && Some(m.id) != excluding)
        .collect();

    if candidates.len() > 1 {
        let ids = join_ids(candidates.iter().map(|c| c.id));
        log_event(Event::HerdSplitPrimary, &[("candidates", &ids)]);
    }

    candidates
        .into_iter()
        .max_by(|a, b| {
            let followers_a = replicas_of(members, a.id).len();
            let followers_b = replicas_of(members, b.id).len();
            followers_a.cmp(&followers_b).then(b.id.cmp(&a.id))
        })
}

/// Classify the herd's primary assignment.
pub fn herd_health(members: &[Instance]) -> HerdHealth {
    let primaries: Vec<InstanceId> = members
        .iter()
        .filter(|m| m.is_primary())
        .map(|m| m.id)
        .collect();

    match primaries.as_slice() {
        [] => {
            if !members.is_empty() {
                log_event(
                    Event::HerdWithoutPrimary,
                    &[("members", &join_ids(members.iter().map(|m| m.id)))],
                );
            }
            HerdHealth::NoPrimary
        }
        [only] => HerdHealth::Consistent(*only),
        _ => HerdHealth::MultiplePrimaries(primaries),
    }
}

/// The follower of `primary` best placed to take over: furthest replication
/// position first, then lowest id. Unmeasured positions rank last.
pub fn designated_secondary(members: &[Instance], primary: InstanceId) -> Option<&Instance> {
    replicas_of(members, primary)
        .into_iter()
        .max_by(|a, b| a.xlog_pos.cmp(&b.xlog_pos).then(b.id.cmp(&a.id)))
}

fn join_ids(ids: impl Iterator<Item = InstanceId>) -> String {
    ids.map(|id| id.to_string()).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{HerdId, Lsn, ServerId};

    fn member(id: u64, master: Option<u64>) -> Instance {
        let mut m = Instance::new(InstanceId(id), HerdId(1), ServerId(id));
        m.master = master.map(InstanceId);
        m
    }

    #[test]
    fn test_single_primary() {
        let members = vec![member(1, None), member(2, Some(1)), member(3, Some(1))];
        assert_eq!(resolve_primary(&members, None).map(|m| m.id), Some(InstanceId(1)));
        assert_eq!(herd_health(&members), HerdHealth::Consistent(InstanceId(1)));
    }

    #[test]
    fn test_most_followers_wins() {
        let members = vec![
            member(1, None),
            member(2, None),
            member(3, Some(2)),
            member(4, Some(2)),
            member(5, Some(1)),
        ];
        assert_eq!(resolve_primary(&members, None).map(|m| m.id), Some(InstanceId(2)));
        assert_eq!(
            herd_health(&members),
            HerdHealth::MultiplePrimaries(vec![InstanceId(1), InstanceId(2)])
        );
    }

    #[test]
    fn test_tie_goes_to_lowest_id() {
        let members = vec![member(4, None), member(2, None), member(9, None)];
        assert_eq!(resolve_primary(&members, None).map(|m| m.id), Some(InstanceId(2)));
    }

    #[test]
    fn test_excluding_only_primary() {
        let members = vec![member(1, None), member(2, Some(1))];
        assert!(resolve_primary(&members, Some(InstanceId(1))).is_none());
    }

    #[test]
    fn test_no_primary() {
        let members = vec![member(1, Some(2)), member(2, Some(1))];
        assert_eq!(herd_health(&members), HerdHealth::NoPrimary);
        assert!(resolve_primary(&members, None).is_none());
    }

    #[test]
    fn test_designated_secondary_prefers_furthest() {
        let mut a = member(2, Some(1));
        a.xlog_pos = Some(Lsn(100));
        let mut b = member(3, Some(1));
        b.xlog_pos = Some(Lsn(200));
        let c = member(4, Some(1));
        let members = vec![member(1, None), a, b, c];

        assert_eq!(
            designated_secondary(&members, InstanceId(1)).map(|m| m.id),
            Some(InstanceId(3))
        );
        assert!(designated_secondary(&members, InstanceId(3)).is_none());
    }

    #[test]
    fn test_designated_secondary_tie_lowest_id() {
        let members = vec![member(1, None), member(5, Some(1)), member(3, Some(1))];
        assert_eq!(
            designated_secondary(&members, InstanceId(1)).map(|m| m.id),
            Some(InstanceId(3))
        );
    }
}
