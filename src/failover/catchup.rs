//! Catch-up wait between stopping a primary and promoting its replica
//!
//! When the primary's final position is known, the replica's replay position
//! is polled until it reaches that target or the bound expires. Without a
//! target there is nothing to compare against and a fixed settle interval is
//! used instead.

use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::FailoverConfig;
use crate::inventory::Lsn;

/// How the wait ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CatchUp {
    /// Replica replayed everything the primary wrote
    Reached { target: Lsn, replayed: Lsn },
    /// Bound expired first; `replayed` is the last observation
    TimedOut { target: Lsn, replayed: Option<Lsn> },
    /// No target measured; waited the fixed interval
    Settled { waited_ms: u64 },
}

impl CatchUp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatchUp::Reached { .. } => "reached",
            CatchUp::TimedOut { .. } => "timed_out",
            CatchUp::Settled { .. } => "settled",
        }
    }

    /// Last replay position observed, if any.
    pub fn replayed(&self) -> Option<Lsn> {
        match self {
            CatchUp::Reached { replayed, .. } => Some(*replayed),
            CatchUp::TimedOut { replayed, .. } => *replayed,
            CatchUp::Settled { .. } => None,
        }
    }
}

/// Poll-and-verify wait with a settle fallback.
#[derive(Debug, Clone, Copy)]
pub struct CatchUpWait {
    timeout: Duration,
    poll_interval: Duration,
    settle: Duration,
}

impl CatchUpWait {
    pub fn new(timeout: Duration, poll_interval: Duration, settle: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
            settle,
        }
    }

    /// Wait until `read_replay` reports a position at or past `target`.
    ///
    /// `read_replay` returns `None` when the replay position cannot be read; the
    /// wait keeps polling until the bound.
    pub fn wait<F>(&self, target: Option<Lsn>, mut read_replay: F) -> CatchUp
    where
        F: FnMut() -> Option<Lsn>,
    {
        let Some(target) = target else {
            if !self.settle.is_zero() {
                thread::sleep(self.settle);
            }
            return CatchUp::Settled {
                waited_ms: self.settle.as_millis() as u64,
            };
        };

        let deadline = Instant::now() + self.timeout;
        let mut replayed = None;
        loop {
            if let Some(observed) = read_replay() {
                replayed = Some(observed);
                if observed >= target {
                    return CatchUp::Reached {
                        target,
                        replayed: observed,
                    };
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return CatchUp::TimedOut { target, replayed };
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }
}

impl From<&FailoverConfig> for CatchUpWait {
    fn from(config: &FailoverConfig) -> Self {
        Self::new(
            config.catchup_timeout(),
            config.poll_interval(),
            config.settle(),
        )
    }
}
