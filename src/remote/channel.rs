//! Remote channel trait and the recording implementation

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;

use super::errors::{RemoteError, RemoteResult};

/// Authenticated command execution and file delivery to a named host.
///
/// The channel is stateless between calls; every side effect happens on the
/// remote host.
pub trait RemoteChannel: Send + Sync {
    /// Run a command line on `host` and return its standard output.
    ///
    /// Fails when the process exits non-zero or writes anything to stderr.
    fn execute(&self, host: &str, command: &str) -> RemoteResult<String>;

    /// Write `content` to `remote_path` on `host`, replacing any existing file.
    fn transfer(&self, host: &str, content: &str, remote_path: &str) -> RemoteResult<()>;
}

/// One call observed by a `RecordingChannel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum RemoteCall {
    Execute {
        host: String,
        command: String,
    },
    Transfer {
        host: String,
        path: String,
        content: String,
    },
}

impl RemoteCall {
    pub fn host(&self) -> &str {
        match self {
            Self::Execute { host, .. } | Self::Transfer { host, .. } => host,
        }
    }
}

#[derive(Debug)]
enum Response {
    Output(VecDeque<String>),
    Fail(String),
    Unreachable(String),
}

enum Failure {
    Diagnostics(String),
    Unreachable(String),
}

#[derive(Debug)]
struct Rule {
    pattern: String,
    host: Option<String>,
    response: Response,
    remaining: Option<usize>,
}

impl Rule {
    fn matches(&self, host: &str, subject: &str) -> bool {
        self.remaining != Some(0)
            && self.host.as_deref().map_or(true, |h| h == host)
            && subject.contains(&self.pattern)
    }
}

/// A channel that performs nothing and records every call.
///
/// Commands succeed with empty output unless a rule says otherwise. Rules
/// match on a substring of the command (or of the path, for transfers);
/// the most recently added matching rule wins. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    calls: Mutex<Vec<RemoteCall>>,
    rules: Mutex<Vec<Rule>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_rule(&self, rule: Rule) {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(rule);
        }
    }

    /// Answer commands containing `pattern` with `stdout`.
    pub fn respond(&self, pattern: &str, stdout: &str) {
        self.respond_sequence(pattern, &[stdout]);
    }

    /// Answer successive matching commands with successive outputs; the last
    /// output repeats once the sequence is exhausted.
    pub fn respond_sequence(&self, pattern: &str, outputs: &[&str]) {
        self.add_rule(Rule {
            pattern: pattern.to_string(),
            host: None,
            response: Response::Output(outputs.iter().map(|s| s.to_string()).collect()),
            remaining: None,
        });
    }

    /// Fail every command (or transfer path) containing `pattern`.
    pub fn fail(&self, pattern: &str, stderr: &str) {
        self.add_rule(Rule {
            pattern: pattern.to_string(),
            host: None,
            response: Response::Fail(stderr.to_string()),
            remaining: None,
        });
    }

    /// Fail matching commands on one host only.
    pub fn fail_on(&self, host: &str, pattern: &str, stderr: &str) {
        self.add_rule(Rule {
            pattern: pattern.to_string(),
            host: Some(host.to_string()),
            response: Response::Fail(stderr.to_string()),
            remaining: None,
        });
    }

    /// Fail the next matching command only.
    pub fn fail_once(&self, pattern: &str, stderr: &str) {
        self.add_rule(Rule {
            pattern: pattern.to_string(),
            host: None,
            response: Response::Fail(stderr.to_string()),
            remaining: Some(1),
        });
    }

    /// Treat `host` as unreachable.
    pub fn unreachable(&self, host: &str) {
        self.unreachable_because(host, "no route to host");
    }

    /// Treat `host` as unreachable, reporting `reason`.
    pub fn unreachable_because(&self, host: &str, reason: &str) {
        self.add_rule(Rule {
            pattern: String::new(),
            host: Some(host.to_string()),
            response: Response::Unreachable(reason.to_string()),
            remaining: None,
        });
    }

    /// Every call in the order it was made.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Every executed command line, in order.
    pub fn commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RemoteCall::Execute { command, .. } => Some(command),
                RemoteCall::Transfer { .. } => None,
            })
            .collect()
    }

    /// Executed commands containing `pattern`.
    pub fn commands_matching(&self, pattern: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.contains(pattern))
            .collect()
    }

    /// Every transfer as `(host, path, content)`.
    pub fn transfers(&self) -> Vec<(String, String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RemoteCall::Transfer {
                    host,
                    path,
                    content,
                } => Some((host, path, content)),
                RemoteCall::Execute { .. } => None,
            })
            .collect()
    }

    /// Forget recorded calls; rules stay in place.
    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    fn record(&self, call: RemoteCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn answer(&self, host: &str, subject: &str) -> Option<Result<String, Failure>> {
        let mut rules = self.rules.lock().ok()?;
        let rule = rules.iter_mut().rev().find(|r| r.matches(host, subject))?;
        if let Some(n) = rule.remaining.as_mut() {
            *n -= 1;
        }
        Some(match &mut rule.response {
            Response::Output(outputs) => {
                let out = if outputs.len() > 1 {
                    outputs.pop_front().unwrap_or_default()
                } else {
                    outputs.front().cloned().unwrap_or_default()
                };
                Ok(out)
            }
            Response::Fail(stderr) => Err(Failure::Diagnostics(stderr.clone())),
            Response::Unreachable(reason) => Err(Failure::Unreachable(reason.clone())),
        })
    }
}

impl RemoteChannel for RecordingChannel {
    fn execute(&self, host: &str, command: &str) -> RemoteResult<String> {
        self.record(RemoteCall::Execute {
            host: host.to_string(),
            command: command.to_string(),
        });

        match self.answer(host, command) {
            None => Ok(String::new()),
            Some(Ok(stdout)) => Ok(stdout),
            Some(Err(Failure::Diagnostics(stderr))) => Err(RemoteError::Command {
                host: host.to_string(),
                command: command.to_string(),
                status: Some(1),
                stderr,
            }),
            Some(Err(Failure::Unreachable(reason))) => Err(RemoteError::Connection {
                host: host.to_string(),
                reason,
            }),
        }
    }

    fn transfer(&self, host: &str, content: &str, remote_path: &str) -> RemoteResult<()> {
        self.record(RemoteCall::Transfer {
            host: host.to_string(),
            path: remote_path.to_string(),
            content: content.to_string(),
        });

        match self.answer(host, remote_path) {
            None | Some(Ok(_)) => Ok(()),
            Some(Err(Failure::Diagnostics(reason))) => Err(RemoteError::Transfer {
                host: host.to_string(),
                path: remote_path.to_string(),
                reason,
            }),
            Some(Err(Failure::Unreachable(reason))) => Err(RemoteError::Connection {
                host: host.to_string(),
                reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_in_order() {
        let channel = RecordingChannel::new();
        channel.execute("a", "uptime").unwrap();
        channel.transfer("b", "x = 1\n", "/tmp/x.conf").unwrap();

        let calls = channel.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].host(), "a");
        assert_eq!(channel.commands(), vec!["uptime".to_string()]);
        assert_eq!(channel.transfers()[0].1, "/tmp/x.conf");
    }

    #[test]
    fn test_latest_rule_wins() {
        let channel = RecordingChannel::new();
        channel.respond("psql", "first");
        channel.respond("psql", "second");
        assert_eq!(channel.execute("a", "psql -c 1").unwrap(), "second");
    }

    #[test]
    fn test_fail_once_then_succeed() {
        let channel = RecordingChannel::new();
        channel.fail_once("start", "boom");

        let err = channel.execute("a", "pg_ctlcluster 12 main start").unwrap_err();
        assert_eq!(err.diagnostics(), "boom");
        assert!(channel.execute("a", "pg_ctlcluster 12 main start").is_ok());
    }

    #[test]
    fn test_sequence_repeats_last() {
        let channel = RecordingChannel::new();
        channel.respond_sequence("lsn", &["0/1", "0/2"]);
        assert_eq!(channel.execute("a", "lsn").unwrap(), "0/1");
        assert_eq!(channel.execute("a", "lsn").unwrap(), "0/2");
        assert_eq!(channel.execute("a", "lsn").unwrap(), "0/2");
    }

    #[test]
    fn test_unreachable_host() {
        let channel = RecordingChannel::new();
        channel.unreachable("dead");
        assert!(matches!(
            channel.execute("dead", "true"),
            Err(RemoteError::Connection { .. })
        ));
        assert!(channel.execute("alive", "true").is_ok());
    }

    #[test]
    fn test_host_scoped_failure() {
        let channel = RecordingChannel::new();
        channel.fail_on("b", "reload", "nope");
        assert!(channel.execute("a", "reload").is_ok());
        assert!(channel.execute("b", "reload").is_err());
    }
}
