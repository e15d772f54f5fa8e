//! SSH remote channel
//!
//! Uses multiplexed OpenSSH sessions driven from a private tokio runtime.
//! Every public call blocks until the remote side finishes or its timeout
//! expires; an unreachable host never blocks the orchestrator indefinitely.

use std::time::Duration;

use openssh::{KnownHosts, Session, SessionBuilder, Stdio};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::runtime::Runtime;
use tokio::time::timeout;

use super::channel::RemoteChannel;
use super::errors::{RemoteError, RemoteResult};

/// How unknown host keys are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostKeyPolicy {
    /// Only hosts already in known_hosts
    #[default]
    Strict,
    /// Record unknown keys on first connect; reject changed ones
    Add,
}

impl From<HostKeyPolicy> for KnownHosts {
    fn from(policy: HostKeyPolicy) -> Self {
        match policy {
            HostKeyPolicy::Strict => KnownHosts::Strict,
            HostKeyPolicy::Add => KnownHosts::Add,
        }
    }
}

/// Connection settings for `SshChannel`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshSettings {
    /// System user commands run as on every host
    pub user: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub host_keys: HostKeyPolicy,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            user: "postgres".to_string(),
            port: 22,
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(3600),
            host_keys: HostKeyPolicy::Strict,
        }
    }
}

/// Remote channel over SSH.
pub struct SshChannel {
    settings: SshSettings,
    runtime: Runtime,
}

impl SshChannel {
    /// Create a channel with its own runtime.
    pub fn new(settings: SshSettings) -> RemoteResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("herdsman-ssh")
            .enable_all()
            .build()
            .map_err(|e| RemoteError::Connection {
                host: "localhost".to_string(),
                reason: format!("cannot start ssh runtime: {}", e),
            })?;

        Ok(Self { settings, runtime })
    }

    pub fn settings(&self) -> &SshSettings {
        &self.settings
    }

    async fn connect(&self, host: &str) -> RemoteResult<Session> {
        let mut builder = SessionBuilder::default();
        builder
            .user(self.settings.user.clone())
            .port(self.settings.port)
            .connect_timeout(self.settings.connect_timeout)
            .known_hosts_check(self.settings.host_keys.into());

        match timeout(self.settings.connect_timeout, builder.connect_mux(host)).await {
            Ok(Ok(session)) => Ok(session),
            Ok(Err(e)) => Err(RemoteError::Connection {
                host: host.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(self.timed_out(host, self.settings.connect_timeout)),
        }
    }

    fn timed_out(&self, host: &str, bound: Duration) -> RemoteError {
        RemoteError::Timeout {
            host: host.to_string(),
            seconds: bound.as_secs(),
        }
    }

    async fn run(&self, host: &str, command: &str) -> RemoteResult<String> {
        let session = self.connect(host).await?;

        let output = timeout(
            self.settings.command_timeout,
            session.raw_command(command).output(),
        )
        .await;
        let _ = session.close().await;

        let output = match output {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(RemoteError::Connection {
                    host: host.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => return Err(self.timed_out(host, self.settings.command_timeout)),
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() || !stderr.is_empty() {
            return Err(RemoteError::Command {
                host: host.to_string(),
                command: command.to_string(),
                status: output.status.code(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn upload(&self, host: &str, content: &str, remote_path: &str) -> RemoteResult<()> {
        let transfer_error = |reason: String| RemoteError::Transfer {
            host: host.to_string(),
            path: remote_path.to_string(),
            reason,
        };

        let session = self.connect(host).await?;
        let command = format!("cat > {}", shell_quote(remote_path));

        let result = timeout(self.settings.command_timeout, async {
            let mut child = session
                .raw_command(&command)
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .spawn()
                .await
                .map_err(|e| transfer_error(e.to_string()))?;

            if let Some(mut stdin) = child.stdin().take() {
                stdin
                    .write_all(content.as_bytes())
                    .await
                    .map_err(|e| transfer_error(e.to_string()))?;
                stdin
                    .shutdown()
                    .await
                    .map_err(|e| transfer_error(e.to_string()))?;
            }

            let output = child
                .wait_with_output()
                .await
                .map_err(|e| transfer_error(e.to_string()))?;
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if !output.status.success() || !stderr.is_empty() {
                return Err(transfer_error(stderr));
            }
            Ok(())
        })
        .await;
        let _ = session.close().await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(self.timed_out(host, self.settings.command_timeout)),
        }
    }
}

impl RemoteChannel for SshChannel {
    fn execute(&self, host: &str, command: &str) -> RemoteResult<String> {
        self.runtime.block_on(self.run(host, command))
    }

    fn transfer(&self, host: &str, content: &str, remote_path: &str) -> RemoteResult<()> {
        self.runtime.block_on(self.upload(host, content, remote_path))
    }
}

/// Quote a single shell word.
pub fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/db/main/recovery.conf"), "'/db/main/recovery.conf'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_default_settings() {
        let settings = SshSettings::default();
        assert_eq!(settings.user, "postgres");
        assert_eq!(settings.port, 22);
        assert!(settings.connect_timeout < settings.command_timeout);
        assert_eq!(settings.host_keys, HostKeyPolicy::Strict);
    }

    #[test]
    fn test_host_key_policy_maps_to_known_hosts() {
        assert!(matches!(KnownHosts::from(HostKeyPolicy::Strict), KnownHosts::Strict));
        assert!(matches!(KnownHosts::from(HostKeyPolicy::Add), KnownHosts::Add));
    }
}
