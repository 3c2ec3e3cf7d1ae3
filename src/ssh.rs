//! Remote command execution over SSH.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::UpgradeError;

/// Captured result of one remote command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs one literal shell command against one host.
///
/// Implementations only report the exit status; classifying a non-zero
/// status as fatal for the node is the caller's job.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, host: &str, command: &str) -> Result<CommandOutput, UpgradeError>;
}

/// Executes commands through the system `ssh` client.
pub struct SshExecutor {
    timeout: Duration,
}

impl SshExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandExecutor for SshExecutor {
    async fn execute(&self, host: &str, command: &str) -> Result<CommandOutput, UpgradeError> {
        debug!(host, "Executing remote command");

        let child = Command::new("ssh")
            .arg(host)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| UpgradeError::Connection {
                host: host.to_string(),
                reason: format!(
                    "command did not complete within {}s",
                    self.timeout.as_secs()
                ),
            })?
            .map_err(|e| UpgradeError::Connection {
                host: host.to_string(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = strip_ssh_noise(&String::from_utf8_lossy(&output.stderr));

        if !stderr.is_empty() {
            warn!(host, stderr = %stderr, "Remote command produced stderr");
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code: output.status.code(),
        })
    }
}

/// Drop the connection-teardown chatter ssh prints on stderr.
fn strip_ssh_noise(stderr: &str) -> String {
    stderr
        .lines()
        .filter(|line| !(line.contains("Connection") && line.contains("closed by remote host")))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{CommandExecutor, CommandOutput};
    use crate::error::UpgradeError;

    /// Scripted stand-in for ssh: matches commands by substring, first rule
    /// wins, and records every call in order.
    #[derive(Default)]
    pub struct ScriptedExecutor {
        rules: Vec<Rule>,
        calls: Mutex<Vec<(String, String)>>,
    }

    struct Rule {
        host: Option<String>,
        needle: String,
        response: Result<CommandOutput, UpgradeError>,
    }

    impl ScriptedExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Succeed with the given stdout when `needle` appears in the command.
        pub fn ok(self, needle: &str, stdout: &str) -> Self {
            self.respond(None, needle, Ok(output(stdout, "", 0)))
        }

        /// Same as `ok`, but only for one host.
        pub fn ok_on(self, host: &str, needle: &str, stdout: &str) -> Self {
            self.respond(Some(host), needle, Ok(output(stdout, "", 0)))
        }

        /// Exit non-zero when `needle` appears in the command.
        pub fn fail(self, needle: &str, exit_code: i32, stderr: &str) -> Self {
            self.respond(None, needle, Ok(output("", stderr, exit_code)))
        }

        /// Same as `fail`, but only for one host.
        pub fn fail_on(self, host: &str, needle: &str, exit_code: i32, stderr: &str) -> Self {
            self.respond(Some(host), needle, Ok(output("", stderr, exit_code)))
        }

        /// Refuse every connection to one host.
        pub fn refuse(self, host: &str) -> Self {
            let err = UpgradeError::Connection {
                host: host.to_string(),
                reason: "connection refused".to_string(),
            };
            self.respond(Some(host), "", Err(err))
        }

        fn respond(
            mut self,
            host: Option<&str>,
            needle: &str,
            response: Result<CommandOutput, UpgradeError>,
        ) -> Self {
            self.rules.push(Rule {
                host: host.map(str::to_string),
                needle: needle.to_string(),
                response,
            });
            self
        }

        /// Commands executed so far, as (host, command) pairs in call order.
        pub fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }

        /// Number of executed commands containing `needle`.
        pub fn executed(&self, needle: &str) -> usize {
            self.calls().iter().filter(|(_, c)| c.contains(needle)).count()
        }

        /// Position of the first executed command containing `needle`.
        pub fn position_of(&self, needle: &str) -> Option<usize> {
            self.calls().iter().position(|(_, c)| c.contains(needle))
        }
    }

    fn output(stdout: &str, stderr: &str, exit_code: i32) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code: Some(exit_code),
        }
    }

    #[async_trait]
    impl CommandExecutor for ScriptedExecutor {
        async fn execute(&self, host: &str, command: &str) -> Result<CommandOutput, UpgradeError> {
            self.calls
                .lock()
                .unwrap()
                .push((host.to_string(), command.to_string()));

            for rule in &self.rules {
                let host_matches = rule.host.as_deref().is_none_or(|h| h == host);
                if host_matches && command.contains(&rule.needle) {
                    return rule.response.clone();
                }
            }

            Ok(output("", "", 0))
        }
    }
}
