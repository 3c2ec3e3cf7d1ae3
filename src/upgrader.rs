//! Rolling upgrade orchestration.

use std::cmp::Ordering;

use colored::Colorize;
use tracing::{error, info, warn};

use crate::config::ClusterConfig;
use crate::error::UpgradeError;
use crate::node::{NextAction, Node, NodeOutcome, Step, UpgradeFlags};
use crate::output;
use crate::ssh::CommandExecutor;
use crate::version::{self, Version};

/// Command sent to reboot a node; not one of the overridable templates.
pub const REBOOT_COMMAND: &str = "sudo /sbin/reboot";

/// Per-run execution options.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub verbose: bool,
    pub dry_run: bool,
}

/// Aggregated result of one run.
#[derive(Debug)]
pub struct RunReport {
    pub target: Version,
    pub nodes: Vec<Node>,
}

impl RunReport {
    /// Nodes whose upgrade command ran and succeeded.
    pub fn upgraded(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.outcome() == Some(NodeOutcome::Done) && n.upgraded)
            .count()
    }

    /// Nodes left unchanged because they were already current, including
    /// force-rebooted ones.
    pub fn skipped(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| match n.outcome() {
                Some(NodeOutcome::Skipped) => true,
                Some(NodeOutcome::Done) => !n.upgraded,
                _ => false,
            })
            .count()
    }

    pub fn failed(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.outcome() == Some(NodeOutcome::Failed))
            .count()
    }

    pub fn success(&self) -> bool {
        self.failed() == 0
    }
}

enum StepResult {
    Completed,
    VersionIs(Version),
}

/// Drives the per-node state machine across the cluster, one node at a time.
///
/// Sequential processing is the availability guarantee: at most one node is
/// ever out of service.
pub struct RollingUpgrader<E> {
    config: ClusterConfig,
    flags: UpgradeFlags,
    options: RunOptions,
    executor: E,
}

impl<E: CommandExecutor> RollingUpgrader<E> {
    pub fn new(
        config: ClusterConfig,
        flags: UpgradeFlags,
        options: RunOptions,
        executor: E,
    ) -> Self {
        Self {
            config,
            flags,
            options,
            executor,
        }
    }

    /// Upgrade every node in input order.
    ///
    /// Target resolution failure aborts before any node is touched; a failed
    /// node never stops the remaining ones.
    pub async fn run(&self, hosts: &[String]) -> Result<RunReport, UpgradeError> {
        let first = hosts
            .first()
            .ok_or_else(|| UpgradeError::VersionResolution("the node list is empty".to_string()))?;

        println!("Performing a rolling upgrade of the Couchbase cluster");
        if self.config.target_version == version::LATEST {
            println!("Determining the latest available version");
        }

        let target = version::resolve_target(
            &self.config.target_version,
            first,
            &self.config,
            &self.executor,
        )
        .await?;

        info!(target = %target, nodes = hosts.len(), "Resolved target version");
        println!("Upgrading to version {}", target.to_string().bold());

        let mut nodes = Vec::with_capacity(hosts.len());
        for host in hosts {
            let mut node = Node::new(host.clone(), self.flags);
            self.process_node(&mut node, &target).await;
            nodes.push(node);
        }

        Ok(RunReport { target, nodes })
    }

    /// Drive one node's machine to a terminal state.
    async fn process_node(&self, node: &mut Node, target: &Version) {
        println!();
        println!("{}", format!("=== Node {} ===", node.host).cyan().bold());

        loop {
            match node.next() {
                NextAction::Finish(outcome) => {
                    node.finish(outcome);
                    match outcome {
                        NodeOutcome::Skipped => {
                            println!("  {} Skipping upgrade", "✓".green());
                        }
                        NodeOutcome::Done => {
                            println!("  {} Node complete", "✓".green());
                        }
                        NodeOutcome::Failed => {}
                    }
                    break;
                }
                NextAction::Run(step) => {
                    node.begin(step);
                    match self.run_step(&node.host, step).await {
                        Ok(StepResult::VersionIs(current)) => {
                            let cmp = current.cmp(target);
                            if cmp == Ordering::Less {
                                println!("  Current version {current} is lower than {target}");
                            } else {
                                println!("  Current version {current} is at or above {target}");
                            }
                            node.version_checked(current, cmp);
                        }
                        Ok(StepResult::Completed) => node.succeed(step),
                        Err(err) => {
                            if step == Step::Reboot {
                                warn!(host = %node.host, error = %err, "Reboot command failed");
                                eprintln!("  {} Reboot failed (continuing): {err}", "⚠".yellow());
                            } else {
                                error!(host = %node.host, error = %err, "Step failed");
                                eprintln!("  {} {err}", "✗".red());
                            }
                            node.fail(step, err);
                        }
                    }
                }
            }
        }
    }

    /// Execute one step's command against the node.
    async fn run_step(&self, host: &str, step: Step) -> Result<StepResult, UpgradeError> {
        let command = self.command_for(step);

        if self.options.dry_run && step.is_mutating() {
            println!(
                "- {} {} {}",
                banner(step),
                "[dry run]".yellow(),
                command.dimmed()
            );
            return Ok(StepResult::Completed);
        }

        println!("- {}", banner(step));
        let spinner = (!self.options.verbose).then(|| output::step_spinner(step.role()));

        let result = self.executor.execute(host, &command).await;

        if let Some(pb) = spinner {
            pb.finish_and_clear();
        }

        let output = result?;

        if self.options.verbose {
            if !output.stdout.trim().is_empty() {
                println!("stdout:\n{}", output.stdout.trim_end());
            }
            if !output.stderr.trim().is_empty() {
                println!("stderr:\n{}", output.stderr.trim_end());
            }
        }

        if !output.success() {
            return Err(UpgradeError::CommandExecution {
                host: host.to_string(),
                role: step.role(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        if step == Step::CheckVersion {
            let current = version::parse_reported_version(&output.stdout)?;
            return Ok(StepResult::VersionIs(current));
        }

        Ok(StepResult::Completed)
    }

    fn command_for(&self, step: Step) -> String {
        match step {
            Step::CheckVersion => self.config.version_check_command(),
            Step::StopService => self.config.service_stop_command.clone(),
            Step::Upgrade => self.config.upgrade_command.clone(),
            Step::UpgradeOs => self.config.upgrade_system_command.clone(),
            Step::StartService => self.config.service_start_command.clone(),
            Step::Reboot => REBOOT_COMMAND.to_string(),
        }
    }
}

fn banner(step: Step) -> &'static str {
    match step {
        Step::CheckVersion => "Checking current version",
        Step::StopService => "Stopping Couchbase service",
        Step::Upgrade => "Upgrading Couchbase software",
        Step::UpgradeOs => "Upgrading operating system",
        Step::StartService => "Starting Couchbase service",
        Step::Reboot => "Rebooting",
    }
}
