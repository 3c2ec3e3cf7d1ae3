//! Per-node upgrade state machine.
//!
//! Pure decision logic: `next` maps the current state and flags to the step
//! to run or the outcome to report, `begin`/`succeed`/`fail` commit
//! transitions. All command execution lives in the orchestrator, so every
//! path through the machine can be unit tested without ssh.

use std::cmp::Ordering;

use crate::error::UpgradeError;
use crate::version::Version;

/// Flags that shape a node's path through the machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpgradeFlags {
    /// Also upgrade the operating system after the service upgrade.
    pub upgrade_system: bool,
    /// Reboot if an actual upgrade took place.
    pub reboot: bool,
    /// Reboot even if the node was already current.
    pub force_reboot: bool,
}

/// Remote steps the machine can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CheckVersion,
    StopService,
    Upgrade,
    UpgradeOs,
    StartService,
    Reboot,
}

impl Step {
    /// Role name used in status lines and errors.
    pub fn role(self) -> &'static str {
        match self {
            Step::CheckVersion => "version-check",
            Step::StopService => "service-stop",
            Step::Upgrade => "upgrade",
            Step::UpgradeOs => "system-upgrade",
            Step::StartService => "service-start",
            Step::Reboot => "reboot",
        }
    }

    /// Whether the step changes state on the target host.
    pub fn is_mutating(self) -> bool {
        self != Step::CheckVersion
    }
}

/// States of one node during a run.
///
/// Terminal states are `Skipped`, `Done` and `Failed`; a node moves through
/// the others monotonically and never revisits a state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    Pending,
    VersionChecked { upgrade_needed: bool },
    /// Already current, but `--force-reboot` still sends it through the
    /// reboot sub-sequence.
    SkippedButReboot,
    Stopping,
    Stopped,
    Upgrading,
    Upgraded,
    OsUpgrading,
    OsUpgraded,
    Starting,
    Started,
    Rebooting,
    Rebooted,
    Skipped,
    Done,
    Failed,
}

/// Terminal outcome of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOutcome {
    Skipped,
    Done,
    Failed,
}

/// What the orchestrator should do next for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    Run(Step),
    Finish(NodeOutcome),
}

/// One cluster node and its run-scoped upgrade state.
#[derive(Debug, Clone)]
pub struct Node {
    pub host: String,
    pub current_version: Option<Version>,
    pub upgraded: bool,
    pub rebooted: bool,
    pub error: Option<UpgradeError>,
    state: NodeState,
    flags: UpgradeFlags,
}

impl Node {
    pub fn new(host: impl Into<String>, flags: UpgradeFlags) -> Self {
        Self {
            host: host.into(),
            current_version: None,
            upgraded: false,
            rebooted: false,
            error: None,
            state: NodeState::Pending,
            flags,
        }
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    /// The terminal outcome, once the node has reached one.
    pub fn outcome(&self) -> Option<NodeOutcome> {
        match self.state {
            NodeState::Skipped => Some(NodeOutcome::Skipped),
            NodeState::Done => Some(NodeOutcome::Done),
            NodeState::Failed => Some(NodeOutcome::Failed),
            _ => None,
        }
    }

    /// Decide what to do next from the current state. Pure.
    pub fn next(&self) -> NextAction {
        match self.state {
            NodeState::Pending => NextAction::Run(Step::CheckVersion),
            NodeState::VersionChecked {
                upgrade_needed: true,
            } => NextAction::Run(Step::StopService),
            NodeState::VersionChecked {
                upgrade_needed: false,
            } => NextAction::Finish(NodeOutcome::Skipped),
            NodeState::SkippedButReboot => NextAction::Run(Step::Reboot),
            NodeState::Stopping => NextAction::Run(Step::StopService),
            NodeState::Stopped => NextAction::Run(Step::Upgrade),
            NodeState::Upgrading => NextAction::Run(Step::Upgrade),
            NodeState::Upgraded => {
                if self.flags.upgrade_system {
                    NextAction::Run(Step::UpgradeOs)
                } else {
                    NextAction::Run(Step::StartService)
                }
            }
            NodeState::OsUpgrading => NextAction::Run(Step::UpgradeOs),
            NodeState::OsUpgraded => NextAction::Run(Step::StartService),
            NodeState::Starting => NextAction::Run(Step::StartService),
            NodeState::Started => {
                if (self.flags.reboot && self.upgraded) || self.flags.force_reboot {
                    NextAction::Run(Step::Reboot)
                } else {
                    NextAction::Finish(NodeOutcome::Done)
                }
            }
            NodeState::Rebooting => NextAction::Run(Step::Reboot),
            NodeState::Rebooted => NextAction::Finish(NodeOutcome::Done),
            NodeState::Skipped => NextAction::Finish(NodeOutcome::Skipped),
            NodeState::Done => NextAction::Finish(NodeOutcome::Done),
            NodeState::Failed => NextAction::Finish(NodeOutcome::Failed),
        }
    }

    /// Enter the in-flight state for a step.
    pub fn begin(&mut self, step: Step) {
        self.state = match step {
            // The version query has no transient state of its own.
            Step::CheckVersion => NodeState::Pending,
            Step::StopService => NodeState::Stopping,
            Step::Upgrade => NodeState::Upgrading,
            Step::UpgradeOs => NodeState::OsUpgrading,
            Step::StartService => NodeState::Starting,
            Step::Reboot => NodeState::Rebooting,
        };
    }

    /// Record the node's own version and the comparison against the target.
    pub fn version_checked(&mut self, current: Version, cmp: Ordering) {
        self.current_version = Some(current);

        let upgrade_needed = cmp == Ordering::Less;
        self.state = if !upgrade_needed && self.flags.force_reboot {
            NodeState::SkippedButReboot
        } else {
            NodeState::VersionChecked { upgrade_needed }
        };
    }

    /// Record a successfully completed step.
    pub fn succeed(&mut self, step: Step) {
        self.state = match step {
            // Recorded through `version_checked` instead.
            Step::CheckVersion => return,
            Step::StopService => NodeState::Stopped,
            Step::Upgrade => {
                self.upgraded = true;
                NodeState::Upgraded
            }
            Step::UpgradeOs => NodeState::OsUpgraded,
            Step::StartService => NodeState::Started,
            Step::Reboot => {
                self.rebooted = true;
                NodeState::Rebooted
            }
        };
    }

    /// Record a failed step.
    ///
    /// A reboot failure is observational: the node advances to `Rebooted`
    /// and still ends `Done`. Every other failure is terminal for the node.
    pub fn fail(&mut self, step: Step, err: UpgradeError) {
        if step == Step::Reboot {
            self.state = NodeState::Rebooted;
            return;
        }

        self.error = Some(err);
        self.state = NodeState::Failed;
    }

    /// Commit the terminal state `next` reported.
    pub fn finish(&mut self, outcome: NodeOutcome) {
        self.state = match outcome {
            NodeOutcome::Skipped => NodeState::Skipped,
            NodeOutcome::Done => NodeState::Done,
            NodeOutcome::Failed => NodeState::Failed,
        };
    }
}
