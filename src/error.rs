//! Error types for cbup.

use thiserror::Error;

/// Errors raised while upgrading cluster nodes.
///
/// `VersionResolution` is fatal for the whole run; everything else is
/// contained to the node that produced it.
#[derive(Error, Debug, Clone)]
pub enum UpgradeError {
    #[error("Connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    #[error("{role} command on {host} exited with {}: {stderr}", .exit_code.map_or("unknown status".to_string(), |c| format!("code {c}")))]
    CommandExecution {
        host: String,
        role: &'static str,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to resolve the target version: {0}")]
    VersionResolution(String),

    #[error("Unparsable version string: '{0}'")]
    VersionParse(String),
}
