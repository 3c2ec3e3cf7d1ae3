//! Version parsing, ordering and target resolution.

use std::cmp::Ordering;
use std::fmt;

use serde::Deserialize;
use tracing::debug;

use crate::config::ClusterConfig;
use crate::error::UpgradeError;
use crate::ssh::CommandExecutor;

/// Sentinel target that triggers a repository query instead of a literal.
pub const LATEST: &str = "latest";

/// A dotted numeric version, ordered segment by segment.
///
/// Segments are runs of ASCII digits; anything between them is a delimiter.
/// Missing trailing segments compare as 0, so `7.1` equals `7.1.0`.
/// Non-numeric parts such as a `-beta` suffix are dropped rather than
/// compared; a string without a single numeric segment is rejected.
#[derive(Debug, Clone)]
pub struct Version {
    segments: Vec<u64>,
    raw: String,
}

impl Version {
    pub fn parse(input: &str) -> Result<Self, UpgradeError> {
        let segments: Vec<u64> = input
            .split(|c: char| !c.is_ascii_digit())
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect();

        if segments.is_empty() {
            return Err(UpgradeError::VersionParse(input.trim().to_string()));
        }

        Ok(Self {
            segments,
            raw: input.trim().to_string(),
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let a = self.segments.get(i).copied().unwrap_or(0);
            let b = other.segments.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

/// `server-info` response; only the version field matters here.
#[derive(Debug, Deserialize)]
struct ServerInfo {
    version: String,
}

/// Extract a node's own version from `server-info` JSON output.
///
/// The reported version has the form `7.1.3-3479`; only the part before the
/// first dash is the version.
pub fn parse_reported_version(stdout: &str) -> Result<Version, UpgradeError> {
    let info: ServerInfo = serde_json::from_str(stdout)
        .map_err(|_| UpgradeError::VersionParse(stdout.trim().to_string()))?;

    let bare = info.version.split('-').next().unwrap_or_default();
    Version::parse(bare)
}

/// Resolve the target version for the run.
///
/// A literal target is parsed as-is with no remote call; the `latest`
/// sentinel runs the query-latest-version command once against `first_node`
/// and takes its trimmed stdout. Any failure here is fatal for the run.
pub async fn resolve_target<E: CommandExecutor>(
    requested: &str,
    first_node: &str,
    config: &ClusterConfig,
    executor: &E,
) -> Result<Version, UpgradeError> {
    if requested != LATEST {
        return Version::parse(requested).map_err(|_| {
            UpgradeError::VersionResolution(format!("invalid target version '{requested}'"))
        });
    }

    debug!(node = first_node, "Querying the latest available version");

    let output = executor
        .execute(first_node, &config.latest_version_command)
        .await
        .map_err(|e| UpgradeError::VersionResolution(e.to_string()))?;

    if !output.success() {
        return Err(UpgradeError::VersionResolution(format!(
            "latest-version command exited non-zero: {}",
            output.stderr.trim()
        )));
    }

    let reported = output.stdout.trim();
    if reported.is_empty() {
        return Err(UpgradeError::VersionResolution(
            "latest-version command returned no output".to_string(),
        ));
    }

    Version::parse(reported).map_err(|_| {
        UpgradeError::VersionResolution(format!("unparsable latest version '{reported}'"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Args, ClusterConfig};
    use crate::ssh::testing::ScriptedExecutor;
    use clap::Parser;

    fn version(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn test_config() -> ClusterConfig {
        let args = Args::parse_from([
            "cbup",
            "--nodes",
            "cb-01",
            "--username",
            "admin",
            "--password",
            "secret",
        ]);
        ClusterConfig::from_args(&args)
    }

    #[test]
    fn test_parse_and_compare() {
        assert!(version("7.1.3") < version("7.1.10"));
        assert!(version("7.1.10") > version("7.1.3"));
        assert!(version("7.2") > version("7.1.10"));
        assert_eq!(version("7.1.10"), version("7.1.10"));
    }

    #[test]
    fn test_missing_trailing_segment_is_zero() {
        assert_eq!(version("7.1"), version("7.1.0"));
        assert!(version("7.1") < version("7.1.1"));
    }

    #[test]
    fn test_non_numeric_segments_are_dropped() {
        assert_eq!(version("7.1.10-beta"), version("7.1.10"));
        assert_eq!(version("v7.1.10"), version("7.1.10"));
    }

    #[test]
    fn test_parse_rejects_non_versions() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("not a version").is_err());
    }

    #[test]
    fn test_parse_reported_version() {
        let v = parse_reported_version(r#"{"version": "7.1.3-3479", "status": "healthy"}"#)
            .unwrap();
        assert_eq!(v, version("7.1.3"));
    }

    #[test]
    fn test_parse_reported_version_rejects_bad_json() {
        assert!(matches!(
            parse_reported_version("command not found"),
            Err(UpgradeError::VersionParse(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_literal_target_makes_no_remote_call() {
        let executor = ScriptedExecutor::new();
        let target = resolve_target("7.1.10", "cb-01", &test_config(), &executor)
            .await
            .unwrap();

        assert_eq!(target, version("7.1.10"));
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_latest_trims_output() {
        let executor = ScriptedExecutor::new().ok("yum list", "7.1.10\n");
        let target = resolve_target(LATEST, "cb-01", &test_config(), &executor)
            .await
            .unwrap();

        assert_eq!(target, version("7.1.10"));
        assert_eq!(executor.calls().len(), 1);
        assert_eq!(executor.calls()[0].0, "cb-01");
    }

    #[tokio::test]
    async fn test_resolve_latest_fails_on_non_zero_exit() {
        let executor = ScriptedExecutor::new().fail("yum list", 1, "repo unreachable");
        let err = resolve_target(LATEST, "cb-01", &test_config(), &executor)
            .await
            .unwrap_err();

        assert!(matches!(err, UpgradeError::VersionResolution(_)));
    }

    #[tokio::test]
    async fn test_resolve_latest_fails_on_empty_output() {
        let executor = ScriptedExecutor::new().ok("yum list", "  \n");
        let err = resolve_target(LATEST, "cb-01", &test_config(), &executor)
            .await
            .unwrap_err();

        assert!(matches!(err, UpgradeError::VersionResolution(_)));
    }

    #[tokio::test]
    async fn test_resolve_rejects_unparsable_literal() {
        let executor = ScriptedExecutor::new();
        let err = resolve_target("nightly", "cb-01", &test_config(), &executor)
            .await
            .unwrap_err();

        assert!(matches!(err, UpgradeError::VersionResolution(_)));
    }
}
