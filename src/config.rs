//! CLI arguments and immutable run configuration.

use clap::Parser;
use secrecy::{ExposeSecret, SecretString};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "cbup",
    version,
    about = "Performs a rolling upgrade of a Couchbase cluster"
)]
pub struct Args {
    /// Comma separated host names or IP addresses of cluster nodes
    #[arg(short = 'n', long, value_delimiter = ',', required = true)]
    pub nodes: Vec<String>,

    /// Username for management CLI authentication
    #[arg(short = 'u', long)]
    pub username: String,

    /// Password for management CLI authentication
    #[arg(short = 'P', long)]
    pub password: String,

    /// Couchbase HTTP management port
    #[arg(short = 'p', long, default_value_t = 8091)]
    pub port: u16,

    /// Shell command to the Couchbase CLI
    #[arg(long, default_value = "sudo /opt/couchbase/bin/couchbase-cli")]
    pub cli: String,

    /// Shell command to stop the Couchbase service on a node
    #[arg(long, default_value = "sudo systemctl stop couchbase-server")]
    pub service_stop_command: String,

    /// Shell command to start the Couchbase service on a node
    #[arg(long, default_value = "sudo systemctl start couchbase-server")]
    pub service_start_command: String,

    /// Command to upgrade Couchbase on a node
    #[arg(
        long,
        default_value = "sudo yum clean all && sudo yum install -y couchbase-server-community"
    )]
    pub upgrade_command: String,

    /// Command to get the latest version available in the repository
    #[arg(
        long,
        default_value = "sudo yum clean all >/dev/null 2>&1 && sudo yum list all couchbase-server-community | grep couchbase-server-community | awk '{ print $2 }' | cut -d '-' -f1 | sort --version-sort -r | head -n 1"
    )]
    pub latest_version_command: String,

    /// Command to upgrade the operating system
    #[arg(long, default_value = "sudo yum clean all && sudo yum update -y")]
    pub upgrade_system_command: String,

    /// A specific version to upgrade to, or 'latest' for the highest version
    /// available in the repository. Nodes at or above the target are skipped.
    #[arg(long, visible_alias = "target", default_value = "latest")]
    pub target_version: String,

    /// Also upgrade the operating system after upgrading Couchbase
    #[arg(long)]
    pub upgrade_system: bool,

    /// Reboot the server if an actual upgrade took place
    #[arg(long)]
    pub reboot: bool,

    /// Always reboot the server, even if the node was already current
    #[arg(long)]
    pub force_reboot: bool,

    /// Echo full command output instead of terse status lines
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Print mutating commands without executing them
    #[arg(long)]
    pub dry_run: bool,

    /// Timeout in seconds for a single remote command
    #[arg(long, default_value_t = 3600)]
    pub command_timeout: u64,

    /// Log level (env-filter syntax)
    #[arg(long, env = "CBUP_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,
}

impl Args {
    /// Node hosts in processing order, whitespace trimmed, empties dropped.
    pub fn node_list(&self) -> Vec<String> {
        self.nodes
            .iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect()
    }
}

/// Immutable, process-wide configuration for one run.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub username: String,
    pub password: SecretString,
    pub port: u16,
    pub cli: String,
    pub service_stop_command: String,
    pub service_start_command: String,
    pub upgrade_command: String,
    pub latest_version_command: String,
    pub upgrade_system_command: String,
    pub target_version: String,
}

impl ClusterConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            username: args.username.clone(),
            password: SecretString::from(args.password.clone()),
            port: args.port,
            cli: args.cli.clone(),
            service_stop_command: args.service_stop_command.clone(),
            service_start_command: args.service_start_command.clone(),
            upgrade_command: args.upgrade_command.clone(),
            latest_version_command: args.latest_version_command.clone(),
            upgrade_system_command: args.upgrade_system_command.clone(),
            target_version: args.target_version.clone(),
        }
    }

    /// Management-CLI invocation that reports a node's own version.
    ///
    /// Runs against the node's local management endpoint; stdout is JSON
    /// with a `version` field.
    pub fn version_check_command(&self) -> String {
        format!(
            "{} server-info -c 127.0.0.1:{} -u {} -p '{}'",
            self.cli,
            self.port,
            self.username,
            self.password.expose_secret()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::parse_from(argv)
    }

    #[test]
    fn test_node_list_trims_and_drops_empties() {
        let args = parse(&[
            "cbup",
            "--nodes",
            "cb-01, cb-02 ,,cb-03",
            "-u",
            "admin",
            "-P",
            "secret",
        ]);

        assert_eq!(args.node_list(), vec!["cb-01", "cb-02", "cb-03"]);
    }

    #[test]
    fn test_node_order_is_preserved() {
        let args = parse(&[
            "cbup", "--nodes", "c,a,b", "-u", "admin", "-P", "secret",
        ]);

        assert_eq!(args.node_list(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["cbup", "-n", "cb-01", "-u", "admin", "-P", "secret"]);

        assert_eq!(args.port, 8091);
        assert_eq!(args.cli, "sudo /opt/couchbase/bin/couchbase-cli");
        assert_eq!(args.target_version, "latest");
        assert_eq!(args.command_timeout, 3600);
        assert!(!args.upgrade_system);
        assert!(!args.reboot);
        assert!(!args.force_reboot);
        assert!(!args.dry_run);
    }

    #[test]
    fn test_version_check_command_embeds_credentials() {
        let args = parse(&["cbup", "-n", "cb-01", "-u", "admin", "-P", "s3cret", "-p", "9000"]);
        let config = ClusterConfig::from_args(&args);

        assert_eq!(
            config.version_check_command(),
            "sudo /opt/couchbase/bin/couchbase-cli server-info -c 127.0.0.1:9000 -u admin -p 's3cret'"
        );
    }

    #[test]
    fn test_password_is_redacted_in_debug_output() {
        let args = parse(&["cbup", "-n", "cb-01", "-u", "admin", "-P", "s3cret"]);
        let config = ClusterConfig::from_args(&args);

        assert!(!format!("{config:?}").contains("s3cret"));
    }
}
