//! Console rendering for run progress and results.

use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::node::NodeOutcome;
use crate::upgrader::RunReport;

/// Spinner shown while a remote step is in flight.
pub fn step_spinner(role: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    pb.set_message(role.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Print the per-node outcome list and aggregate counts.
pub fn print_summary(report: &RunReport) {
    println!();
    println!("{}", "=".repeat(60));
    println!(
        "{}",
        format!("Rolling upgrade summary (target {})", report.target).bold()
    );
    println!("{}", "=".repeat(60));

    for node in &report.nodes {
        match node.outcome() {
            Some(NodeOutcome::Done) if node.upgraded => {
                let note = if node.rebooted { ", rebooted" } else { "" };
                println!(
                    "  {} {}: upgraded to {}{}",
                    "✓".green(),
                    node.host,
                    report.target,
                    note
                );
            }
            Some(NodeOutcome::Done) => {
                let note = if node.rebooted {
                    "rebooted"
                } else {
                    "reboot attempted"
                };
                println!("  {} {}: already current, {}", "✓".green(), node.host, note);
            }
            Some(NodeOutcome::Skipped) => {
                let current = node
                    .current_version
                    .as_ref()
                    .map_or_else(|| "unknown".to_string(), ToString::to_string);
                println!(
                    "  {} {}: skipped (current version {})",
                    "✓".green(),
                    node.host,
                    current
                );
            }
            Some(NodeOutcome::Failed) => {
                let reason = node
                    .error
                    .as_ref()
                    .map_or_else(|| "unknown error".to_string(), ToString::to_string);
                println!("  {} {}: {}", "✗".red(), node.host, reason);
            }
            None => {
                println!(
                    "  {} {}: interrupted in state {:?}",
                    "⚠".yellow(),
                    node.host,
                    node.state()
                );
            }
        }
    }

    println!();
    let failed = report.failed();
    let failed_label = if failed > 0 {
        failed.to_string().red().to_string()
    } else {
        failed.to_string()
    };
    println!(
        "  upgraded: {}  skipped: {}  failed: {}",
        report.upgraded(),
        report.skipped(),
        failed_label
    );

    println!();
    if report.success() {
        println!(
            "{}",
            "Successfully processed all nodes of the cluster".green().bold()
        );
    } else {
        println!("{}", format!("{failed} node(s) failed").red().bold());
    }
}
