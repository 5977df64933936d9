//! CLI command for `isoforge doctor`
//!
//! Probes the host for the tools a build needs and reports what is missing.

use anyhow::{bail, Result};

use crate::cli::commands::load_config;
use crate::cli::output::{self, print_detail, print_info, print_success, print_warning, status};
use crate::core::doctor::{run_doctor, DoctorReport};

/// Execute the doctor command
pub async fn execute() -> Result<()> {
    let loaded = load_config();
    let mut report = run_doctor(loaded.as_ref().ok().map(|(_, _, config)| config));
    if let Err(e) = &loaded {
        report.add_config_issue(format!("{e:#}"));
    }

    if output::is_json() {
        let verdict = if report.fully_ready() {
            "ready"
        } else if report.ready_to_build() {
            "degraded"
        } else {
            "blocked"
        };
        output::print_json(&serde_json::json!({
            "status": verdict,
            "checks": report.checks,
            "config_issues": report.config_issues,
            "degraded_features": report.degraded_features(),
        }));
    } else if output::is_quiet() {
        for check in report.blockers() {
            eprintln!("{} {}: {}", status::ERROR, check.name, check.problem.as_deref().unwrap_or("missing"));
        }
        for issue in &report.config_issues {
            eprintln!("{} {issue}", status::ERROR);
        }
    } else {
        print_human(&report);
    }

    if !report.ready_to_build() {
        bail!("Host is not ready to build images. Run 'isoforge doctor' for details.");
    }
    Ok(())
}

fn print_human(report: &DoctorReport) {
    print_info("Checking build prerequisites...");
    println!();

    for check in &report.checks {
        if check.ok {
            let version = check.version.as_deref().map(|v| format!(" ({v})")).unwrap_or_default();
            println!("  {} {}{version}", status::SUCCESS, check.name);
            continue;
        }
        let marker = if check.blocks_build() { status::ERROR } else { status::WARNING };
        println!("  {marker} {} [needed for {}]", check.name, check.gate.feature());
        if let Some(problem) = &check.problem {
            print_detail(&format!("  {problem}"));
        }
        if let Some(fix) = &check.fix {
            print_detail(&format!("  fix: {fix}"));
        }
    }

    if !report.config_issues.is_empty() {
        println!();
        print_warning("Configuration issues:");
        for issue in &report.config_issues {
            print_detail(&format!("• {issue}"));
        }
    }

    println!();
    let summary = format!("{}/{} checks passed", report.ok_count(), report.checks.len());
    if report.fully_ready() {
        print_success(&format!("{summary}; ready to build"));
    } else if report.ready_to_build() {
        print_success(&format!("{summary}; builds will work"));
        for feature in report.degraded_features() {
            print_detail(&format!("Unavailable: {feature}"));
        }
    } else {
        println!("{} {summary}", status::ERROR);
    }
}
