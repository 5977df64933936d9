//! CLI command implementation for `isoforge packages`
//!
//! Runs the package classifier against the host and prints the inventory.

use anyhow::{Context, Result};

use crate::cli::output::{self, create_spinner, print_detail, print_info};
use crate::core::classify::{self, PackageOrigin};
use crate::infra::pacman::Pacman;
use crate::infra::process::SystemRunner;

/// Execute the packages command
pub async fn execute(non_repo_only: bool) -> Result<()> {
    let runner = SystemRunner;
    let pacman = Pacman::new(&runner);

    let installed = pacman
        .explicit_packages()
        .context("Failed to list explicitly installed packages")?;

    let spinner = create_spinner("Checking packages against the sync repositories...");
    let inventory = classify::classify(&pacman, &installed, |done, total| {
        spinner.set_message(format!("Checked {done}/{total} packages"));
    });
    spinner.finish_and_clear();

    let records: Vec<_> = inventory
        .sorted_for_display()
        .into_iter()
        .filter(|r| !non_repo_only || r.origin == PackageOrigin::NonRepository)
        .collect();

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "total": inventory.records.len(),
            "repository": inventory.repository().len(),
            "non_repository": inventory.non_repository().len(),
            "packages": records,
        }));
        return Ok(());
    }

    if output::is_quiet() {
        for record in &records {
            println!("{}", record.name);
        }
        return Ok(());
    }

    print_info(&format!(
        "{} packages: {} from repositories, {} from other sources",
        inventory.records.len(),
        inventory.repository().len(),
        inventory.non_repository().len()
    ));
    for record in &records {
        let origin = match record.origin {
            PackageOrigin::Repository => "repo",
            PackageOrigin::NonRepository => "AUR/local",
        };
        print_detail(&format!("{:<40} {origin}", record.name));
    }

    let skips = classify::split_official_only(&inventory);
    if !skips.distro_specific.is_empty() {
        println!();
        print_info("Distribution-specific packages (dropped with --official-only):");
        for name in &skips.distro_specific {
            print_detail(name);
        }
    }
    Ok(())
}
