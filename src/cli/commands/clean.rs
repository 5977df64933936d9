//! CLI implementation for `isoforge clean` command
//!
//! Removes the work and output directories of the effective configuration.

use anyhow::{Context, Result};

use crate::cli::commands::load_config;
use crate::cli::output::{self, print_detail, print_success};
use crate::core::clean::{clean_build_dirs, has_build_artifacts};

/// Execute the clean command
pub async fn execute() -> Result<()> {
    let (_, _, config) = load_config()?;

    if !has_build_artifacts(&config) {
        if output::is_json() {
            output::print_json(&serde_json::json!({ "removed": [] }));
        } else {
            print_success("Nothing to clean");
        }
        return Ok(());
    }

    let result = clean_build_dirs(&config).context("Failed to clean build directories")?;

    if output::is_json() {
        output::print_json(&serde_json::json!({ "removed": result.removed }));
    } else if result.removed.is_empty() {
        print_success("Nothing to clean");
    } else {
        print_success("Cleaned build directories:");
        for dir in &result.removed {
            print_detail(&format!("Removed {}/", dir.display()));
        }
    }

    Ok(())
}
