//! CLI command implementation for `isoforge devices`

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::output::{self, print_detail, print_info};
use crate::core::devices::{removable_devices, SYS_BLOCK};
use crate::infra::process::SystemRunner;

/// Execute the devices command
pub async fn execute() -> Result<()> {
    let devices = removable_devices(&SystemRunner, Path::new(SYS_BLOCK))
        .context("Failed to list block devices")?;

    if output::is_json() {
        output::print_json(&devices);
        return Ok(());
    }

    if devices.is_empty() {
        print_info("No removable devices found");
        return Ok(());
    }

    print_info("Removable devices:");
    for device in &devices {
        print_detail(&format!(
            "{:<12} {:>8}  {}",
            device.path.display(),
            device.size,
            device.model
        ));
    }
    Ok(())
}
