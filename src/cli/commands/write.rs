//! CLI command implementation for `isoforge write`

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cli::output::{self, create_percent_bar, print_success};
use crate::core::events::Reporter;
use crate::core::flash::{require_confirmation, MediaWriter};
use crate::infra::process::SystemRunner;

/// Execute the write command
pub async fn execute(image: &Path, device: &Path, yes: bool) -> Result<()> {
    write_image(image, device, yes).await
}

/// Write `image` to `device`, asking first unless `yes`
pub async fn write_image(image: &Path, device: &Path, yes: bool) -> Result<()> {
    let cancel = CancellationToken::new();
    let (reporter, rx) = Reporter::channel();
    let writer = MediaWriter::new(Arc::new(SystemRunner))
        .with_reporter(reporter)
        .with_cancellation(cancel.clone());

    writer
        .preflight(image, device)
        .with_context(|| format!("Cannot write to {}", device.display()))?;
    if !yes {
        require_confirmation(image, device)?;
    }

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let image = image.to_path_buf();
    let target = device.to_path_buf();
    let worker = tokio::spawn(async move { writer.write(&image, &target).await });

    let bar = create_percent_bar("Writing image");
    output::render_events(rx, &bar).await;
    let joined = worker.await;
    bar.finish_and_clear();
    let result = joined
        .context("Write task failed")?
        .map_err(|e| anyhow!(e).context(format!("Failed to write {}", device.display())))?;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "status": "success",
            "image": result.image,
            "device": result.device,
            "bytes": result.bytes,
        }));
    } else {
        print_success(&format!(
            "Wrote {} to {}",
            result.image.display(),
            result.device.display()
        ));
    }
    Ok(())
}
