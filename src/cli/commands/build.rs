//! Build command implementation
//!
//! Implements `isoforge build`: runs the build pipeline on a worker task,
//! renders its events, writes the checksum sidecar and optionally writes the
//! image to a device.

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::cli::commands::{load_config, write};
use crate::cli::output::{self, create_percent_bar, print_detail, print_success, print_warning};
use crate::config::defaults::REUSE_MAX_AGE_SECS;
use crate::core::build_config::BuildConfig;
use crate::core::events::Reporter;
use crate::core::pipeline::Pipeline;
use crate::core::report::{format_size, BuildOutcome, BuildReport, PayloadStatus};
use crate::core::verify;
use crate::infra::process::{self, SystemRunner};

/// Build options
#[derive(Args, Debug, Default)]
pub struct BuildArgs {
    /// Work directory (wiped on every build)
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// Output directory (wiped on every build)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Image name prefix
    #[arg(long)]
    pub name: Option<String>,

    /// Volume label
    #[arg(long)]
    pub label: Option<String>,

    /// Package to leave out (repeatable, comma separated)
    #[arg(long = "exclude", value_name = "PKG", value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Directory pattern to leave out of the image (repeatable)
    #[arg(long = "exclude-dir", value_name = "PATTERN")]
    pub exclude_dir: Vec<String>,

    /// Live user account name
    #[arg(long)]
    pub username: Option<String>,

    /// Seed the live user's home from this host account
    #[arg(long, value_name = "USER")]
    pub copy_from_user: Option<String>,

    /// Do not log the live user in automatically
    #[arg(long)]
    pub no_autologin: bool,

    /// Only include packages from the official repositories
    #[arg(long)]
    pub official_only: bool,

    /// Reuse an image built in the last 24 hours instead of building
    #[arg(long)]
    pub reuse_recent: bool,

    /// Image builder command
    #[arg(long, value_name = "COMMAND")]
    pub builder: Option<String>,

    /// Write the image to this device after a successful build
    #[arg(long)]
    pub device: Option<PathBuf>,

    /// Skip the confirmation prompt before writing
    #[arg(short, long)]
    pub yes: bool,
}

impl BuildArgs {
    /// Overlay command-line values on the configuration file
    pub fn apply(&self, config: &mut BuildConfig) {
        if let Some(dir) = &self.work_dir {
            config.work_dir.clone_from(dir);
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir.clone_from(dir);
        }
        if let Some(name) = &self.name {
            config.image_name.clone_from(name);
        }
        if let Some(label) = &self.label {
            config.image_label.clone_from(label);
        }
        config
            .exclusions
            .extend(self.exclude.iter().map(|e| e.trim().to_string()).filter(|e| !e.is_empty()));
        config.exclude_dirs.extend(self.exclude_dir.iter().cloned());
        if let Some(username) = &self.username {
            config.user.username.clone_from(username);
        }
        if let Some(source) = &self.copy_from_user {
            config.user.copy_from = Some(source.clone());
        }
        if self.no_autologin {
            config.user.autologin = false;
        }
        if self.official_only {
            config.include_custom_repos = false;
        }
        if let Some(builder) = &self.builder {
            config.builder.clone_from(builder);
        }
    }
}

/// Execute the build command
pub async fn execute(args: BuildArgs) -> Result<()> {
    let (_, _, mut config) = load_config()?;
    args.apply(&mut config);
    config.validate().context("Invalid build configuration")?;

    if !process::running_as_root() {
        bail!("Building an image requires root privileges (run with sudo)");
    }
    if args.device.is_some() && !args.yes && !std::io::stdin().is_terminal() {
        bail!(
            "Cannot prompt for confirmation in non-interactive mode.\n\
             Use --yes to write the image without confirmation."
        );
    }

    tracing::info!(
        "Building {} in {}",
        config.image_name,
        config.work_dir.display()
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let (reporter, rx) = Reporter::channel();
    let mut pipeline = Pipeline::new(config, Arc::new(SystemRunner))
        .with_reporter(reporter)
        .with_cancellation(cancel.clone());
    if args.reuse_recent {
        pipeline = pipeline.with_reuse_recent(Duration::from_secs(REUSE_MAX_AGE_SECS));
    }

    let worker = tokio::spawn(pipeline.run());
    let bar = create_percent_bar("Building image");
    output::render_events(rx, &bar).await;
    let joined = worker.await;
    bar.finish_and_clear();
    let outcome = joined.context("Build task failed")?;

    let report = match outcome {
        BuildOutcome::Succeeded(report) => report,
        BuildOutcome::Failed(e) => return Err(anyhow!(e).context("Build failed")),
        BuildOutcome::Cancelled => bail!("Build cancelled by operator"),
    };

    let checksum = match verify::write_checksum(&report.image) {
        Ok(path) => Some(path),
        Err(e) => {
            print_warning(&format!("Could not write checksum: {e}"));
            None
        }
    };
    print_report(&report, checksum.as_ref());

    if let Some(device) = &args.device {
        if cancel.is_cancelled() {
            bail!("Build cancelled by operator");
        }
        write::write_image(&report.image, device, args.yes).await?;
    }

    Ok(())
}

fn print_report(report: &BuildReport, checksum: Option<&PathBuf>) {
    if output::is_json() {
        output::print_json(&serde_json::json!({
            "status": "success",
            "report": report,
            "checksum": checksum,
        }));
        return;
    }

    for warning in &report.warnings {
        print_warning(&warning.to_string());
    }
    print_success(&format!("Image ready: {}", report.image.display()));
    print_detail(&format!("Size: {}", format_size(report.image_size)));
    print_detail(&format!("Type: {}", report.signature));
    match &report.payload {
        PayloadStatus::Found { path, size } => {
            print_detail(&format!("squashfs: {} ({})", path.display(), format_size(*size)));
        }
        PayloadStatus::PresumedEmbedded => print_detail("squashfs: embedded in the image"),
    }
    if report.reused {
        print_detail("Reused from an earlier build; not validated against this configuration");
    } else {
        print_detail(&format!("Packages: {}", report.package_count));
    }
    if !report.fatal_signals.is_empty() {
        print_detail(&format!(
            "{} error lines in the build output did not prevent a usable image",
            report.fatal_signals.len()
        ));
    }
    if let Some(path) = checksum {
        print_detail(&format!("Checksum: {}", path.display()));
    }
    print_detail("Write it to a USB stick with: isoforge write <image> --device /dev/sdX");
}
