//! CLI command for `isoforge config`
//!
//! Prints the effective configuration: `config.toml` merged with defaults.
//! The file itself is never written.

use anyhow::Result;

use crate::cli::commands::load_config;
use crate::cli::output::{self, print_detail, print_info};

/// Execute config command
pub async fn execute() -> Result<()> {
    let (dirs, forge, config) = load_config()?;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "config_file": dirs.config_path(),
            "config_file_exists": dirs.config_path().exists(),
            "file": forge,
            "effective": {
                "work_dir": config.work_dir,
                "output_dir": config.output_dir,
                "image_name": config.image_name,
                "image_label": config.image_label,
                "publisher": config.publisher,
                "application": config.application,
                "hostname": config.hostname,
                "exclusions": config.exclusions,
                "exclude_dirs": config.exclude_dirs,
                "username": config.user.username,
                "copy_from": config.user.copy_from,
                "autologin": config.user.autologin,
                "include_custom_repos": config.include_custom_repos,
                "session_packages": config.session_packages,
                "builder": config.builder,
                "profile_source": config.host.profile_source,
                "package_cache": config.host.package_cache,
                "min_package_count": config.thresholds.min_package_count,
            },
        }));
        return Ok(());
    }

    let path = dirs.config_path();
    if path.exists() {
        print_info(&format!("Configuration file: {}", path.display()));
    } else {
        print_info(&format!("Configuration file: {} (not present, using defaults)", path.display()));
    }
    println!();

    print_detail(&format!("Work directory:    {}", config.work_dir.display()));
    print_detail(&format!("Output directory:  {}", config.output_dir.display()));
    print_detail(&format!("Base profile:      {}", config.host.profile_source.display()));
    print_detail(&format!("Package cache:     {}", config.host.package_cache.display()));
    print_detail(&format!("Image name:        {}", config.image_name));
    print_detail(&format!("Image label:       {}", config.image_label));
    print_detail(&format!("Publisher:         {}", config.publisher));
    print_detail(&format!("Live hostname:     {}", config.hostname));
    print_detail(&format!("Live user:         {}", config.user.username));
    print_detail(&format!(
        "Home seeded from:  {}",
        config.user.copy_from.as_deref().unwrap_or("(blank template)")
    ));
    print_detail(&format!("Autologin:         {}", config.user.autologin));
    print_detail(&format!("Custom repos/AUR:  {}", config.include_custom_repos));
    print_detail(&format!(
        "Excluded packages: {}",
        if config.exclusions.is_empty() { "(none)".to_string() } else { config.exclusions.join(", ") }
    ));
    print_detail(&format!("Excluded dirs:     {}", config.exclude_dirs.len()));
    print_detail(&format!("Image builder:     {}", config.builder));

    Ok(())
}
