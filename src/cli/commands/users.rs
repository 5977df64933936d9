//! CLI command implementation for `isoforge users`

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::output::{self, print_detail, print_info};
use crate::config::paths::HOST_PASSWD;
use crate::core::users::seedable_accounts;

/// Execute the users command
pub async fn execute() -> Result<()> {
    let accounts = seedable_accounts(Path::new(HOST_PASSWD)).context("Failed to read host accounts")?;

    if output::is_json() {
        output::print_json(&accounts);
        return Ok(());
    }

    if accounts.is_empty() {
        print_info("No regular accounts with a home directory found");
        return Ok(());
    }

    print_info("Accounts usable with --copy-from-user:");
    for account in &accounts {
        print_detail(&format!("{:<20} uid {:<6} {}", account.name, account.uid, account.home.display()));
    }
    Ok(())
}
