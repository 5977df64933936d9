//! Argument parsing for the isoforge binary
//!
//! Each subcommand parses its flags into the domain types and hands them to
//! [`crate::core`]; progress and results go through [`output`].

pub mod commands;
pub mod output;

use anyhow::Result;
use clap::Parser;

use commands::Commands;

/// Build a bootable Arch Linux image from the running system
///
/// `isoforge build` collects the installed packages, the live user and the
/// host configuration into an archiso profile and runs mkarchiso on it.
/// `isoforge write` copies the finished image to a removable device.
/// Both need root.
#[derive(Parser, Debug)]
#[command(name = "isoforge", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Execute the CLI command
    pub async fn run(self) -> Result<()> {
        if let Some(cmd) = self.command {
            cmd.run().await
        } else {
            // No subcommand provided, show help
            use clap::CommandFactory;
            let mut cmd = Self::command();
            cmd.print_help()?;
            Ok(())
        }
    }
}
