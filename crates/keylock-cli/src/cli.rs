use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "keylock",
    about = "Encrypt one project secret file at rest with a key kept outside the repo",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Protected file (defaults to the config's `file`, then `.env`).
    #[arg(long, short, global = true)]
    pub file: Option<PathBuf>,

    /// Action to run; prints usage when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Encrypt the protected file, creating a key on first use.
    Encrypt,
    /// Decrypt the protected file after checking the key binding.
    Decrypt,
    /// Replace the key and re-encrypt the protected file under it.
    Rotate,
    /// Show whether the file is encrypted and whether the key matches.
    Status,
    /// Print version and exit.
    Version,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
