mod cli;
mod config;
mod identity;
mod storage;

use crate::cli::ConfigCommand;
use clap::{error::ErrorKind, CommandFactory, Parser};
use color_eyre::Result;
use keylock_core::LockError;
use keylock_storage::{
    key_store::KeyStore,
    protected_file::{FileState, ProtectedFile, Status},
};
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Entry point: one action per process run.
fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = match cli::Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if err.kind() == ErrorKind::InvalidSubcommand => return print_usage(),
        Err(err) => err.exit(),
    };
    let Some(command) = cli.command else {
        return print_usage();
    };

    let config = config::load()?;
    match command {
        cli::Command::Version => print_version(),
        cli::Command::Config(ConfigCommand::Init) => init_config(&config)?,
        action => {
            let file = storage::protected_file(&config, cli.file)?;
            if let Err(err) = run_action(&action, &file, &config) {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters; default to warn so console output stays clean.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_usage() -> Result<()> {
    cli::Cli::command().print_help()?;
    println!();
    Ok(())
}

fn print_version() {
    println!("keylock {}", env!("CARGO_PKG_VERSION"));
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

fn run_action<K: KeyStore>(
    action: &cli::Command,
    file: &ProtectedFile<K>,
    config: &config::Config,
) -> Result<(), LockError> {
    let shown = file.path().display();
    match action {
        cli::Command::Encrypt => {
            let operator = identity::resolve_operator(config)?;
            file.encrypt(&operator)?;
            println!("Encrypted {shown} (key: {})", file.keys().location().display());
        }
        cli::Command::Decrypt => {
            let binding = file.decrypt()?;
            println!(
                "Decrypted {shown} (last encrypted by {})",
                binding.last_encrypted_by
            );
        }
        cli::Command::Rotate => {
            let operator = identity::resolve_operator(config)?;
            file.rotate(&operator)?;
            println!("Rotated key and re-encrypted {shown}");
        }
        cli::Command::Status => print_status(file.path(), &file.status()?),
        cli::Command::Version | cli::Command::Config(_) => {}
    }
    Ok(())
}

fn print_status(path: &Path, status: &Status) {
    let state = match status.state {
        FileState::Encrypted => "encrypted",
        FileState::Unencrypted => "plaintext",
    };
    println!("File:    {} ({state})", path.display());
    println!(
        "Key:     {}",
        if status.key_present { "present" } else { "missing" }
    );
    match &status.binding {
        Some(binding) => {
            println!(
                "Binding: {} by {} at {}",
                binding.key_status.as_str(),
                binding.last_encrypted_by,
                binding.timestamp_label()
            );
            match status.binding_matches {
                Some(true) => println!("Match:   current key matches"),
                Some(false) => println!("Match:   MISMATCH (key differs from last encryption)"),
                None => {}
            }
        }
        None => println!("Binding: none"),
    }
}
