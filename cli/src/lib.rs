pub mod cli;
pub mod config;
mod info;
pub mod term;

use std::{
    io::Write,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Mutex,
    time::{Duration, Instant},
};

use anyhow::{bail, Result};
use cli::{Cli, Command};
use cloakroom_sdk::{EncryptionKey, PassSummary, Vault};
use config::{default_log_path, Config};
use info::{list_entries, pretty_size};
use term::{set_status, TermLayer};
use tracing::{info, warn};
use tracing_subscriber::{
    prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

#[cfg(feature = "keyring")]
const KEYRING_SERVICE: &str = "cloakroom";

#[cfg(feature = "keyring")]
fn fetch_keyring_secret() -> Result<String> {
    let user = "cloakroom_encryption_key";
    let entry = keyring::Entry::new(KEYRING_SERVICE, user)?;
    match entry.get_password() {
        Ok(password) => Ok(password),
        Err(err) => {
            if matches!(err, keyring::Error::NoEntry) {
                info!("entry {user:?} not found in keyring");
                let value = rpassword::prompt_password("Input encryption key: ")?;
                if value.is_empty() {
                    bail!("no value provided");
                }
                match entry.set_password(&value) {
                    Ok(()) => {
                        info!("entry {user:?} saved to keyring");
                    }
                    Err(err) => {
                        warn!("failed to save secret in keyring: {err}");
                    }
                }
                Ok(value)
            } else {
                Err(err.into())
            }
        }
    }
}

#[cfg(not(feature = "keyring"))]
fn fetch_keyring_secret() -> Result<String> {
    bail!("keyring is not supported in this build")
}

fn fetch_key(cli: &Cli, config: &Config) -> Result<EncryptionKey> {
    if config.use_keyring && config.key_file.is_some() {
        bail!(
            "invalid config: if `use_keyring` is true, \
            `key_file` cannot be specified in the config"
        );
    }
    if let Some(path) = cli.key_file.as_ref().or(config.key_file.as_ref()) {
        let text = fs_err::read_to_string(path)?;
        return Ok(text.trim().parse()?);
    }
    if config.use_keyring {
        return Ok(fetch_keyring_secret()?.trim().parse()?);
    }
    bail!("missing `key_file` or `use_keyring` in config")
}

pub fn run(cli: Cli, config: Config) -> Result<ExitCode> {
    let key = fetch_key(&cli, &config)?;
    match cli.command {
        Command::Encrypt { root, files } => {
            let vault = Vault::open(&root, &key)?;
            let status = set_status(format!("Encrypting {}", vault.root().display()));
            let started = Instant::now();
            let summary = if files.is_empty() {
                vault.encrypt_all(&config.exclude)?
            } else {
                vault.encrypt_files(&files)?
            };
            drop(status);
            report_pass("Encrypted", &summary, started.elapsed());
            Ok(exit_code(&summary))
        }
        Command::Decrypt { root } => {
            let vault = Vault::open(&root, &key)?;
            let status = set_status(format!("Restoring {}", vault.root().display()));
            let started = Instant::now();
            let summary = vault.decrypt_all()?;
            drop(status);
            report_pass("Restored", &summary, started.elapsed());
            Ok(exit_code(&summary))
        }
        Command::List { root } => {
            let vault = Vault::open(&root, &key)?;
            list_entries(&vault)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::GenerateKey { .. } => unreachable!(),
    }
}

fn report_pass(verb: &str, summary: &PassSummary, elapsed: Duration) {
    info!(
        "{verb} {} files ({}) in {}",
        summary.processed,
        pretty_size(summary.original_bytes),
        humantime::format_duration(Duration::from_secs(elapsed.as_secs())),
    );
    if summary.skipped > 0 {
        info!("Skipped {} files that were already encrypted", summary.skipped);
    }
    if summary.failed > 0 {
        warn!("Failed to process {} files", summary.failed);
    }
}

// Exit code 2 reports a pass that completed with per-file failures.
fn exit_code(summary: &PassSummary) -> ExitCode {
    if summary.has_failures() {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}

pub fn setup_logger(log_file: Option<PathBuf>, log_filter: String) -> Result<()> {
    // Defaults to stdout if `data_dir()` fails.
    let log_file = log_file.or_else(|| {
        default_log_path()
            .inspect_err(|err| eprintln!("{err}"))
            .ok()
    });
    let fmt_layer =
        tracing_subscriber::fmt::layer().with_writer(Mutex::new(log_writer(log_file.as_deref())?));
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(EnvFilter::try_new(log_filter)?)
        .with(TermLayer)
        .init();
    Ok(())
}

fn log_writer(path: Option<&Path>) -> Result<Box<dyn Write + Send>> {
    Ok(match path {
        Some(path) => Box::new(
            fs_err::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?,
        ),
        None => Box::new(std::io::stdout()),
    })
}
