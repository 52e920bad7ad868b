use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use cloakroom::{
    cli::{Cli, Command},
    config::Config,
    run, setup_logger,
};
use cloakroom_sdk::EncryptionKey;
use tracing::error;

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Command::GenerateKey { output } = &cli.command {
        return generate_key(output.as_deref());
    }
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = setup_logger(config.log_file.clone(), config.log_filter.clone()) {
        eprintln!("Error: {err:#}");
        return ExitCode::FAILURE;
    }
    match run(cli, config) {
        Ok(exit_code) => exit_code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn generate_key(output: Option<&Path>) -> ExitCode {
    let key = EncryptionKey::generate();
    let result = match output {
        Some(path) => write_key_file(path, &key),
        None => {
            println!("{}", key.display_unmasked());
            Ok(())
        }
    };
    if let Err(err) = result {
        eprintln!("Error: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn write_key_file(path: &Path, key: &EncryptionKey) -> std::io::Result<()> {
    fs_err::write(path, format!("{}\n", key.display_unmasked()))?;
    #[cfg(target_family = "unix")]
    {
        use std::fs::Permissions;
        use std::os::unix::prelude::PermissionsExt;

        fs_err::set_permissions(path, Permissions::from_mode(0o600))?;
    }
    Ok(())
}
