use std::path::PathBuf;

use clap::{Parser, Subcommand};
use cloakroom_sdk::TreePath;

#[derive(Debug, Parser)]
pub struct Cli {
    #[clap(long)]
    pub config: Option<PathBuf>,
    #[clap(long)]
    pub key_file: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    Encrypt {
        root: PathBuf,
        files: Vec<TreePath>,
    },
    Decrypt {
        root: PathBuf,
    },
    List {
        root: PathBuf,
    },
    GenerateKey {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
