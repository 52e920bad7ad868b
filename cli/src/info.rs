use std::fmt::Display;

use anyhow::Result;
use byte_unit::{Byte, UnitType};
use chrono::{DateTime, Local, SubsecRound, Timelike, Utc};
use cloakroom_sdk::{ManifestEntry, Vault};
use prettytable::{format::FormatBuilder, row, Table};
use tracing::info;

pub fn list_entries(vault: &Vault) -> Result<()> {
    let manifest = vault.load_manifest()?;
    info!("root: {}", vault.root().display());
    info!("manifest: {}", vault.manifest_name());
    info!("created at: {}", pretty_time(manifest.created_at()));
    info!("files: {}", manifest.len());
    if manifest.is_empty() {
        return Ok(());
    }

    info!("");
    let mut entries: Vec<_> = manifest.entries().collect();
    entries.sort_by(|a, b| a.1.path.cmp(&b.1.path));
    let mut table = Table::new();
    table.set_format(FormatBuilder::new().column_separator(' ').build());
    for (name, entry) in entries {
        let modified_at = pretty_time(entry.modified_at);
        table.add_row(row![modified_at, pretty_status(entry), name, entry.path]);
    }
    info!("{table}");
    Ok(())
}

const DATE_TIME_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

fn pretty_time(value: DateTime<Utc>) -> impl Display {
    let mut local = DateTime::<Local>::from(value);
    if local.nanosecond() != 0 {
        local = local.trunc_subsecs(0) + chrono::Duration::seconds(1);
    }

    local.format(DATE_TIME_FORMAT)
}

fn pretty_status(entry: &ManifestEntry) -> String {
    let mode = if let Some(unix_mode) = entry.unix_mode {
        format!("{:o}", unix_mode & 0o777)
    } else {
        "FILE".into()
    };
    format!("{} {}", mode, pretty_size(entry.size))
}

pub fn pretty_size(size: u64) -> impl Display {
    Byte::from_u64(size)
        .get_appropriate_unit(UnitType::Decimal)
        .to_string()
}
