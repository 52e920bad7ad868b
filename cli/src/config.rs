use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context as _, Result};
use cloakroom_sdk::Rules;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub exclude: Rules,
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    #[serde(default)]
    pub use_keyring: bool,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exclude: Rules::default(),
            key_file: None,
            use_keyring: false,
            log_file: None,
            log_filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Loads the config from `custom_path` or from the default location.
    ///
    /// A missing config file is only an error when it was requested explicitly.
    pub fn load(custom_path: Option<&Path>) -> Result<Config> {
        let path = match custom_path {
            Some(path) => path.to_path_buf(),
            None => {
                let path = default_config_path()?;
                if !path.try_exists()? {
                    return Ok(Config::default());
                }
                path
            }
        };
        json5::from_str(&fs_err::read_to_string(&path)?)
            .with_context(|| format!("failed to parse config at {}", path.display()))
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| anyhow!("cannot find config dir"))?;
    Ok(config_dir.join("cloakroom.json5"))
}

pub fn default_log_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| anyhow!("cannot find data dir"))?;
    Ok(data_dir.join("cloakroom.log"))
}

fn default_log_filter() -> String {
    "info".into()
}
