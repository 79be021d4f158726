// Author: Dustin Pilgrim
// License: MIT

use std::path::{Path, PathBuf};

use eyre::{eyre, Result, WrapErr};
use rune_cfg::RuneConfig;

pub mod model;
pub mod parser;

pub use model::{Config, TrackerSettings};

const SYSTEM_CONFIG: &str = "/etc/ticktrack/ticktrack.rune";

pub struct LoadedConfig {
    pub config: Config,
    /// `None` when running on built-in defaults.
    pub path: Option<PathBuf>,
}

pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ticktrack").join("ticktrack.rune"))
}

pub fn default_data_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ticktrack")
        .join("state.json")
}

/// `--config` first, then the user file, then the system file.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }

    if let Some(user) = user_config_path() {
        if user.exists() {
            return Some(user);
        }
    }

    let system = PathBuf::from(SYSTEM_CONFIG);
    system.exists().then_some(system)
}

pub fn load_from_path(path: &Path) -> Result<Config> {
    let rune = RuneConfig::from_file(path)
        .map_err(|e| eyre!("{e}"))
        .wrap_err_with(|| format!("failed to load config from {}", path.display()))?;

    let mut raw = parser::read_settings(&rune);
    parser::apply_env(&mut raw, |name| std::env::var(name).ok());

    parser::build_config(raw).wrap_err_with(|| format!("invalid config in {}", path.display()))
}

pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let Some(path) = resolve_config_path(explicit) else {
        let mut raw = parser::RawSettings::default();
        parser::apply_env(&mut raw, |name| std::env::var(name).ok());

        return Ok(LoadedConfig {
            config: parser::build_config(raw)?,
            path: None,
        });
    };

    if explicit.is_some() && !path.exists() {
        return Err(eyre!("config file {} does not exist", path.display()));
    }

    Ok(LoadedConfig {
        config: load_from_path(&path)?,
        path: Some(path),
    })
}
