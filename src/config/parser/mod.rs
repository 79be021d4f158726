// Author: Dustin Pilgrim
// License: MIT

use std::path::PathBuf;

use eyre::{eyre, Result};
use rune_cfg::RuneConfig;

use crate::config::model::{Config, TrackerSettings};
use crate::core::engine::ResumePolicy;
use crate::tracker::Credentials;

pub const ENV_JIRA_TOKEN: &str = "TICKTRACK_JIRA_TOKEN";
pub const ENV_JIRA_URL: &str = "TICKTRACK_JIRA_URL";

/// Every recognised key as read from the file, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSettings {
    pub data_path: Option<String>,
    pub resume_policy: Option<String>,
    pub base_url: Option<String>,
    pub email: Option<String>,
    pub api_token: Option<String>,
    pub project: Option<String>,
}

// Accepts both `snake_case` and `kebab-case` spellings of the last segment.
fn get_str(config: &RuneConfig, key: &str) -> Option<String> {
    config
        .get::<String>(key)
        .or_else(|_| config.get::<String>(&key.replace('_', "-")))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn read_settings(config: &RuneConfig) -> RawSettings {
    RawSettings {
        data_path: get_str(config, "ticktrack.data_path"),
        resume_policy: get_str(config, "ticktrack.resume_policy"),
        base_url: get_str(config, "ticktrack.jira.base_url"),
        email: get_str(config, "ticktrack.jira.email"),
        api_token: get_str(config, "ticktrack.jira.api_token"),
        project: get_str(config, "ticktrack.jira.project"),
    }
}

/// Environment wins over the file for the token and the base URL.
pub fn apply_env(raw: &mut RawSettings, env: impl Fn(&str) -> Option<String>) {
    let pick = |name: &str| env(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(token) = pick(ENV_JIRA_TOKEN) {
        raw.api_token = Some(token);
    }
    if let Some(url) = pick(ENV_JIRA_URL) {
        raw.base_url = Some(url);
    }
}

pub fn build_config(raw: RawSettings) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(p) = raw.data_path {
        cfg.data_path = expand_home(&p);
    }

    if let Some(policy) = raw.resume_policy {
        cfg.resume_policy = policy
            .parse::<ResumePolicy>()
            .map_err(|e| eyre!("ticktrack.resume_policy: {e}"))?;
    }

    let any_tracker_key = raw.base_url.is_some() || raw.email.is_some() || raw.api_token.is_some();
    if any_tracker_key {
        cfg.tracker = Some(TrackerSettings {
            credentials: Credentials {
                base_url: raw.base_url.unwrap_or_default(),
                email: raw.email.unwrap_or_default(),
                api_token: raw.api_token.unwrap_or_default(),
            },
            project: raw.project.unwrap_or_default(),
        });
    }

    Ok(cfg)
}

fn expand_home(p: &str) -> PathBuf {
    if let Some(rest) = p.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(p)
}
