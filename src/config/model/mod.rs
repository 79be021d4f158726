// Author: Dustin Pilgrim
// License: MIT

use std::path::PathBuf;

use crate::core::engine::ResumePolicy;
use crate::tracker::Credentials;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSettings {
    pub credentials: Credentials,
    /// Comma or space separated project keys, empty for all projects.
    pub project: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_path: PathBuf,
    pub resume_policy: ResumePolicy,
    pub tracker: Option<TrackerSettings>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: crate::config::default_data_path(),
            resume_policy: ResumePolicy::default(),
            tracker: None,
        }
    }
}

impl Config {
    /// One-line summary for the startup log. Never includes the token.
    pub fn describe(&self) -> String {
        let tracker = match &self.tracker {
            Some(t) => format!(
                "jira {} as {}{}",
                t.credentials.base_url,
                t.credentials.email,
                if t.project.is_empty() {
                    String::new()
                } else {
                    format!(" (projects: {})", t.project)
                }
            ),
            None => "none".to_string(),
        };

        format!(
            "data_path={}, resume_policy={}, tracker={}",
            self.data_path.display(),
            self.resume_policy,
            tracker
        )
    }
}
