// Author: Dustin Pilgrim
// License: MIT

pub mod jira;

use std::fmt;

use async_trait::async_trait;

pub use jira::JiraTracker;

/// Basic-auth credentials for the tracker account.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn validate(&self) -> Result<(), ExternalServiceError> {
        let missing: Vec<&str> = [
            ("base_url", &self.base_url),
            ("email", &self.email),
            ("api_token", &self.api_token),
        ]
        .iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| *k)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ExternalServiceError::NotConfigured(format!(
                "missing {}",
                missing.join(", ")
            )))
        }
    }
}

/// One issue from the tracker. The engine only consumes `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedIssue {
    pub key: String,
    pub summary: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalServiceError {
    NotConfigured(String),
    Unreachable(String),
    Rejected { status: u16, body: String },
    Malformed(String),
}

impl fmt::Display for ExternalServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalServiceError::NotConfigured(msg) => {
                write!(f, "Tracker is not configured: {msg}")
            }
            ExternalServiceError::Unreachable(msg) => write!(f, "Tracker unreachable: {msg}"),
            ExternalServiceError::Rejected { status, .. } if *status == 401 || *status == 403 => {
                write!(f, "Tracker rejected the credentials (HTTP {status})")
            }
            ExternalServiceError::Rejected { status, body } => {
                write!(f, "Tracker request failed with HTTP {status}: {}", clip(body, 200))
            }
            ExternalServiceError::Malformed(msg) => {
                write!(f, "Tracker response was malformed: {msg}")
            }
        }
    }
}

impl std::error::Error for ExternalServiceError {}

fn clip(s: &str, max: usize) -> String {
    let s = s.trim();
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}

#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Returns the account's display name.
    async fn test_connection(&self, creds: &Credentials) -> Result<String, ExternalServiceError>;

    /// Issues assigned to the caller and in progress, newest first.
    /// `projects` is a comma or space separated list of project keys; empty means all.
    async fn fetch_assigned_in_progress(
        &self,
        creds: &Credentials,
        projects: &str,
    ) -> Result<Vec<TrackedIssue>, ExternalServiceError>;
}
