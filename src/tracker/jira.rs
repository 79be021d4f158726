// Author: Dustin Pilgrim
// License: MIT

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{header, Client, RequestBuilder};
use serde_json::Value;

use super::{Credentials, ExternalServiceError, IssueTracker, TrackedIssue};

const REQUEST_TIMEOUT_SECS: u64 = 20;
const MAX_RESULTS: u32 = 100;
const SEARCH_FIELDS: &str = "summary,status";

static PROJECT_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").expect("static project key pattern"));

/// Jira Cloud REST v3 client.
#[derive(Clone)]
pub struct JiraTracker {
    client: Client,
}

impl JiraTracker {
    pub fn new() -> Result<Self, ExternalServiceError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .default_headers(headers)
            .build()
            .map_err(|e| {
                ExternalServiceError::NotConfigured(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client })
    }

    async fn request_json(&self, request: RequestBuilder) -> Result<Value, ExternalServiceError> {
        let response = request
            .send()
            .await
            .map_err(|e| ExternalServiceError::Unreachable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExternalServiceError::Unreachable(format!("response read failed: {e}")))?;

        if !status.is_success() {
            return Err(ExternalServiceError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| ExternalServiceError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl IssueTracker for JiraTracker {
    async fn test_connection(&self, creds: &Credentials) -> Result<String, ExternalServiceError> {
        creds.validate()?;

        let request = self
            .client
            .get(endpoint(&creds.base_url, "rest/api/3/myself"))
            .basic_auth(&creds.email, Some(&creds.api_token));

        let payload = self.request_json(request).await?;
        parse_identity(&payload)
    }

    async fn fetch_assigned_in_progress(
        &self,
        creds: &Credentials,
        projects: &str,
    ) -> Result<Vec<TrackedIssue>, ExternalServiceError> {
        creds.validate()?;
        let jql = build_jql(projects)?;

        tracing::debug!("jira: search jql={jql}");

        let request = self
            .client
            .get(endpoint(&creds.base_url, "rest/api/3/search/jql"))
            .basic_auth(&creds.email, Some(&creds.api_token))
            .query(&[
                ("jql", jql),
                ("fields", SEARCH_FIELDS.to_string()),
                ("maxResults", MAX_RESULTS.to_string()),
            ]);

        let payload = self.request_json(request).await?;
        parse_search_response(&payload)
    }
}

fn endpoint(base: &str, path: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    let suffix = path.trim_start_matches('/');
    format!("{base}/{suffix}")
}

/// Split a project filter on commas/whitespace and validate every key.
pub fn parse_project_filter(raw: &str) -> Result<Vec<String>, ExternalServiceError> {
    let mut out: Vec<String> = Vec::new();

    for part in raw.split(|c: char| c == ',' || c.is_whitespace()) {
        let key = part.trim().to_uppercase();
        if key.is_empty() {
            continue;
        }
        if !PROJECT_KEY.is_match(&key) {
            return Err(ExternalServiceError::NotConfigured(format!(
                "invalid project key '{}'",
                part.trim()
            )));
        }
        if !out.contains(&key) {
            out.push(key);
        }
    }

    Ok(out)
}

pub fn build_jql(projects: &str) -> Result<String, ExternalServiceError> {
    let keys = parse_project_filter(projects)?;

    let mut jql = String::from(r#"assignee = currentUser() AND status = "In Progress""#);
    if !keys.is_empty() {
        let quoted: Vec<String> = keys.iter().map(|k| format!("\"{k}\"")).collect();
        jql.push_str(&format!(" AND project in ({})", quoted.join(",")));
    }
    jql.push_str(" ORDER BY updated DESC");

    Ok(jql)
}

pub fn parse_identity(payload: &Value) -> Result<String, ExternalServiceError> {
    payload
        .get("displayName")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ExternalServiceError::Malformed("missing displayName".into()))
}

pub fn parse_search_response(payload: &Value) -> Result<Vec<TrackedIssue>, ExternalServiceError> {
    let issues = payload
        .get("issues")
        .and_then(Value::as_array)
        .ok_or_else(|| ExternalServiceError::Malformed("missing issues array".into()))?;

    let mut out = Vec::with_capacity(issues.len());
    for issue in issues {
        let Some(key) = issue.get("key").and_then(Value::as_str) else {
            tracing::warn!("jira: skipping issue without key");
            continue;
        };

        let fields = issue.get("fields");
        let summary = fields
            .and_then(|f| f.get("summary"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let status = fields
            .and_then(|f| f.get("status"))
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        out.push(TrackedIssue {
            key: key.to_string(),
            summary: summary.to_string(),
            status: status.to_string(),
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn jql_without_projects() {
        assert_eq!(
            build_jql("").unwrap(),
            r#"assignee = currentUser() AND status = "In Progress" ORDER BY updated DESC"#
        );
    }

    #[test]
    fn jql_with_project_filter() {
        assert_eq!(
            build_jql("abc, DEF_2  abc").unwrap(),
            r#"assignee = currentUser() AND status = "In Progress" AND project in ("ABC","DEF_2") ORDER BY updated DESC"#
        );
    }

    #[test]
    fn project_filter_rejects_injection() {
        let err = build_jql(r#"ABC") OR ("1"="1"#).unwrap_err();
        assert!(matches!(err, ExternalServiceError::NotConfigured(_)));

        assert!(parse_project_filter("9AB").is_err());
    }

    #[test]
    fn endpoint_joins_cleanly() {
        assert_eq!(
            endpoint("https://acme.atlassian.net/", "/rest/api/3/myself"),
            "https://acme.atlassian.net/rest/api/3/myself"
        );
    }

    #[test]
    fn search_response_extracts_issues() {
        let payload = json!({
            "issues": [
                { "key": "ABC-1", "fields": { "summary": "Fix it", "status": { "name": "In Progress" } } },
                { "fields": { "summary": "no key" } },
                { "key": "ABC-2" }
            ]
        });

        let issues = parse_search_response(&payload).unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].key, "ABC-1");
        assert_eq!(issues[0].summary, "Fix it");
        assert_eq!(issues[0].status, "In Progress");
        assert_eq!(issues[1].key, "ABC-2");
        assert_eq!(issues[1].summary, "");
    }

    #[test]
    fn search_response_without_issues_is_malformed() {
        let err = parse_search_response(&json!({ "errorMessages": [] })).unwrap_err();
        assert!(matches!(err, ExternalServiceError::Malformed(_)));
    }

    #[test]
    fn identity_is_display_name() {
        assert_eq!(
            parse_identity(&json!({ "displayName": "Ada L" })).unwrap(),
            "Ada L"
        );
        assert!(parse_identity(&json!({})).is_err());
    }
}
