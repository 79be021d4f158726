// Author: Dustin Pilgrim
// License: MIT

use std::sync::Arc;

use crate::{
    config::TrackerSettings,
    core::{
        engine::AddOutcome,
        error::ValidationError,
        manager_msg::{ManagerMsg, Reply, Request},
        state::Session,
        ticket::normalize_ticket,
        utils::{format_duration, format_hms},
    },
    tracker::{ExternalServiceError, IssueTracker, TrackedIssue},
};

use super::Daemon;

const DEFAULT_SESSION_COUNT: usize = 10;

impl Daemon {
    /// Returns false once the daemon should stop.
    pub(super) fn handle_request(&mut self, request: Request, reply: Reply, now_ms: u64) -> bool {
        let out = match request {
            Request::Sync => {
                self.begin_sync(reply);
                return true;
            }
            Request::TestConnection => {
                self.begin_test_connection(reply);
                return true;
            }
            Request::Quit => {
                tracing::info!("daemon stopping (quit requested via IPC)");
                let _ = reply.send(Ok("Stopping ticktrack daemon".to_string()));
                return false;
            }
            other => self.handle_local(other, now_ms),
        };

        let _ = reply.send(out);
        true
    }

    fn handle_local(&mut self, request: Request, now_ms: u64) -> Result<String, String> {
        match request {
            Request::Select(ticket) => {
                self.engine
                    .select_ticket(ticket.as_deref(), now_ms)
                    .map_err(|e| e.to_string())?;

                Ok(match &self.engine.state().current_ticket {
                    Some(t) => format!("Selected {t}"),
                    None => "Selection cleared".to_string(),
                })
            }

            Request::Start => {
                let started = self.engine.start(now_ms).map_err(|e| e.to_string())?;
                let ticket = self.current_or_dash();
                Ok(if started {
                    format!("Started {ticket}")
                } else {
                    format!("Already running {ticket}")
                })
            }

            Request::Stop => Ok(match self.engine.stop(now_ms) {
                Some(s) => format!(
                    "Stopped {} ({} this session, {} total)",
                    s.ticket,
                    format_duration(s.elapsed),
                    format_hms(s.duration)
                ),
                None => "Not running".to_string(),
            }),

            Request::Reset => {
                let Some(ticket) = self.engine.state().current_ticket.clone() else {
                    return Err(ValidationError::NoTicketSelected.to_string());
                };

                Ok(match self.engine.reset(now_ms) {
                    Some(s) => format!("Reset {ticket} (logged {})", format_hms(s.duration)),
                    None => format!("Reset {ticket}"),
                })
            }

            Request::Add(raw) => match self.engine.add_ticket(&raw, now_ms) {
                Ok(AddOutcome::Added(t)) => Ok(format!("Added {t}")),
                Ok(AddOutcome::AlreadyPresent(t)) => Ok(format!("{t} already tracked; selected")),
                Err(e) => Err(e.to_string()),
            },

            Request::Replace(ids) => self
                .engine
                .replace_tickets(&ids, now_ms)
                .map(|tickets| format!("Tracking {} ticket(s)", tickets.len()))
                .map_err(|e| e.to_string()),

            Request::Save(patch) => {
                self.engine.save_state(&patch, now_ms);
                Ok("State saved".to_string())
            }

            Request::Info { json } => {
                let snap = self.engine.snapshot(now_ms, self.sync_in_flight);
                if json {
                    serde_json::to_string(&snap).map_err(|e| format!("encode failed: {e}"))
                } else {
                    Ok(snap.pretty_text)
                }
            }

            Request::Tickets => Ok(self.render_tickets(now_ms)),

            Request::Sessions(n) => Ok(render_sessions(
                &self.engine.sessions(),
                n.unwrap_or(DEFAULT_SESSION_COUNT),
            )),

            // handled in `handle_request`
            Request::Sync | Request::TestConnection | Request::Quit => {
                Err("request is not local".to_string())
            }
        }
    }

    fn current_or_dash(&self) -> String {
        self.engine
            .state()
            .current_ticket
            .clone()
            .unwrap_or_else(|| "-".to_string())
    }

    fn render_tickets(&self, now_ms: u64) -> String {
        let snap = self.engine.snapshot(now_ms, self.sync_in_flight);
        if snap.tickets.is_empty() {
            return "No tickets".to_string();
        }

        snap.tickets
            .iter()
            .map(|t| {
                let is_current = snap.current_ticket.as_deref() == Some(t.ticket.as_str());
                let marker = if is_current { '*' } else { ' ' };
                let status = if is_current && snap.running { "  running" } else { "" };
                format!("{marker} {:<14}{}{status}", t.ticket, format_hms(t.total_ms))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    // ---------------- tracker ----------------

    fn tracker_parts(&self) -> Result<(Arc<dyn IssueTracker>, TrackerSettings), String> {
        let settings = self.tracker_settings.clone().ok_or_else(|| {
            ExternalServiceError::NotConfigured(
                "set ticktrack.jira.base_url, email and api_token".to_string(),
            )
            .to_string()
        })?;

        let tracker = self
            .tracker
            .clone()
            .ok_or_else(|| "Tracker client is unavailable (see log)".to_string())?;

        Ok((tracker, settings))
    }

    fn begin_sync(&mut self, reply: Reply) {
        if self.sync_in_flight {
            let _ = reply.send(Err("A sync is already in progress".to_string()));
            return;
        }

        let (tracker, settings) = match self.tracker_parts() {
            Ok(parts) => parts,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        self.sync_in_flight = true;
        tracing::info!("sync: fetching assigned in-progress issues");

        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = tracker
                .fetch_assigned_in_progress(&settings.credentials, &settings.project)
                .await;

            if tx.send(ManagerMsg::SyncFinished { result, reply }).await.is_err() {
                tracing::warn!("sync: daemon gone before completion");
            }
        });
    }

    pub(super) fn finish_sync(
        &mut self,
        result: Result<Vec<TrackedIssue>, ExternalServiceError>,
        reply: Reply,
        now_ms: u64,
    ) {
        self.sync_in_flight = false;

        let out = match result {
            Ok(issues) => {
                for i in &issues {
                    tracing::debug!("sync: {} [{}] {}", i.key, i.status, i.summary);
                }
                let keys = trackable_keys(issues);
                self.engine
                    .replace_tickets(&keys, now_ms)
                    .map_err(|e| e.to_string())
                    .and_then(|tickets| synced_reply(&tickets))
            }
            Err(e) => {
                tracing::warn!("sync failed: {e}");
                Err(e.to_string())
            }
        };

        let _ = reply.send(out);
    }

    fn begin_test_connection(&self, reply: Reply) {
        let (tracker, settings) = match self.tracker_parts() {
            Ok(parts) => parts,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        tokio::spawn(async move {
            let out = match tracker.test_connection(&settings.credentials).await {
                Ok(name) => {
                    tracing::info!("tracker: connected as {name}");
                    Ok(format!("Connected as {name}"))
                }
                Err(e) => {
                    tracing::warn!("tracker: connection test failed: {e}");
                    Err(e.to_string())
                }
            };
            let _ = reply.send(out);
        });
    }
}

fn render_sessions(sessions: &[Session], n: usize) -> String {
    if sessions.is_empty() {
        return "No sessions".to_string();
    }

    let skip = sessions.len().saturating_sub(n);
    sessions[skip..]
        .iter()
        .map(|s| {
            format!(
                "{}  {:<14}{}  (total {})",
                s.date,
                s.ticket,
                format_hms(s.elapsed),
                format_hms(s.duration)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Issue keys the ticket list can hold; anything else is skipped.
fn trackable_keys(issues: Vec<TrackedIssue>) -> Vec<String> {
    issues
        .into_iter()
        .filter_map(|issue| match normalize_ticket(&issue.key) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!("sync: skipping {}: {e}", issue.key);
                None
            }
        })
        .collect()
}

fn synced_reply(tickets: &[String]) -> Result<String, String> {
    tracing::info!("sync: {} ticket(s) from tracker", tickets.len());

    if tickets.is_empty() {
        Ok("Synced: no in-progress tickets assigned".to_string())
    } else {
        Ok(format!(
            "Synced {} ticket(s): {}",
            tickets.len(),
            tickets.join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::JsonFileStore;
    use crate::tracker::Credentials;
    use async_trait::async_trait;
    use tokio::sync::oneshot;

    struct FakeTracker {
        issues: Result<Vec<TrackedIssue>, ExternalServiceError>,
    }

    #[async_trait]
    impl IssueTracker for FakeTracker {
        async fn test_connection(&self, _: &Credentials) -> Result<String, ExternalServiceError> {
            Ok("Ada L".to_string())
        }

        async fn fetch_assigned_in_progress(
            &self,
            _: &Credentials,
            _: &str,
        ) -> Result<Vec<TrackedIssue>, ExternalServiceError> {
            self.issues.clone()
        }
    }

    fn issue(key: &str) -> TrackedIssue {
        TrackedIssue {
            key: key.to_string(),
            summary: String::new(),
            status: "In Progress".to_string(),
        }
    }

    fn settings() -> TrackerSettings {
        TrackerSettings {
            credentials: Credentials {
                base_url: "https://acme.atlassian.net".into(),
                email: "me@acme.test".into(),
                api_token: "t".into(),
            },
            project: String::new(),
        }
    }

    fn daemon(
        dir: &tempfile::TempDir,
        tracker: Option<FakeTracker>,
    ) -> Daemon {
        let config = Config {
            data_path: dir.path().join("state.json"),
            tracker: tracker.as_ref().map(|_| settings()),
            ..Default::default()
        };
        let store = JsonFileStore::open(&config.data_path);
        let tracker = tracker.map(|t| Arc::new(t) as Arc<dyn IssueTracker>);
        Daemon::new(&config, store, tracker)
    }

    fn ask(d: &mut Daemon, request: Request, now_ms: u64) -> Result<String, String> {
        let (tx, mut rx) = oneshot::channel();
        assert!(d.handle_request(request, tx, now_ms));
        rx.try_recv().expect("local requests reply immediately")
    }

    #[tokio::test]
    async fn local_flow_add_start_stop() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = daemon(&dir, None);

        assert_eq!(ask(&mut d, Request::Add("abc-1".into()), 0), Ok("Added ABC-1".into()));
        assert_eq!(ask(&mut d, Request::Start, 1_000), Ok("Started ABC-1".into()));
        assert_eq!(ask(&mut d, Request::Start, 1_500), Ok("Already running ABC-1".into()));
        assert_eq!(
            ask(&mut d, Request::Stop, 91_000),
            Ok("Stopped ABC-1 (1m 30s this session, 00:01:30 total)".into())
        );
        assert_eq!(ask(&mut d, Request::Stop, 92_000), Ok("Not running".into()));

        let sessions = ask(&mut d, Request::Sessions(None), 92_000).unwrap();
        assert_eq!(sessions, "1970-01-01  ABC-1         00:01:30  (total 00:01:30)");
    }

    #[tokio::test]
    async fn validation_errors_come_back_as_messages() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = daemon(&dir, None);

        assert_eq!(
            ask(&mut d, Request::Start, 0),
            Err("Please select a ticket first".into())
        );
        assert_eq!(
            ask(&mut d, Request::Reset, 0),
            Err("Please select a ticket first".into())
        );
        assert!(ask(&mut d, Request::Add("bad ticket".into()), 0).is_err());
        assert_eq!(ask(&mut d, Request::Tickets, 0), Ok("No tickets".into()));
    }

    #[tokio::test]
    async fn info_json_has_waybar_shape() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = daemon(&dir, None);
        ask(&mut d, Request::Add("A-1".into()), 0).unwrap();
        ask(&mut d, Request::Start, 0).unwrap();

        let raw = ask(&mut d, Request::Info { json: true }, 5_000).unwrap();
        let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(v["text"], "00:00:05");
        assert_eq!(v["alt"], "running");
        assert_eq!(v["tooltip"], "A-1 (running)");
        assert!(v.get("pretty_text").is_none());

        let tickets = ask(&mut d, Request::Tickets, 5_000).unwrap();
        assert_eq!(tickets, "* A-1           00:00:05  running");
    }

    #[tokio::test]
    async fn quit_stops_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = daemon(&dir, None);

        let (tx, mut rx) = oneshot::channel();
        assert!(!d.handle_request(Request::Quit, tx, 0));
        assert!(rx.try_recv().unwrap().is_ok());
    }

    #[tokio::test]
    async fn sync_without_tracker_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = daemon(&dir, None);

        let err = ask(&mut d, Request::Sync, 0).unwrap_err();
        assert!(err.starts_with("Tracker is not configured"));
        assert!(!d.sync_in_flight);
    }

    #[tokio::test]
    async fn sync_replaces_tickets_through_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = daemon(
            &dir,
            Some(FakeTracker {
                issues: Ok(vec![issue("A-1"), issue("A-2")]),
            }),
        );
        let mut rx = d.rx.take().unwrap();

        ask(&mut d, Request::Add("A-3".into()), 0).unwrap();
        ask(&mut d, Request::Start, 0).unwrap();

        let (reply_tx, reply_rx) = oneshot::channel();
        assert!(d.handle_request(Request::Sync, reply_tx, 0));
        assert!(d.sync_in_flight);

        // second sync refused while the first is out
        assert_eq!(
            ask(&mut d, Request::Sync, 0),
            Err("A sync is already in progress".into())
        );

        let msg = loop {
            match rx.recv().await.unwrap() {
                m @ ManagerMsg::SyncFinished { .. } => break m,
                _ => continue,
            }
        };
        let ManagerMsg::SyncFinished { result, reply } = msg else {
            unreachable!()
        };
        d.finish_sync(result, reply, 4_000);

        assert_eq!(reply_rx.await.unwrap(), Ok("Synced 2 ticket(s): A-1, A-2".into()));
        assert!(!d.sync_in_flight);

        // running ticket was dropped: its session was logged first
        let state = d.engine.state();
        assert_eq!(state.tickets, vec!["A-1", "A-2"]);
        assert_eq!(state.current_ticket, None);
        assert!(!state.is_running);
        assert_eq!(d.engine.sessions().len(), 1);
        assert_eq!(d.engine.sessions()[0].elapsed, 4_000);
    }

    #[tokio::test]
    async fn failed_sync_leaves_tickets_alone() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = daemon(
            &dir,
            Some(FakeTracker {
                issues: Err(ExternalServiceError::Rejected {
                    status: 401,
                    body: String::new(),
                }),
            }),
        );
        ask(&mut d, Request::Add("A-3".into()), 0).unwrap();

        let (reply_tx, reply_rx) = oneshot::channel();
        d.finish_sync(
            Err(ExternalServiceError::Unreachable("dns".into())),
            reply_tx,
            0,
        );

        assert_eq!(
            reply_rx.await.unwrap(),
            Err("Tracker unreachable: dns".into())
        );
        assert_eq!(d.engine.state().tickets, vec!["A-3"]);
    }

    #[tokio::test]
    async fn replace_normalizes_ids_and_rejects_malformed_lists() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = daemon(&dir, None);
        ask(&mut d, Request::Add("A-3".into()), 0).unwrap();

        let err = ask(&mut d, Request::Replace(vec!["abc-1".into(), "foo!".into()]), 0);
        assert_eq!(err, Err("Please use format: ABC-123 (got 'foo!')".into()));
        assert_eq!(d.engine.state().tickets, vec!["A-3"]);

        assert_eq!(
            ask(&mut d, Request::Replace(vec!["abc-1".into(), "ABC-1".into()]), 0),
            Ok("Tracking 1 ticket(s)".into())
        );
        assert_eq!(d.engine.state().tickets, vec!["ABC-1"]);
    }

    #[tokio::test]
    async fn sync_skips_keys_the_list_cannot_hold() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = daemon(&dir, None);

        let (reply_tx, reply_rx) = oneshot::channel();
        d.finish_sync(Ok(vec![issue("A-1"), issue("AB2-5")]), reply_tx, 0);

        assert_eq!(reply_rx.await.unwrap(), Ok("Synced 1 ticket(s): A-1".into()));
        assert_eq!(d.engine.state().tickets, vec!["A-1"]);
    }

    #[tokio::test]
    async fn test_connection_reports_identity() {
        let dir = tempfile::tempdir().unwrap();
        let mut d = daemon(&dir, Some(FakeTracker { issues: Ok(Vec::new()) }));

        let (tx, rx) = oneshot::channel();
        assert!(d.handle_request(Request::TestConnection, tx, 0));
        assert_eq!(rx.await.unwrap(), Ok("Connected as Ada L".into()));
    }
}
