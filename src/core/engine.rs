// Author: Dustin Pilgrim
// License: MIT

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{
    core::{
        error::ValidationError,
        info::{InfoSnapshot, TicketTotal},
        state::{Session, StatePatch, TimerState},
        ticket::{dedup_preserving_order, normalize_ticket},
        utils::utc_date,
    },
    store::Store,
};

/// Identity of one armed tick stream. A tick carrying anything other than
/// the engine's active token is stale and commits nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken(pub u64);

/// Periodic tick source. `arm` replaces any previous stream.
pub trait Ticker {
    fn arm(&mut self, token: SessionToken);
    fn cancel(&mut self);
}

/// What to do with the gap between the last flush and a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResumePolicy {
    /// Keep the persisted anchor: time the app was closed counts as running.
    #[default]
    CountOffline,
    /// Re-anchor at load: the offline gap is dropped.
    DiscardOffline,
}

impl FromStr for ResumePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "count-offline" | "count" => Ok(ResumePolicy::CountOffline),
            "discard-offline" | "discard" => Ok(ResumePolicy::DiscardOffline),
            other => Err(format!(
                "unknown resume policy '{other}' (expected count-offline or discard-offline)"
            )),
        }
    }
}

impl fmt::Display for ResumePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResumePolicy::CountOffline => write!(f, "count-offline"),
            ResumePolicy::DiscardOffline => write!(f, "discard-offline"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added(String),
    AlreadyPresent(String),
}

/// Stopwatch state machine bound to one ticket at a time.
///
/// All operations take the current wall clock explicitly. Every mutation ends
/// with a store write; write failures are logged and retried with the full
/// state on the next write, the in-memory effect always stands.
pub struct TimerEngine<S: Store, T: Ticker> {
    store: S,
    ticker: T,

    state: TimerState,

    token: Option<SessionToken>,
    next_token: u64,

    // Start of the running session (or of its current ticket after a switch)
    // and how much has been flushed into that ticket since.
    session_started_ms: Option<u64>,
    session_elapsed_ms: u64,

    // Segments of the running session spent on tickets it has since left.
    // Logged ahead of the final segment when the session ends.
    closed_segments: Vec<Session>,

    dirty: bool,
    replace_pending: bool,
    pending_sessions: Vec<Session>,
}

impl<S: Store, T: Ticker> TimerEngine<S, T> {
    /// Rehydrate from the store and resume a session that was running at exit.
    pub fn load(store: S, ticker: T, resume: ResumePolicy, now_ms: u64) -> Self {
        let mut state = store.load();
        let repaired = state.normalize();

        let mut engine = Self {
            store,
            ticker,
            state,
            token: None,
            next_token: 0,
            session_started_ms: None,
            session_elapsed_ms: 0,
            closed_segments: Vec::new(),
            dirty: false,
            replace_pending: false,
            pending_sessions: Vec::new(),
        };

        if repaired {
            tracing::warn!("store: persisted timer state was inconsistent; repaired");
            engine.dirty = true;
        }

        if engine.state.is_running {
            let stale = engine.state.start_time.unwrap_or(now_ms);
            let anchor = match resume {
                ResumePolicy::CountOffline => stale.min(now_ms),
                ResumePolicy::DiscardOffline => now_ms,
            };

            engine.state.start_time = Some(anchor);
            engine.session_started_ms = Some(anchor);
            engine.arm();

            tracing::info!(
                "resumed {} (policy={}, offline_gap_ms={})",
                engine.state.current_ticket.as_deref().unwrap_or("-"),
                resume,
                now_ms.saturating_sub(stale),
            );

            engine.persist(StatePatch {
                start_time: Some(Some(anchor)),
                ..Default::default()
            });
        } else if repaired {
            engine.persist(StatePatch::default());
        }

        engine
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running
    }

    pub fn active_token(&self) -> Option<SessionToken> {
        self.token
    }

    /// Session log as persisted plus anything still waiting for a retry.
    pub fn sessions(&self) -> Vec<Session> {
        let mut out = self.store.sessions();
        out.extend(self.pending_sessions.iter().cloned());
        out
    }

    // ---------------- transitions ----------------

    /// Idle -> Running. Already running is a no-op (`Ok(false)`).
    pub fn start(&mut self, now_ms: u64) -> Result<bool, ValidationError> {
        let Some(current) = self.state.current_ticket.clone() else {
            return Err(ValidationError::NoTicketSelected);
        };

        if self.state.is_running {
            return Ok(false);
        }

        let total = *self.state.ticket_times.entry(current.clone()).or_insert(0);
        self.state.is_running = true;
        self.state.start_time = Some(now_ms);
        self.session_started_ms = Some(now_ms);
        self.session_elapsed_ms = 0;

        self.arm();

        tracing::info!("start: {current}");

        self.persist(StatePatch {
            ticket_times: Some(BTreeMap::from([(current.clone(), total)])),
            current_ticket: Some(Some(current)),
            is_running: Some(true),
            start_time: Some(Some(now_ms)),
            ..Default::default()
        });

        Ok(true)
    }

    /// Periodic commit. Returns false for a stale token.
    pub fn tick(&mut self, token: SessionToken, now_ms: u64) -> bool {
        if self.token != Some(token) {
            tracing::debug!("tick {:?} ignored (active={:?})", token, self.token);
            return false;
        }

        if let Some((ticket, total)) = self.flush_slice(now_ms) {
            self.persist(self.slice_patch(ticket, total));
        }

        true
    }

    /// Running -> Idle. Returns the appended session, `None` if already idle.
    pub fn stop(&mut self, now_ms: u64) -> Option<Session> {
        if !self.state.is_running {
            return None;
        }

        self.disarm();
        self.flush_slice(now_ms);

        let Some(ticket) = self.state.current_ticket.clone() else {
            self.record_closed_segments();
            self.state.is_running = false;
            self.state.start_time = None;
            self.persist(StatePatch {
                is_running: Some(false),
                start_time: Some(None),
                ..Default::default()
            });
            return None;
        };
        let total = self.state.time_of(&ticket);
        let session = self.segment(&ticket, now_ms);

        self.state.is_running = false;
        self.state.start_time = None;
        self.session_started_ms = None;
        self.session_elapsed_ms = 0;

        tracing::info!("stop: {ticket} (session {}ms, total {}ms)", session.elapsed, total);

        self.record_closed_segments();
        self.record_session(session.clone());
        self.persist(StatePatch {
            ticket_times: Some(BTreeMap::from([(ticket, total)])),
            is_running: Some(false),
            start_time: Some(None),
            ..Default::default()
        });

        Some(session)
    }

    /// Switch the current ticket. A running session continues under the new
    /// ticket after the old one's pending slice is committed; clearing the
    /// selection while running stops the session.
    pub fn select_ticket(&mut self, ticket: Option<&str>, now_ms: u64) -> Result<(), ValidationError> {
        let next = match ticket {
            None => None,
            Some(raw) => Some(self.resolve_ticket(raw)?),
        };

        if next == self.state.current_ticket {
            return Ok(());
        }

        match (self.state.is_running, next) {
            (true, None) => {
                self.stop(now_ms);
                self.state.current_ticket = None;
                tracing::info!("select: none");
                self.persist(StatePatch {
                    current_ticket: Some(None),
                    ..Default::default()
                });
            }

            (true, Some(next)) => {
                self.disarm();
                let flushed = self.flush_slice(now_ms);
                if let Some((old, _)) = &flushed {
                    let closed = self.segment(old, now_ms);
                    self.closed_segments.push(closed);
                }

                let next_total = *self.state.ticket_times.entry(next.clone()).or_insert(0);
                self.state.current_ticket = Some(next.clone());
                self.state.start_time = Some(now_ms);
                self.session_started_ms = Some(now_ms);
                self.session_elapsed_ms = 0;

                self.arm();

                let mut times = BTreeMap::from([(next.clone(), next_total)]);
                if let Some((old, total)) = flushed {
                    tracing::info!("switch: {old} -> {next} (running)");
                    times.insert(old, total);
                }

                self.persist(StatePatch {
                    ticket_times: Some(times),
                    current_ticket: Some(Some(next)),
                    start_time: Some(Some(now_ms)),
                    ..Default::default()
                });
            }

            (false, next) => {
                let mut patch = StatePatch {
                    current_ticket: Some(next.clone()),
                    ..Default::default()
                };

                if let Some(t) = &next {
                    let total = *self.state.ticket_times.entry(t.clone()).or_insert(0);
                    patch.ticket_times = Some(BTreeMap::from([(t.clone(), total)]));
                }

                tracing::info!("select: {}", next.as_deref().unwrap_or("none"));
                self.state.current_ticket = next;
                self.persist(patch);
            }
        }

        Ok(())
    }

    /// Stop (logging the session) if running, then zero the current ticket.
    pub fn reset(&mut self, now_ms: u64) -> Option<Session> {
        let session = self.stop(now_ms);

        self.state.start_time = None;

        let mut patch = StatePatch {
            start_time: Some(None),
            ..Default::default()
        };

        if let Some(current) = self.state.current_ticket.clone() {
            self.state.ticket_times.insert(current.clone(), 0);
            patch.ticket_times = Some(BTreeMap::from([(current.clone(), 0)]));
            tracing::info!("reset: {current}");
        }

        self.persist(patch);
        session
    }

    /// Validate + add a ticket and select it. An existing ticket is only selected.
    pub fn add_ticket(&mut self, raw: &str, now_ms: u64) -> Result<AddOutcome, ValidationError> {
        let ticket = normalize_ticket(raw)?;

        if self.state.contains(&ticket) {
            self.select_ticket(Some(&ticket), now_ms)?;
            return Ok(AddOutcome::AlreadyPresent(ticket));
        }

        self.state.tickets.push(ticket.clone());
        self.state.ticket_times.entry(ticket.clone()).or_insert(0);

        tracing::info!("add: {ticket}");

        self.persist(StatePatch {
            tickets: Some(self.state.tickets.clone()),
            ticket_times: Some(BTreeMap::from([(
                ticket.clone(),
                self.state.time_of(&ticket),
            )])),
            ..Default::default()
        });

        self.select_ticket(Some(&ticket), now_ms)?;
        Ok(AddOutcome::Added(ticket))
    }

    /// Wholesale ticket-list swap. A running session on a ticket that does not
    /// survive is stopped (and logged) before the list changes.
    ///
    /// Ids go through the same normalization as `add_ticket`; one malformed id
    /// rejects the whole list and leaves the state untouched.
    pub fn replace_tickets(
        &mut self,
        ids: &[String],
        now_ms: u64,
    ) -> Result<Vec<String>, ValidationError> {
        let normalized = ids
            .iter()
            .filter(|id| !id.trim().is_empty())
            .map(|id| normalize_ticket(id))
            .collect::<Result<Vec<_>, _>>()?;
        let next = dedup_preserving_order(&normalized);

        if let Some(current) = self.state.current_ticket.clone() {
            if !next.contains(&current) {
                if self.state.is_running {
                    tracing::info!("replace: {current} removed while running; stopping");
                    self.stop(now_ms);
                }
                self.state.current_ticket = None;
                self.persist(StatePatch {
                    current_ticket: Some(None),
                    ..Default::default()
                });
            }
        }

        let times = next
            .iter()
            .map(|t| (t.clone(), self.state.time_of(t)))
            .collect();
        self.state.tickets = next;
        self.state.ticket_times = times;

        tracing::info!("replace: {} ticket(s)", self.state.tickets.len());

        self.replace_pending = true;
        self.persist(StatePatch::default());

        Ok(self.state.tickets.clone())
    }

    /// Raw partial merge from a caller, re-normalized and re-synced with the ticker.
    /// Turning `isRunning` off this way logs a session like `stop`.
    pub fn save_state(&mut self, patch: &StatePatch, now_ms: u64) {
        let was_running = self.state.is_running;
        let old_current = self.state.current_ticket.clone();

        if was_running {
            self.flush_slice(now_ms);
        }

        self.state.apply(patch);
        if self.state.is_running && self.state.start_time.is_none() {
            self.state.start_time = Some(now_ms);
        }
        self.state.normalize();

        let now_running = self.state.is_running;
        let switched = self.state.current_ticket != old_current;

        if was_running && (!now_running || switched) {
            self.disarm();

            if let Some(ticket) = old_current {
                let session = self.segment(&ticket, now_ms);
                if now_running {
                    self.closed_segments.push(session);
                } else {
                    self.record_closed_segments();
                    self.record_session(session);
                }
            }

            self.session_started_ms = None;
            self.session_elapsed_ms = 0;
        }

        if now_running && self.token.is_none() {
            self.session_started_ms = self.state.start_time;
            self.session_elapsed_ms = 0;
            self.arm();
        }

        if patch.tickets.is_some() {
            self.state.retain_listed_times();
            self.replace_pending = true;
        }

        self.persist(self.state.full_patch());
    }

    /// Commit the pending slice without stopping (shutdown path).
    pub fn checkpoint(&mut self, now_ms: u64) {
        self.record_closed_segments();

        if let Some((ticket, total)) = self.flush_slice(now_ms) {
            self.persist(self.slice_patch(ticket, total));
        } else if self.dirty || self.replace_pending || !self.pending_sessions.is_empty() {
            self.persist(StatePatch::default());
        }
    }

    // ---------------- views ----------------

    /// Current ticket's total plus the unflushed running slice.
    pub fn display_millis(&self, now_ms: u64) -> u64 {
        let Some(current) = &self.state.current_ticket else {
            return 0;
        };

        let base = self.state.time_of(current);
        if !self.state.is_running {
            return base;
        }

        let anchor = self.state.start_time.unwrap_or(now_ms);
        base.saturating_add(now_ms.saturating_sub(anchor))
    }

    pub fn snapshot(&self, now_ms: u64, sync_in_flight: bool) -> InfoSnapshot {
        let tickets = self
            .state
            .tickets
            .iter()
            .map(|t| TicketTotal {
                ticket: t.clone(),
                total_ms: if Some(t) == self.state.current_ticket.as_ref() {
                    self.display_millis(now_ms)
                } else {
                    self.state.time_of(t)
                },
            })
            .collect();

        InfoSnapshot::new(
            self.state.current_ticket.clone(),
            self.state.is_running,
            self.display_millis(now_ms),
            tickets,
            sync_in_flight,
        )
    }

    // ---------------- internals ----------------

    fn resolve_ticket(&self, raw: &str) -> Result<String, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyTicket);
        }
        if self.state.contains(trimmed) {
            return Ok(trimmed.to_string());
        }

        let upper = trimmed.to_uppercase();
        if self.state.contains(&upper) {
            return Ok(upper);
        }

        Err(ValidationError::UnknownTicket(upper))
    }

    fn arm(&mut self) {
        self.next_token = self.next_token.wrapping_add(1);
        let token = SessionToken(self.next_token);
        self.token = Some(token);
        self.ticker.arm(token);
    }

    // Token goes first so nothing queued under it can commit afterwards.
    fn disarm(&mut self) {
        if self.token.take().is_some() {
            self.ticker.cancel();
        }
    }

    /// Move `now - startTime` into the current ticket and re-anchor.
    fn flush_slice(&mut self, now_ms: u64) -> Option<(String, u64)> {
        if !self.state.is_running {
            return None;
        }

        let ticket = self.state.current_ticket.clone()?;
        let anchor = self.state.start_time.unwrap_or(now_ms);
        let delta = now_ms.saturating_sub(anchor);

        let total = self.state.time_of(&ticket).saturating_add(delta);
        self.state.ticket_times.insert(ticket.clone(), total);
        self.state.start_time = Some(anchor.max(now_ms));
        self.session_elapsed_ms = self.session_elapsed_ms.saturating_add(delta);

        Some((ticket, total))
    }

    fn slice_patch(&self, ticket: String, total: u64) -> StatePatch {
        StatePatch {
            ticket_times: Some(BTreeMap::from([(ticket, total)])),
            start_time: Some(self.state.start_time),
            ..Default::default()
        }
    }

    /// The current session's segment on `ticket`, ending at `now_ms`.
    fn segment(&self, ticket: &str, now_ms: u64) -> Session {
        Session {
            ticket: ticket.to_string(),
            start_time: self.session_started_ms.unwrap_or(now_ms),
            end_time: now_ms,
            duration: self.state.time_of(ticket),
            elapsed: self.session_elapsed_ms,
            date: utc_date(now_ms),
        }
    }

    fn record_closed_segments(&mut self) {
        for session in std::mem::take(&mut self.closed_segments) {
            self.record_session(session);
        }
    }

    fn record_session(&mut self, session: Session) {
        self.pending_sessions.push(session);
        self.flush_pending_sessions();
    }

    fn flush_pending_sessions(&mut self) {
        while let Some(session) = self.pending_sessions.first() {
            match self.store.append_session(session) {
                Ok(()) => {
                    self.pending_sessions.remove(0);
                }
                Err(e) => {
                    tracing::warn!(
                        "store: session append failed ({e}); {} queued for retry",
                        self.pending_sessions.len()
                    );
                    return;
                }
            }
        }
    }

    fn persist(&mut self, patch: StatePatch) {
        self.flush_pending_sessions();

        if self.replace_pending {
            match self.store.replace_ticket_list(&self.state.tickets) {
                Ok(_) => self.replace_pending = false,
                Err(e) => {
                    tracing::warn!("store: ticket list write failed ({e}); will retry");
                    self.dirty = true;
                    return;
                }
            }
        }

        let patch = if self.dirty { self.state.full_patch() } else { patch };
        if patch == StatePatch::default() {
            return;
        }

        match self.store.save(&patch) {
            Ok(()) => self.dirty = false,
            Err(e) => {
                tracing::warn!("store: save failed ({e}); will retry with full state");
                self.dirty = true;
            }
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[cfg(test)]
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    #[cfg(test)]
    pub fn ticker(&self) -> &T {
        &self.ticker
    }
}
