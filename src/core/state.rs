// Author: Dustin Pilgrim
// License: MIT

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Live timer view, one per installation.
///
/// Field names follow the persisted record (`camelCase`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    #[serde(default)]
    pub tickets: Vec<String>,

    /// Accumulated milliseconds per ticket. Missing entry reads as zero.
    #[serde(default)]
    pub ticket_times: BTreeMap<String, u64>,

    #[serde(default)]
    pub current_ticket: Option<String>,

    #[serde(default)]
    pub is_running: bool,

    /// Last resume/flush point of the running session (epoch ms).
    #[serde(default)]
    pub start_time: Option<u64>,
}

/// One completed stopwatch interval. Never rewritten once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub ticket: String,
    pub start_time: u64,
    pub end_time: u64,

    /// Ticket's cumulative total at stop.
    pub duration: u64,

    /// This session's own running length for `ticket`.
    #[serde(default)]
    pub elapsed: u64,

    pub date: String,
}

/// Partial update for `Store::save`.
///
/// `None` leaves a field alone. `current_ticket`/`start_time` use
/// `Some(None)` to clear. `ticket_times` merges per key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePatch {
    #[serde(default)]
    pub tickets: Option<Vec<String>>,

    #[serde(default)]
    pub ticket_times: Option<BTreeMap<String, u64>>,

    #[serde(default, deserialize_with = "nullable")]
    pub current_ticket: Option<Option<String>>,

    #[serde(default)]
    pub is_running: Option<bool>,

    #[serde(default, deserialize_with = "nullable")]
    pub start_time: Option<Option<u64>>,
}

// Present-but-null must become Some(None), not None.
fn nullable<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(d).map(Some)
}

impl TimerState {
    pub fn time_of(&self, ticket: &str) -> u64 {
        self.ticket_times.get(ticket).copied().unwrap_or(0)
    }

    pub fn contains(&self, ticket: &str) -> bool {
        self.tickets.iter().any(|t| t == ticket)
    }

    /// Zero-initialize a time entry for every listed ticket.
    pub fn ensure_times(&mut self) {
        for t in &self.tickets {
            self.ticket_times.entry(t.clone()).or_insert(0);
        }
    }

    /// Drop time entries for tickets no longer in the list.
    pub fn retain_listed_times(&mut self) {
        let Self {
            tickets,
            ticket_times,
            ..
        } = self;
        ticket_times.retain(|t, _| tickets.contains(t));
    }

    pub fn apply(&mut self, patch: &StatePatch) {
        if let Some(tickets) = &patch.tickets {
            self.tickets = tickets.clone();
        }
        if let Some(times) = &patch.ticket_times {
            for (k, v) in times {
                self.ticket_times.insert(k.clone(), *v);
            }
        }
        if let Some(current) = &patch.current_ticket {
            self.current_ticket = current.clone();
        }
        if let Some(running) = patch.is_running {
            self.is_running = running;
        }
        if let Some(start) = patch.start_time {
            self.start_time = start;
        }
    }

    /// Repair anything that breaks the timer invariants.
    /// Returns true if the state had to be changed.
    pub fn normalize(&mut self) -> bool {
        let before = self.clone();

        let tickets = crate::core::ticket::dedup_preserving_order(&self.tickets);
        self.tickets = tickets;
        self.ensure_times();

        if let Some(cur) = &self.current_ticket {
            if !self.contains(cur) {
                self.current_ticket = None;
            }
        }

        if self.is_running && (self.current_ticket.is_none() || self.start_time.is_none()) {
            self.is_running = false;
        }
        if !self.is_running {
            self.start_time = None;
        }

        *self != before
    }

    /// Patch carrying every field, used after a failed write.
    pub fn full_patch(&self) -> StatePatch {
        StatePatch {
            tickets: Some(self.tickets.clone()),
            ticket_times: Some(self.ticket_times.clone()),
            current_ticket: Some(self.current_ticket.clone()),
            is_running: Some(self.is_running),
            start_time: Some(self.start_time),
        }
    }
}
