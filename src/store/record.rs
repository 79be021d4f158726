// Author: Dustin Pilgrim
// License: MIT

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::core::state::{Session, StatePatch, TimerState};

/// Whole persisted document.
///
/// Sessions stay raw so entries we cannot decode survive a rewrite.
/// Unknown top-level keys (window bounds, legacy fields) are carried in `extra`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreRecord {
    pub state: TimerState,
    pub sessions: Vec<Value>,
    pub extra: Map<String, Value>,
}

impl StoreRecord {
    /// Decode field by field; a bad field falls back to its default alone.
    pub fn from_value(value: Value) -> Self {
        let mut map = match value {
            Value::Object(map) => map,
            _ => return Self::default(),
        };

        let tickets = match map.remove("tickets") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };

        let ticket_times = match map.remove("ticketTimes") {
            Some(Value::Object(times)) => times
                .into_iter()
                .filter_map(|(k, v)| millis(&v).map(|ms| (k, ms)))
                .collect(),
            _ => BTreeMap::new(),
        };

        let current_ticket = map
            .remove("currentTicket")
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.trim().is_empty());

        let is_running = map
            .remove("isRunning")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let start_time = map.remove("startTime").and_then(|v| millis(&v));

        let sessions = match map.remove("sessions") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };

        Self {
            state: TimerState {
                tickets,
                ticket_times,
                current_ticket,
                is_running,
                start_time,
            },
            sessions,
            extra: map,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = self.extra.clone();

        map.insert("tickets".into(), Value::from(self.state.tickets.clone()));
        map.insert(
            "ticketTimes".into(),
            Value::Object(
                self.state
                    .ticket_times
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(*v)))
                    .collect(),
            ),
        );
        map.insert("sessions".into(), Value::Array(self.sessions.clone()));
        map.insert(
            "currentTicket".into(),
            self.state
                .current_ticket
                .clone()
                .map(Value::from)
                .unwrap_or(Value::Null),
        );
        map.insert("isRunning".into(), Value::from(self.state.is_running));
        map.insert(
            "startTime".into(),
            self.state.start_time.map(Value::from).unwrap_or(Value::Null),
        );

        Value::Object(map)
    }

    pub fn decoded_sessions(&self) -> Vec<Session> {
        self.sessions
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect()
    }

    pub fn push_session(&mut self, session: &Session) -> Result<(), serde_json::Error> {
        self.sessions.push(serde_json::to_value(session)?);
        Ok(())
    }

    pub fn apply(&mut self, patch: &StatePatch) {
        self.state.apply(patch);
    }

    /// Survivors keep their time, newcomers start at zero, the rest are dropped.
    pub fn replace_tickets(&mut self, tickets: &[String]) -> Vec<String> {
        let times = tickets
            .iter()
            .map(|t| (t.clone(), self.state.time_of(t)))
            .collect();

        self.state.tickets = tickets.to_vec();
        self.state.ticket_times = times;
        self.state.tickets.clone()
    }
}

// JS-era records may hold floats; negatives are nonsense.
fn millis(v: &Value) -> Option<u64> {
    v.as_u64()
        .or_else(|| v.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64))
}
