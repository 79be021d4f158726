// Author: Dustin Pilgrim
// License: MIT

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::core::{
    error::PersistenceError,
    state::{Session, StatePatch, TimerState},
};

use super::{Store, StoreRecord};

/// Single JSON document on disk. Every write goes through a temp file + rename.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_record(&self) -> Result<StoreRecord, PersistenceError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(StoreRecord::default()),
            Err(e) => return Err(e.into()),
        };

        if text.trim().is_empty() {
            return Ok(StoreRecord::default());
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(v) => Ok(StoreRecord::from_value(v)),
            Err(e) => {
                // Keep the unreadable file around instead of overwriting it.
                let aside = corrupt_name(&self.path);
                tracing::warn!(
                    "store: {} is not valid json ({e}); moving it to {}",
                    self.path.display(),
                    aside.display()
                );
                fs::rename(&self.path, &aside)?;
                Ok(StoreRecord::default())
            }
        }
    }

    fn write_record(&self, record: &StoreRecord) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let body = serde_json::to_vec_pretty(&record.to_value())?;

        let tmp = tmp_name(&self.path);
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(&body)?;
            f.write_all(b"\n")?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update<R>(
        &mut self,
        f: impl FnOnce(&mut StoreRecord) -> Result<R, PersistenceError>,
    ) -> Result<R, PersistenceError> {
        let mut record = self.read_record()?;
        let out = f(&mut record)?;
        self.write_record(&record)?;
        Ok(out)
    }
}

impl Store for JsonFileStore {
    fn load(&self) -> TimerState {
        match fs::read_to_string(&self.path) {
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(v) => StoreRecord::from_value(v).state,
                Err(e) => {
                    tracing::warn!("store: ignoring unreadable {}: {e}", self.path.display());
                    TimerState::default()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => TimerState::default(),
            Err(e) => {
                tracing::warn!("store: failed to read {}: {e}", self.path.display());
                TimerState::default()
            }
        }
    }

    fn sessions(&self) -> Vec<Session> {
        match fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str::<Value>(&text)
                .map(|v| StoreRecord::from_value(v).decoded_sessions())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    fn save(&mut self, patch: &StatePatch) -> Result<(), PersistenceError> {
        self.update(|rec| {
            rec.apply(patch);
            Ok(())
        })
    }

    fn append_session(&mut self, session: &Session) -> Result<(), PersistenceError> {
        self.update(|rec| rec.push_session(session).map_err(PersistenceError::from))
    }

    fn replace_ticket_list(&mut self, tickets: &[String]) -> Result<Vec<String>, PersistenceError> {
        self.update(|rec| Ok(rec.replace_tickets(tickets)))
    }
}

fn tmp_name(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.tmp", path.display()))
}

fn corrupt_name(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.corrupt", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn session(ticket: &str, duration: u64) -> Session {
        Session {
            ticket: ticket.into(),
            start_time: 1_000,
            end_time: 2_000,
            duration,
            elapsed: 1_000,
            date: "1970-01-01".into(),
        }
    }

    #[test]
    fn missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("nested").join("state.json"));
        assert_eq!(store.load(), TimerState::default());
        assert!(store.sessions().is_empty());
    }

    #[test]
    fn save_merges_ticket_times_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::open(dir.path().join("state.json"));

        store
            .save(&StatePatch {
                tickets: Some(vec!["A-1".into(), "A-2".into()]),
                ticket_times: Some(BTreeMap::from([
                    ("A-1".to_string(), 100),
                    ("A-2".to_string(), 200),
                ])),
                ..Default::default()
            })
            .unwrap();

        store
            .save(&StatePatch {
                ticket_times: Some(BTreeMap::from([("A-2".to_string(), 250)])),
                current_ticket: Some(Some("A-2".into())),
                ..Default::default()
            })
            .unwrap();

        let s = store.load();
        assert_eq!(s.tickets, vec!["A-1", "A-2"]);
        assert_eq!(s.time_of("A-1"), 100);
        assert_eq!(s.time_of("A-2"), 250);
        assert_eq!(s.current_ticket.as_deref(), Some("A-2"));

        store
            .save(&StatePatch {
                current_ticket: Some(None),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store.load().current_ticket, None);
    }

    #[test]
    fn sessions_append_and_survive_saves() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::open(dir.path().join("state.json"));

        store.append_session(&session("A-1", 10)).unwrap();
        store
            .save(&StatePatch {
                is_running: Some(false),
                ..Default::default()
            })
            .unwrap();
        store.append_session(&session("A-2", 20)).unwrap();

        let sessions = store.sessions();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].ticket, "A-1");
        assert_eq!(sessions[1].duration, 20);
    }

    #[test]
    fn replace_ticket_list_drops_removed_times() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::open(dir.path().join("state.json"));

        store
            .save(&StatePatch {
                tickets: Some(vec!["A-1".into(), "A-3".into()]),
                ticket_times: Some(BTreeMap::from([
                    ("A-1".to_string(), 5000),
                    ("A-3".to_string(), 9000),
                ])),
                ..Default::default()
            })
            .unwrap();

        let out = store
            .replace_ticket_list(&["A-1".to_string(), "A-2".to_string()])
            .unwrap();
        assert_eq!(out, vec!["A-1", "A-2"]);

        let s = store.load();
        assert_eq!(
            s.ticket_times,
            BTreeMap::from([("A-1".to_string(), 5000), ("A-2".to_string(), 0)])
        );
    }

    #[test]
    fn corrupt_file_is_set_aside_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();

        let mut store = JsonFileStore::open(&path);
        assert_eq!(store.load(), TimerState::default());

        store
            .save(&StatePatch {
                tickets: Some(vec!["A-1".into()]),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(store.load().tickets, vec!["A-1"]);
        assert_eq!(
            fs::read_to_string(dir.path().join("state.json.corrupt")).unwrap(),
            "{ not json"
        );
    }

    #[test]
    fn unknown_keys_are_preserved_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"windowBounds":{"x":3},"tickets":["A-1"]}"#).unwrap();

        let mut store = JsonFileStore::open(&path);
        store
            .save(&StatePatch {
                is_running: Some(false),
                ..Default::default()
            })
            .unwrap();

        let v: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["windowBounds"]["x"], 3);
        assert_eq!(v["tickets"][0], "A-1");
    }
}
