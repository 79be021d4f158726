// Author: Dustin Pilgrim
// License: MIT

use crate::core::{
    error::PersistenceError,
    state::{Session, StatePatch, TimerState},
};

use super::{Store, StoreRecord};

/// In-memory store for engine tests. `failing` makes every write error out.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    pub record: StoreRecord,
    pub failing: bool,
    pub saves: usize,
}

impl MemoryStore {
    pub fn with_state(state: TimerState) -> Self {
        Self {
            record: StoreRecord {
                state,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn check(&self) -> Result<(), PersistenceError> {
        if self.failing {
            return Err(PersistenceError::Io(std::io::Error::other("disk on fire")));
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    fn load(&self) -> TimerState {
        self.record.state.clone()
    }

    fn sessions(&self) -> Vec<Session> {
        self.record.decoded_sessions()
    }

    fn save(&mut self, patch: &StatePatch) -> Result<(), PersistenceError> {
        self.check()?;
        self.saves += 1;
        self.record.apply(patch);
        Ok(())
    }

    fn append_session(&mut self, session: &Session) -> Result<(), PersistenceError> {
        self.check()?;
        self.record.push_session(session)?;
        Ok(())
    }

    fn replace_ticket_list(&mut self, tickets: &[String]) -> Result<Vec<String>, PersistenceError> {
        self.check()?;
        Ok(self.record.replace_tickets(tickets))
    }
}
