// Author: Dustin Pilgrim
// License: MIT

pub mod json_file;
pub mod record;

#[cfg(test)]
pub mod memory;

pub use self::json_file::JsonFileStore;
pub use self::record::StoreRecord;

use crate::core::{
    error::PersistenceError,
    state::{Session, StatePatch, TimerState},
};

/// Durable home of the timer state. Nothing else writes the state file.
pub trait Store {
    /// Last persisted state, or an empty default. Never fails.
    fn load(&self) -> TimerState;

    /// Decoded session log, oldest first. Undecodable entries are skipped.
    fn sessions(&self) -> Vec<Session>;

    /// Field-wise merge of `patch` onto the persisted record.
    fn save(&mut self, patch: &StatePatch) -> Result<(), PersistenceError>;

    fn append_session(&mut self, session: &Session) -> Result<(), PersistenceError>;

    /// Swap the ticket list and reconcile times in one write.
    /// Returns the ticket list as persisted.
    fn replace_ticket_list(&mut self, tickets: &[String]) -> Result<Vec<String>, PersistenceError>;
}
