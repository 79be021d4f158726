// Author: Dustin Pilgrim
// License: MIT

use std::fmt;
use std::io;

/// A request was rejected before touching any state.
///
/// The `Display` text is shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Ticket input was empty/whitespace.
    EmptyTicket,

    /// Ticket input did not look like `ABC-123` after normalization.
    MalformedTicket(String),

    /// Ticket is well-formed but not part of the ticket list.
    UnknownTicket(String),

    /// Start requested with no ticket selected.
    NoTicketSelected,
}

/// The store could not read or write its record.
#[derive(Debug)]
pub enum PersistenceError {
    Io(io::Error),
    Encode(serde_json::Error),
}

// ---------------- Display ----------------

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyTicket =>
                write!(f, "Please enter a ticket number"),
            ValidationError::MalformedTicket(raw) =>
                write!(f, "Please use format: ABC-123 (got '{raw}')"),
            ValidationError::UnknownTicket(t) =>
                write!(f, "Unknown ticket {t}; add it first"),
            ValidationError::NoTicketSelected =>
                write!(f, "Please select a ticket first"),
        }
    }
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::Io(e) => write!(f, "store io error: {e}"),
            PersistenceError::Encode(e) => write!(f, "store encode error: {e}"),
        }
    }
}

impl std::error::Error for ValidationError {}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistenceError::Io(e) => Some(e),
            PersistenceError::Encode(e) => Some(e),
        }
    }
}

impl From<io::Error> for PersistenceError {
    fn from(err: io::Error) -> Self {
        PersistenceError::Io(err)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Encode(err)
    }
}
