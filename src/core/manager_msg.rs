// Author: Dustin Pilgrim
// License: MIT

use tokio::sync::oneshot;

use crate::{
    core::{engine::SessionToken, state::StatePatch},
    tracker::{ExternalServiceError, TrackedIssue},
};

pub type Reply = oneshot::Sender<Result<String, String>>;

/// One parsed IPC request. Each maps to a single engine event or query.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Select(Option<String>),
    Start,
    Stop,
    Reset,
    Add(String),
    Replace(Vec<String>),
    Save(StatePatch),
    Info { json: bool },
    Tickets,
    Sessions(Option<usize>),
    Sync,
    TestConnection,
    Quit,
}

#[derive(Debug)]
pub enum ManagerMsg {
    Tick {
        token: SessionToken,
        now_ms: u64,
    },

    Request {
        request: Request,
        reply: Reply,
    },

    SyncFinished {
        result: Result<Vec<TrackedIssue>, ExternalServiceError>,
        reply: Reply,
    },
}
