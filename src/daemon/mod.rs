// Author: Dustin Pilgrim
// License: MIT

mod handlers;
mod run;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{
    config::{Config, TrackerSettings},
    core::{engine::TimerEngine, manager_msg::ManagerMsg},
    services::ticker::TickerHandle,
    store::JsonFileStore,
    tracker::IssueTracker,
};

type AnyError = Box<dyn std::error::Error + Send + Sync>;

const CHANNEL_CAPACITY: usize = 256;

pub struct Daemon {
    engine: TimerEngine<JsonFileStore, TickerHandle>,

    tracker: Option<Arc<dyn IssueTracker>>,
    tracker_settings: Option<TrackerSettings>,
    sync_in_flight: bool,

    tx: mpsc::Sender<ManagerMsg>,
    rx: Option<mpsc::Receiver<ManagerMsg>>,
}

impl Daemon {
    /// Load the store and resume any running session. Must run inside the runtime.
    pub fn new(
        config: &Config,
        store: JsonFileStore,
        tracker: Option<Arc<dyn IssueTracker>>,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<ManagerMsg>(CHANNEL_CAPACITY);
        let now_ms = crate::core::utils::now_ms();

        tracing::debug!("daemon: store={}", store.path().display());

        let engine = TimerEngine::load(
            store,
            TickerHandle::new(tx.clone()),
            config.resume_policy,
            now_ms,
        );

        let state = engine.state();
        tracing::info!(
            "daemon: loaded {} ticket(s), current={}, running={}",
            state.tickets.len(),
            state.current_ticket.as_deref().unwrap_or("-"),
            state.is_running,
        );

        Self {
            engine,
            tracker,
            tracker_settings: config.tracker.clone(),
            sync_in_flight: false,
            tx,
            rx: Some(rx),
        }
    }

    pub fn sender(&self) -> mpsc::Sender<ManagerMsg> {
        self.tx.clone()
    }
}
