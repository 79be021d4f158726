// Author: Dustin Pilgrim
// License: MIT

use std::io;
use std::sync::Arc;

use crate::cli::Args;
use crate::daemon::Daemon;
use crate::store::JsonFileStore;
use crate::tracker::{IssueTracker, JiraTracker};

type AnyError = Box<dyn std::error::Error + Send + Sync>;

pub async fn run(args: Args) -> Result<(), AnyError> {
    // single-instance
    let instance_lock = crate::app::platform::acquire_single_instance_lock().map_err(|e| {
        eprintln!("ticktrack: {e}");
        e
    })?;

    let log_path = crate::logging::default_log_path();
    crate::logging::init(log_path.as_deref(), args.verbose);

    if args.verbose {
        tracing::debug!("debug logging enabled");
    }

    tracing::info!("ticktrack starting (lock {})", instance_lock.path().display());

    let loaded = crate::config::load(args.config.as_deref()).map_err(|e| {
        tracing::error!("{e:?}");
        eprintln!("ticktrack: {e:?}");
        io::Error::other(e.to_string())
    })?;

    match &loaded.path {
        Some(p) => tracing::info!("config: {}", p.display()),
        None => tracing::info!("config: built-in defaults"),
    }

    let mut config = loaded.config;
    if let Some(data) = args.data {
        config.data_path = data;
    }
    tracing::info!("config: {}", config.describe());

    let tracker: Option<Arc<dyn IssueTracker>> = match &config.tracker {
        Some(_) => match JiraTracker::new() {
            Ok(t) => Some(Arc::new(t)),
            Err(e) => {
                tracing::error!("tracker: {e}");
                None
            }
        },
        None => None,
    };

    let store = JsonFileStore::open(&config.data_path);
    let mut daemon = Daemon::new(&config, store, tracker);

    if let Err(e) = crate::ipc::server::spawn_ipc_server(daemon.sender()).await {
        tracing::warn!("ipc: failed to start: {e}");
    }

    // shutdown
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let mut daemon_task = tokio::spawn({
        let shutdown_tx = shutdown_tx.clone();
        async move { daemon.run(shutdown_rx, shutdown_tx).await }
    });

    tokio::select! {
        res = &mut daemon_task => {
            match res {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e),
                Err(join_err) => Err(Box::new(join_err) as AnyError),
            }
        }

        signal = shutdown_signal() => {
            tracing::info!("received {signal}, shutting down");
            let _ = shutdown_tx.send(true);

            match daemon_task.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e),
                Err(join_err) => Err(Box::new(join_err)),
            }
        }
    }
}

async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("SIGTERM handler unavailable: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return "Ctrl+C";
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => "Ctrl+C",
        _ = term.recv() => "SIGTERM",
    }
}
