// Author: Dustin Pilgrim
// License: MIT

use tokio::sync::watch;

use crate::core::{manager_msg::ManagerMsg, utils::now_ms};

use super::{AnyError, Daemon};

impl Daemon {
    pub async fn run(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
        shutdown_tx: watch::Sender<bool>,
    ) -> Result<(), AnyError> {
        tracing::info!("daemon starting");

        let Some(mut rx) = self.rx.take() else {
            return Err("daemon already ran".into());
        };

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("daemon stopping (shutdown requested)");
                        break;
                    }
                }

                maybe = rx.recv() => {
                    let Some(msg) = maybe else {
                        tracing::info!("daemon stopping (message channel closed)");
                        break;
                    };

                    match msg {
                        ManagerMsg::Tick { token, now_ms } => {
                            self.engine.tick(token, now_ms);
                        }

                        ManagerMsg::Request { request, reply } => {
                            if !self.handle_request(request, reply, now_ms()) {
                                let _ = shutdown_tx.send(true);
                                break;
                            }
                        }

                        ManagerMsg::SyncFinished { result, reply } => {
                            self.finish_sync(result, reply, now_ms());
                        }
                    }
                }
            }
        }

        // commit whatever the running session accrued since the last tick
        self.engine.checkpoint(now_ms());
        tracing::info!("daemon stopped");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::manager_msg::Request;
    use crate::store::{JsonFileStore, Store};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn shutdown_checkpoints_running_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let config = Config {
            data_path: path.clone(),
            ..Default::default()
        };

        let mut daemon = Daemon::new(&config, JsonFileStore::open(&path), None);
        let tx = daemon.sender();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn({
            let shutdown_tx = shutdown_tx.clone();
            async move { daemon.run(shutdown_rx, shutdown_tx).await }
        });

        for request in [Request::Add("A-1".into()), Request::Start] {
            let (reply, rx) = oneshot::channel();
            tx.send(ManagerMsg::Request { request, reply }).await.unwrap();
            assert!(rx.await.unwrap().is_ok());
        }

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        task.await.unwrap().unwrap();

        let state = JsonFileStore::open(&path).load();
        assert_eq!(state.tickets, vec!["A-1"]);
        assert!(state.is_running);
        assert!(state.time_of("A-1") >= 50);
    }

    #[tokio::test]
    async fn quit_request_ends_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let config = Config {
            data_path: path.clone(),
            ..Default::default()
        };

        let mut daemon = Daemon::new(&config, JsonFileStore::open(&path), None);
        let tx = daemon.sender();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move { daemon.run(shutdown_rx, shutdown_tx).await });

        let (reply, rx) = oneshot::channel();
        tx.send(ManagerMsg::Request {
            request: Request::Quit,
            reply,
        })
        .await
        .unwrap();

        assert_eq!(rx.await.unwrap(), Ok("Stopping ticktrack daemon".into()));
        task.await.unwrap().unwrap();
    }
}
