// Author: Dustin Pilgrim
// License: MIT

use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::core::engine::{SessionToken, Ticker};
use crate::core::manager_msg::ManagerMsg;
use crate::core::utils::now_ms;

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Emits `Tick` for one session token until aborted or the daemon is gone.
pub async fn run_ticker(tx: Sender<ManagerMsg>, token: SessionToken) {
    tracing::debug!("ticker armed ({:?})", token);

    let mut every = interval(TICK_PERIOD);
    every.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // first tick completes immediately
    every.tick().await;

    loop {
        every.tick().await;

        let msg = ManagerMsg::Tick {
            token,
            now_ms: now_ms(),
        };

        if tx.send(msg).await.is_err() {
            tracing::warn!("ticker stopping (receiver dropped)");
            break;
        }
    }
}

/// `Ticker` backed by a spawned tokio task. Must be armed inside a runtime.
pub struct TickerHandle {
    tx: Sender<ManagerMsg>,
    task: Option<JoinHandle<()>>,
}

impl TickerHandle {
    pub fn new(tx: Sender<ManagerMsg>) -> Self {
        Self { tx, task: None }
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Ticker for TickerHandle {
    fn arm(&mut self, token: SessionToken) {
        self.abort();
        self.task = Some(tokio::spawn(run_ticker(self.tx.clone(), token)));
    }

    fn cancel(&mut self) {
        if self.task.is_some() {
            tracing::debug!("ticker cancelled");
        }
        self.abort();
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[tokio::test]
    async fn armed_ticker_sends_its_token() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut ticker = TickerHandle::new(tx);

        ticker.arm(SessionToken(7));

        let msg = timeout(Duration::from_millis(2_500), rx.recv())
            .await
            .expect("tick within timeout")
            .expect("channel open");

        match msg {
            ManagerMsg::Tick { token, now_ms } => {
                assert_eq!(token, SessionToken(7));
                assert!(now_ms > 0);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rearm_replaces_previous_stream() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut ticker = TickerHandle::new(tx);

        ticker.arm(SessionToken(1));
        ticker.arm(SessionToken(2));

        let msg = timeout(Duration::from_millis(2_500), rx.recv())
            .await
            .expect("tick within timeout")
            .expect("channel open");

        assert!(matches!(msg, ManagerMsg::Tick { token: SessionToken(2), .. }));
    }

    #[tokio::test]
    async fn cancelled_ticker_goes_quiet() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut ticker = TickerHandle::new(tx);

        ticker.arm(SessionToken(1));
        ticker.cancel();

        assert!(timeout(Duration::from_millis(1_500), rx.recv()).await.is_err());
    }
}
