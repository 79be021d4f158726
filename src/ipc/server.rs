// Author: Dustin Pilgrim
// License: MIT

use std::path::Path;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{UnixListener, UnixStream},
    sync::{mpsc, oneshot},
    time::{timeout, Duration},
};

use crate::core::manager_msg::ManagerMsg;

use super::{encode_reply, router::parse_request};

const MAX_REQUEST_BYTES: u64 = 64 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(2);
// tracker calls run up to their own 20s timeout
const REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Bind the daemon socket and serve requests into the manager loop.
pub async fn spawn_ipc_server(tx: mpsc::Sender<ManagerMsg>) -> std::io::Result<()> {
    let path = super::socket_path()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::NotFound, e))?;

    let listener = bind(&path)?;
    tracing::info!("ipc: listening on {}", path.display());

    serve(listener, tx);
    Ok(())
}

fn bind(path: &Path) -> std::io::Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // the instance lock is held, so any socket file left here is stale
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
    UnixListener::bind(path)
}

pub fn serve(listener: UnixListener, tx: mpsc::Sender<ManagerMsg>) {
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, tx).await {
                            tracing::warn!("ipc: connection error: {e}");
                        }
                    });
                }
                Err(e) => tracing::error!("ipc: accept failed: {e}"),
            }
        }
    });
}

async fn handle_connection(
    mut stream: UnixStream,
    tx: mpsc::Sender<ManagerMsg>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let read = timeout(
        READ_TIMEOUT,
        (&mut stream).take(MAX_REQUEST_BYTES).read_to_end(&mut buf),
    )
    .await;

    match read {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            tracing::warn!("ipc: request read timed out");
            return Ok(());
        }
    }

    let line = String::from_utf8_lossy(&buf).trim().to_string();
    if line.is_empty() {
        return Ok(());
    }

    // `save` carries a whole state document
    if line.starts_with("save ") {
        tracing::debug!("ipc: save ({} bytes)", line.len());
    } else if !line.contains("--json") {
        tracing::debug!("ipc: {line}");
    }

    let reply = match parse_request(&line) {
        Ok(request) => dispatch(request, &tx).await,
        Err(e) => Err(e),
    };

    stream.write_all(encode_reply(reply).as_bytes()).await?;
    stream.flush().await?;
    let _ = stream.shutdown().await;
    Ok(())
}

async fn dispatch(
    request: crate::core::manager_msg::Request,
    tx: &mpsc::Sender<ManagerMsg>,
) -> Result<String, String> {
    let (reply_tx, reply_rx) = oneshot::channel();

    tx.send(ManagerMsg::Request {
        request,
        reply: reply_tx,
    })
    .await
    .map_err(|_| "daemon is shutting down".to_string())?;

    match timeout(REPLY_TIMEOUT, reply_rx).await {
        Ok(Ok(reply)) => reply,
        Ok(Err(_)) => Err("daemon dropped the request".to_string()),
        Err(_) => Err("timed out waiting for daemon".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manager_msg::Request;

    async fn roundtrip(listener_path: &Path, cmd: &str) -> String {
        let mut s = UnixStream::connect(listener_path).await.unwrap();
        s.write_all(cmd.as_bytes()).await.unwrap();
        s.shutdown().await.unwrap();
        let mut out = String::new();
        s.read_to_string(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn requests_reach_the_loop_and_replies_come_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.sock");
        let listener = bind(&path).unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        serve(listener, tx);

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let ManagerMsg::Request { request, reply } = msg {
                    let out = match request {
                        Request::Start => Err("Please select a ticket first".to_string()),
                        other => Ok(format!("{other:?}")),
                    };
                    let _ = reply.send(out);
                }
            }
        });

        assert_eq!(roundtrip(&path, "tickets").await, "Tickets");
        assert_eq!(
            roundtrip(&path, "start").await,
            "ERROR: Please select a ticket first"
        );
        assert_eq!(
            roundtrip(&path, "frobnicate").await,
            "ERROR: unknown command: frobnicate"
        );
    }
}
