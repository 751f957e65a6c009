use super::HostEvent;
use crate::dispatch::Dispatcher;
use crate::host::SnapshotHost;
use color_eyre::Result;
use serde_json::Value;
use std::os::unix::io::{FromRawFd, IntoRawFd};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Semaphore;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

/// Maximum concurrent connections to prevent resource exhaustion
const MAX_CONNECTIONS: usize = 100;

/// Socket receive buffer size (events with session snapshots can run a few KB)
const SOCKET_RECV_BUF: usize = 16 * 1024;

/// Connect/write budget for `hook` forwarding to a running server
const FORWARD_TIMEOUT: Duration = Duration::from_millis(500);

/// Dispatch one raw JSON line against the shared dispatcher
async fn handle_line(dispatcher: &Dispatcher, line: &str) {
    match HostEvent::parse(line) {
        Ok(event) => {
            let host = SnapshotHost::new(event.sessions.clone());
            dispatcher.handle(&event, &host).await;
        }
        Err(e) => {
            tracing::warn!("Failed to parse event: {} - {}", e, line);
        }
    }
}

/// Listen for host events on a Unix socket until `cancel` fires
pub async fn listen(
    dispatcher: Arc<Dispatcher>,
    socket_path: &Path,
    cancel: CancellationToken,
) -> Result<()> {
    // Remove existing socket file
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }

    // Create socket with socket2 for buffer tuning
    let socket = socket2::Socket::new(socket2::Domain::UNIX, socket2::Type::STREAM, None)?;

    // OS may clamp to minimum, which is fine
    if let Err(e) = socket.set_recv_buffer_size(SOCKET_RECV_BUF) {
        tracing::debug!("Could not set recv buffer size: {}", e);
    }

    // Bind and listen
    socket.bind(&socket2::SockAddr::unix(socket_path)?)?;
    socket.listen(128)?; // backlog of 128 pending connections
    socket.set_nonblocking(true)?;

    // Convert to tokio UnixListener
    let std_listener: std::os::unix::net::UnixListener =
        unsafe { std::os::unix::net::UnixListener::from_raw_fd(socket.into_raw_fd()) };
    let listener = UnixListener::from_std(std_listener)?;

    tracing::info!("Listening on {:?}", socket_path);

    // Semaphore to limit concurrent connections
    let semaphore = Arc::new(Semaphore::new(MAX_CONNECTIONS));

    // Backoff state for accept errors
    let mut backoff_ms: u64 = 0;
    const MAX_BACKOFF_MS: u64 = 5000;

    loop {
        let accepted = tokio::select! {
            () = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, _)) => {
                // Reset backoff on successful accept
                backoff_ms = 0;

                let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                    tracing::warn!(
                        "Connection limit reached ({} max), dropping connection",
                        MAX_CONNECTIONS
                    );
                    continue;
                };

                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    // Permit is held until this task completes
                    let _permit = permit;

                    let reader = BufReader::new(stream);
                    let mut lines = reader.lines();

                    // Hooks send single-line JSON messages
                    match timeout(Duration::from_secs(2), lines.next_line()).await {
                        Ok(Ok(Some(line))) if !line.trim().is_empty() => {
                            handle_line(&dispatcher, &line).await;
                        }
                        Ok(Ok(_)) => {} // Empty line or stream closed
                        Ok(Err(e)) => {
                            tracing::warn!("Read error: {}", e);
                        }
                        Err(_) => {
                            tracing::debug!("Read timeout (connection may be stale)");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::error!("Accept error: {}", e);

                // Exponential backoff to prevent CPU spin on persistent errors
                backoff_ms = if backoff_ms == 0 {
                    100
                } else {
                    (backoff_ms * 2).min(MAX_BACKOFF_MS)
                };

                tracing::debug!("Backing off for {}ms", backoff_ms);
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            }
        }
    }

    // Remove socket file on shutdown
    if socket_path.exists() {
        let _ = std::fs::remove_file(socket_path);
    }
    tracing::info!("Listener stopped");
    Ok(())
}

/// Hand one event to a running `serve` process as a single JSON line
///
/// Returns false when no server is reachable so the caller can dispatch
/// in-process instead.
pub async fn forward(socket_path: &Path, event: &Value) -> bool {
    if !socket_path.exists() {
        return false;
    }

    // Pretty-printed stdin must not reach the line reader split up
    let Ok(line) = serde_json::to_string(event) else {
        return false;
    };

    let Ok(Ok(mut stream)) = timeout(FORWARD_TIMEOUT, UnixStream::connect(socket_path)).await
    else {
        tracing::debug!("Server socket present but not accepting, dispatching locally");
        return false;
    };

    let data = format!("{line}\n");
    let written = matches!(
        timeout(FORWARD_TIMEOUT, stream.write_all(data.as_bytes())).await,
        Ok(Ok(()))
    );
    let _ = stream.shutdown().await;
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::HostEventKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_forward_without_server() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("missing.sock");
        assert!(!forward(&path, &serde_json::json!({"type": "session.idle"})).await);
    }

    #[tokio::test]
    async fn test_forward_delivers_single_line() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notifier.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(stream).lines();
            lines.next_line().await.unwrap()
        });

        assert!(forward(&path, &serde_json::json!({"type": "session.idle"})).await);
        let received = server.await.unwrap();
        assert_eq!(received.as_deref(), Some(r#"{"type":"session.idle"}"#));
    }

    #[tokio::test]
    async fn test_forward_pretty_printed_event_as_one_line() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notifier.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(stream).lines();
            lines.next_line().await.unwrap()
        });

        let stdin = "{\n  \"type\": \"session.idle\",\n  \"properties\": {\n    \"sessionID\": \"s1\"\n  }\n}\n";
        let value: Value = serde_json::from_str(stdin).unwrap();
        assert!(forward(&path, &value).await);

        let received = server.await.unwrap().unwrap();
        let event = HostEvent::parse(&received).unwrap();
        assert_eq!(event.kind, HostEventKind::SessionIdle);
        assert_eq!(event.session_id.as_deref(), Some("s1"));
    }
}
