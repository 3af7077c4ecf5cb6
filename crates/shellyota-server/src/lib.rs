//! Transient OTA firmware server
//!
//! One listener, one router: requests for `/{device_id}` are answered
//! from a per-device handler map. Each handler serves the firmware file
//! assigned to that device and signals completion back to the
//! orchestrator, which is how the upgrade flow learns the device has
//! actually pulled its image.
//!
//! Handlers are replaced wholesale when a later upgrade pass installs a
//! new one for the same device; unknown device ids answer 404.

#![deny(unused_must_use, clippy::unwrap_used)]
#![warn(rust_2018_idioms)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Grace period for in-flight downloads during shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A firmware file assigned to one device, with the channel used to
/// signal that the device has fetched it.
struct FirmwareHandler {
    path: PathBuf,
    completed: mpsc::Sender<()>,
}

#[derive(Default)]
struct ServerState {
    handlers: RwLock<HashMap<String, FirmwareHandler>>,
}

/// The transient OTA file server.
pub struct OtaServer {
    state: Arc<ServerState>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Default for OtaServer {
    fn default() -> Self {
        Self::new()
    }
}

impl OtaServer {
    /// Creates a server with an empty handler map. Call
    /// [`spawn`](OtaServer::spawn) with a bound listener to start
    /// serving.
    pub fn new() -> Self {
        Self {
            state: Arc::new(ServerState::default()),
            shutdown: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Installs (or replaces) the firmware handler for a device and
    /// returns the receiver the orchestrator awaits for completion.
    pub fn set_handler(&self, device_id: &str, path: PathBuf) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel(1);
        debug!("Adding HTTP handler for /{device_id}");
        self.state.handlers.write().insert(
            device_id.to_string(),
            FirmwareHandler {
                path,
                completed: tx,
            },
        );
        rx
    }

    /// Starts serving on the given listener. The server runs until
    /// [`shutdown`](OtaServer::shutdown) is called.
    pub fn spawn(&self, listener: TcpListener) {
        let app = Router::new()
            .route("/:device_id", get(serve_firmware))
            .with_state(Arc::clone(&self.state));

        let (tx, rx) = oneshot::channel();
        *self.shutdown.lock() = Some(tx);

        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = rx.await;
            });
            if let Err(err) = server.await {
                warn!("OTA HTTP server error: {err}");
            }
        });
        *self.task.lock() = Some(task);
    }

    /// Gracefully stops the server, waiting up to five seconds for
    /// in-flight downloads to finish.
    pub async fn shutdown(&self) {
        let Some(tx) = self.shutdown.lock().take() else {
            return;
        };
        let _ = tx.send(());

        let task = self.task.lock().take();
        if let Some(task) = task {
            match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                Ok(_) => debug!("OTA HTTP server shut down gracefully"),
                Err(_) => warn!("OTA HTTP server did not shut down within {SHUTDOWN_GRACE:?}"),
            }
        }
    }
}

/// Serves the firmware file assigned to `device_id` and signals
/// completion to the orchestrator.
async fn serve_firmware(
    State(state): State<Arc<ServerState>>,
    Path(device_id): Path<String>,
) -> Response {
    let (path, completed) = {
        let handlers = state.handlers.read();
        match handlers.get(&device_id) {
            Some(handler) => (handler.path.clone(), handler.completed.clone()),
            None => return StatusCode::NOT_FOUND.into_response(),
        }
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Serving file {} for device {device_id}", path.display());
            let _ = completed.try_send(());
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/octet-stream")],
                bytes,
            )
                .into_response()
        }
        Err(err) => {
            warn!(
                "Failed to read firmware file {} for device {device_id}: {err}",
                path.display()
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    async fn start_server() -> (OtaServer, u16) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let server = OtaServer::new();
        server.spawn(listener);
        (server, port)
    }

    #[tokio::test]
    async fn serves_assigned_file_and_signals_completion() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(b"firmware-bytes").expect("write");

        let (server, port) = start_server().await;
        let mut completed = server.set_handler("shelly-AABBCC", file.path().to_path_buf());

        let body = reqwest::get(format!("http://127.0.0.1:{port}/shelly-AABBCC"))
            .await
            .expect("request")
            .bytes()
            .await
            .expect("body");
        assert_eq!(&body[..], b"firmware-bytes");

        tokio::time::timeout(Duration::from_secs(1), completed.recv())
            .await
            .expect("completion signal");

        server.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_device_is_not_found() {
        let (server, port) = start_server().await;

        let status = reqwest::get(format!("http://127.0.0.1:{port}/unknown"))
            .await
            .expect("request")
            .status();
        assert_eq!(status, reqwest::StatusCode::NOT_FOUND);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn replacing_a_handler_supersedes_the_old_one() {
        let mut old_file = tempfile::NamedTempFile::new().expect("tempfile");
        old_file.write_all(b"old").expect("write");
        let mut new_file = tempfile::NamedTempFile::new().expect("tempfile");
        new_file.write_all(b"new").expect("write");

        let (server, port) = start_server().await;
        let _old_rx = server.set_handler("dev", old_file.path().to_path_buf());
        let mut new_rx = server.set_handler("dev", new_file.path().to_path_buf());

        let body = reqwest::get(format!("http://127.0.0.1:{port}/dev"))
            .await
            .expect("request")
            .bytes()
            .await
            .expect("body");
        assert_eq!(&body[..], b"new");

        tokio::time::timeout(Duration::from_secs(1), new_rx.recv())
            .await
            .expect("completion on the new handler");

        server.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_accepting_connections() {
        let (server, port) = start_server().await;

        // Reachable before shutdown.
        let status = reqwest::get(format!("http://127.0.0.1:{port}/nothing"))
            .await
            .expect("request")
            .status();
        assert_eq!(status, reqwest::StatusCode::NOT_FOUND);

        server.shutdown().await;

        let result = reqwest::Client::builder()
            .timeout(Duration::from_millis(500))
            .build()
            .expect("client")
            .get(format!("http://127.0.0.1:{port}/nothing"))
            .send()
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn shutdown_without_spawn_is_a_no_op() {
        let server = OtaServer::new();
        server.shutdown().await;
    }
}
