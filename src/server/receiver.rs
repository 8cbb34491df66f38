//! Ephemeral-port binding of the webhook receiver.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::routes::{app_router, AppState};
use crate::storage::EventStore;
use crate::utilities::errors::LifecycleError;

/// How long `close` waits for in-flight requests before aborting the server.
const GRACEFUL_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Binds the webhook router on a local port.
pub struct WebhookReceiver;

impl WebhookReceiver {
    /// Bind on loopback, letting the OS choose the port.
    pub async fn bind(store: Arc<EventStore>) -> Result<BoundReceiver, LifecycleError> {
        Self::bind_to(store, SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).await
    }

    /// Bind on `addr` and start serving in a background task.
    pub async fn bind_to(
        store: Arc<EventStore>,
        addr: SocketAddr,
    ) -> Result<BoundReceiver, LifecycleError> {
        let listener = TcpListener::bind(addr).await.map_err(LifecycleError::Bind)?;
        let local_addr = listener.local_addr().map_err(LifecycleError::Bind)?;
        let app = app_router(AppState::new(store));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        log::info!("Webhook receiver listening on {}", local_addr);
        Ok(BoundReceiver {
            local_addr,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }
}

/// A running receiver. Dropping it without `close` leaves the server
/// running until the runtime stops.
pub struct BoundReceiver {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl BoundReceiver {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Port assigned by the OS.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_none()
    }

    /// Stop accepting connections and wait for the server task. Closing
    /// twice is a no-op.
    pub async fn close(&mut self) -> std::io::Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let Some(mut task) = self.task.take() else {
            return Ok(());
        };

        match tokio::time::timeout(GRACEFUL_CLOSE_TIMEOUT, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                join_err.to_string(),
            )),
            Err(_) => {
                log::warn!(
                    "Webhook receiver did not drain within {:?}; aborting",
                    GRACEFUL_CLOSE_TIMEOUT
                );
                task.abort();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_bind_ephemeral_port_and_receive() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(EventStore::open(dir.path().join("events.db")).unwrap());
        let mut receiver = WebhookReceiver::bind(Arc::clone(&store)).await.unwrap();
        assert_ne!(receiver.port(), 0);

        let url = format!("http://{}/", receiver.local_addr());
        let response = reqwest::Client::new()
            .post(&url)
            .json(&json!({
                "app_id": "APP1",
                "event_time": "2025-05-01T10:00:00Z",
                "message_delivery_report": {
                    "message_id": "M1",
                    "status": "READ",
                    "channel_identity": {"channel": "RCS"}
                }
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(store.query_by_message_id("M1").unwrap().len(), 1);

        receiver.close().await.unwrap();
        assert!(receiver.is_closed());
        receiver.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(EventStore::open(dir.path().join("events.db")).unwrap());
        let first = WebhookReceiver::bind(Arc::clone(&store)).await.unwrap();

        let err = WebhookReceiver::bind_to(store, first.local_addr())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, LifecycleError::Bind(_)));
    }
}
