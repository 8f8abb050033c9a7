//! Real-time warning push over WebSocket.
//!
//! The [`NotificationHub`] tracks every live client connection and fans a
//! serialized [`Notification`] out to all of them.  Delivery is best-effort:
//! there is no persistence, no offline queue, and no acknowledgment.  A
//! client that disconnects or falls behind simply misses the message.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::AppState;

/// Per-connection outbound buffer.  A client this far behind is dropped
/// rather than awaited.
const CONNECTION_BUFFER: usize = 32;

/// A warning pushed to every connected client.
///
/// Wire format: `{"title": "...", "message": "...", "type": "warning"}`.
/// `warning` is the only notification type delivered to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Notification {
    /// A category's budget limit has been reached or exceeded.
    pub fn budget_limit(category: &str) -> Self {
        Self {
            title: "Budget Limit Reached".to_string(),
            message: format!("You've reached your budget limit for {category}"),
            kind: "warning".to_string(),
        }
    }

    /// A single expense exceeded the large-expense threshold.
    pub fn large_expense(amount: f64, description: &str) -> Self {
        Self {
            title: "Large Expense Alert".to_string(),
            message: format!("Large expense of {amount:.2} added for {description}"),
            kind: "warning".to_string(),
        }
    }
}

/// Registry of live WebSocket connections.
///
/// Connections register on socket open and deregister on close; broadcasts
/// iterate the membership under a read lock and `try_send`, so a concurrent
/// open/close never invalidates a broadcast in flight.
#[derive(Clone)]
pub struct NotificationHub {
    connections: Arc<RwLock<HashMap<Uuid, mpsc::Sender<Notification>>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a new connection.  Returns its id and the receiving end the
    /// socket task forwards to the client.
    pub async fn register(&self) -> (Uuid, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);
        let id = Uuid::new_v4();

        let mut connections = self.connections.write().await;
        connections.insert(id, tx);

        info!(
            conn = %id,
            connected = connections.len(),
            "Client connected"
        );

        (id, rx)
    }

    /// Remove a connection from the registry.
    pub async fn deregister(&self, id: &Uuid) {
        let mut connections = self.connections.write().await;
        connections.remove(id);

        info!(
            conn = %id,
            connected = connections.len(),
            "Client disconnected"
        );
    }

    /// Push a notification to every live connection.
    ///
    /// Connections whose buffer is full or whose socket task has already
    /// exited are silently skipped.
    pub async fn broadcast(&self, notification: &Notification) {
        let connections = self.connections.read().await;

        debug!(
            title = %notification.title,
            clients = connections.len(),
            "Broadcasting notification"
        );

        for (id, tx) in connections.iter() {
            if tx.try_send(notification.clone()).is_err() {
                debug!(conn = %id, "Dropping notification for closed or slow client");
            }
        }
    }

    /// Number of currently registered connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// WebSocket route
// ---------------------------------------------------------------------------

/// `GET /ws` -- upgrade and attach the connection to the hub.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

async fn handle_socket(mut socket: WebSocket, hub: NotificationHub) {
    let (id, mut rx) = hub.register().await;

    loop {
        tokio::select! {
            outgoing = rx.recv() => {
                let Some(notification) = outgoing else { break };
                match serde_json::to_string(&notification) {
                    Ok(text) => {
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to serialize notification"),
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    // Client frames carry no meaning for this protocol.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(conn = %id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }
        }
    }

    hub.deregister(&id).await;
}
