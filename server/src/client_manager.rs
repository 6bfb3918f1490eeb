//! Client connection bookkeeping and broadcast fan-out
//!
//! This module manages the sessions of connected clients, including:
//! - Session lifecycle (connect, disconnect)
//! - Opaque session ids for logging
//! - The last-accepted-update timestamp driving the rate limiter
//! - Broadcast delivery to every connected client with per-connection
//!   failure isolation
//!
//! Sessions are keyed by a `u64` connection id assigned when the socket is
//! accepted. Ids are never reused, so a session key cannot outlive its
//! connection. The registry is the sole owner of session records; the
//! connection tasks only hold the read side of their outbound channel.

use log::{debug, info};
use rand::{distributions::Alphanumeric, Rng};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::utils::get_timestamp;
use std::collections::HashMap;

/// Stable handle for one accepted connection.
pub type ConnectionId = u64;

/// Length of the opaque session id attached to log lines.
const SESSION_ID_LEN: usize = 21;

/// One connected client and its rate-limit state.
#[derive(Debug)]
pub struct ClientSession {
    /// Opaque id used in log output.
    pub id: String,
    /// Epoch milliseconds of the last accepted pixel update; 0 until the
    /// first update is accepted.
    pub last_update: u64,
    /// Outbound channel drained by the connection's writer task.
    pub sender: mpsc::UnboundedSender<Message>,
}

/// Manages all connected client sessions.
///
/// All mutation happens on the server's event loop, so the manager needs no
/// internal locking. Broadcast failures to individual connections are
/// isolated: a closed or dead connection never prevents delivery to the
/// remaining clients.
pub struct ClientManager {
    clients: HashMap<ConnectionId, ClientSession>,
}

impl ClientManager {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    /// Registers a new client session for an accepted connection.
    ///
    /// Generates an opaque session id and stores the session with a zeroed
    /// update timestamp, so the first pixel update is never rate-limited.
    pub fn add_client(&mut self, conn_id: ConnectionId, sender: mpsc::UnboundedSender<Message>) {
        let id = generate_id();
        info!("Client connected: {}", id);
        self.clients.insert(
            conn_id,
            ClientSession {
                id,
                last_update: 0,
                sender,
            },
        );
    }

    /// Removes a client session.
    ///
    /// A connection can race its own close event, so removing an unknown id
    /// is a no-op rather than an error.
    pub fn remove_client(&mut self, conn_id: ConnectionId) {
        if let Some(client) = self.clients.remove(&conn_id) {
            info!("Client disconnected: {}", client.id);
        }
    }

    /// Looks up the session for a connection, if it is still registered.
    pub fn get_client(&self, conn_id: ConnectionId) -> Option<&ClientSession> {
        self.clients.get(&conn_id)
    }

    /// Records the current time as the client's last accepted update.
    pub fn update_client_timestamp(&mut self, conn_id: ConnectionId) {
        if let Some(client) = self.clients.get_mut(&conn_id) {
            client.last_update = get_timestamp();
        }
    }

    /// Sends a payload to a single connection.
    ///
    /// Delivery failure means the connection is already gone; the failure is
    /// logged and otherwise ignored.
    pub fn send_to_client(&self, conn_id: ConnectionId, payload: &str) {
        if let Some(client) = self.clients.get(&conn_id) {
            if client.sender.send(Message::text(payload)).is_err() {
                debug!("Dropped response to disconnected client {}", client.id);
            }
        }
    }

    /// Broadcasts a payload verbatim to every registered connection,
    /// including the originator of the message that triggered it.
    pub fn broadcast_message(&self, payload: &str) {
        for client in self.clients.values() {
            if client.sender.send(Message::text(payload)).is_err() {
                debug!("Dropped broadcast to disconnected client {}", client.id);
            }
        }
    }

    /// Returns the number of currently connected clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Generates an opaque alphanumeric session id.
fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}
