//! Inbound frame validation and dispatch
//!
//! Every frame a connection task reads lands here. The raw text is parsed
//! against the closed [`ClientMessage`] schema; anything that fails to parse
//! is logged as a warning and dropped without touching server state or the
//! connection. Valid messages dispatch to one handler per kind, and side
//! effects are strictly scoped: only an accepted pixel update broadcasts,
//! while chunk and metadata requests answer the requesting connection only.

use log::{debug, warn};
use shared::{CanvasInfo, ChunkInfo, ClientMessage, RateLimitInfo, Rgb, ServerMessage};

use crate::canvas::Canvas;
use crate::client_manager::{ClientManager, ConnectionId};
use crate::config::Config;
use crate::storage::StorageManager;
use crate::utils::get_timestamp;

/// Validates and dispatches inbound messages.
///
/// The handler holds only the configuration; the mutable state it composes
/// (canvas, client registry, storage) is owned by the server event loop and
/// passed in per call, which keeps every handler invocation serialized.
pub struct MessageHandler {
    config: Config,
}

impl MessageHandler {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Handles one raw text frame from a connection.
    ///
    /// Fails closed: parse and schema errors are logged at warning level
    /// with the parser's description and the frame is otherwise ignored.
    /// The connection stays open and nothing is sent back.
    pub fn handle_message(
        &self,
        conn_id: ConnectionId,
        raw: &str,
        canvas: &mut Canvas,
        clients: &mut ClientManager,
        storage: &mut StorageManager,
    ) {
        let message = match serde_json::from_str::<ClientMessage>(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!("Received invalid message: {}", e);
                return;
            }
        };

        match message {
            ClientMessage::PixelUpdate { x, y, color } => {
                self.handle_pixel_update(conn_id, x, y, color, canvas, clients, storage);
            }
            ClientMessage::GetChunk { x, y } => {
                self.handle_chunk_request(conn_id, x, y, canvas, clients);
            }
            ClientMessage::GetMetadata => {
                self.handle_metadata_request(conn_id, clients);
            }
        }
    }

    /// Applies an accepted pixel update and fans it out.
    ///
    /// Drops the update without any client-visible signal when the client is
    /// unknown (closed mid-flight), the coordinates are out of bounds, or
    /// the cooldown has not elapsed since the client's last accepted update.
    #[allow(clippy::too_many_arguments)]
    fn handle_pixel_update(
        &self,
        conn_id: ConnectionId,
        x: i32,
        y: i32,
        color: Rgb,
        canvas: &mut Canvas,
        clients: &mut ClientManager,
        storage: &mut StorageManager,
    ) {
        let Some(client) = clients.get_client(conn_id) else {
            return;
        };

        if x < 0 || y < 0 || x >= self.config.width as i32 || y >= self.config.height as i32 {
            warn!(
                "Client {} sent out-of-bounds pixel update ({}, {})",
                client.id, x, y
            );
            return;
        }

        let now = get_timestamp();
        if now.saturating_sub(client.last_update) < self.config.cooldown_ms {
            debug!("Rate-limited pixel update from client {}", client.id);
            return;
        }

        canvas.set_pixel(x as u32, y as u32, color);
        clients.update_client_timestamp(conn_id);

        // Fan the accepted update out to every client, the originator included
        let update = ServerMessage::PixelUpdate { x, y, color };
        if let Ok(payload) = serde_json::to_string(&update) {
            clients.broadcast_message(&payload);
        }

        let chunk_x = x as u32 / self.config.chunk_size;
        let chunk_y = y as u32 / self.config.chunk_size;
        storage.mark_chunk_as_modified(chunk_x, chunk_y);
    }

    /// Answers a chunk request on the requesting connection only.
    fn handle_chunk_request(
        &self,
        conn_id: ConnectionId,
        x: i32,
        y: i32,
        canvas: &Canvas,
        clients: &ClientManager,
    ) {
        let response = ServerMessage::Chunk {
            x,
            y,
            data: canvas.get_chunk(x, y),
        };
        if let Ok(payload) = serde_json::to_string(&response) {
            clients.send_to_client(conn_id, &payload);
        }
    }

    /// Answers a metadata request on the requesting connection only, with
    /// the full configuration snapshot a client needs to bootstrap.
    fn handle_metadata_request(&self, conn_id: ConnectionId, clients: &ClientManager) {
        let response = ServerMessage::Metadata {
            canvas: CanvasInfo {
                width: self.config.width,
                height: self.config.height,
            },
            chunks: ChunkInfo {
                size: self.config.chunk_size,
            },
            ratelimits: RateLimitInfo {
                cooldown: self.config.cooldown_ms,
            },
        };
        if let Ok(payload) = serde_json::to_string(&response) {
            clients.send_to_client(conn_id, &payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    struct Fixture {
        handler: MessageHandler,
        canvas: Canvas,
        clients: ClientManager,
        storage: StorageManager,
    }

    fn fixture(cooldown_ms: u64) -> Fixture {
        let config = Config::new(
            10,
            10,
            7,
            cooldown_ms,
            PathBuf::from("unused.bin"),
            5000,
            "127.0.0.1".to_string(),
            0,
        )
        .unwrap();

        Fixture {
            handler: MessageHandler::new(config.clone()),
            canvas: Canvas::new(&config),
            clients: ClientManager::new(),
            storage: StorageManager::new(config),
        }
    }

    fn add_client(fx: &mut Fixture, conn_id: u64) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        fx.clients.add_client(conn_id, tx);
        rx
    }

    fn handle(fx: &mut Fixture, conn_id: u64, raw: &str) {
        fx.handler.handle_message(
            conn_id,
            raw,
            &mut fx.canvas,
            &mut fx.clients,
            &mut fx.storage,
        );
    }

    fn recv_text(rx: &mut mpsc::UnboundedReceiver<Message>) -> String {
        rx.try_recv().unwrap().into_text().unwrap()
    }

    #[test]
    fn test_pixel_update_applies_and_broadcasts() {
        let mut fx = fixture(0);
        let mut rx1 = add_client(&mut fx, 1);
        let mut rx2 = add_client(&mut fx, 2);

        handle(
            &mut fx,
            1,
            r#"{"type":"pixelUpdate","x":5,"y":5,"color":[255,0,0]}"#,
        );

        assert_eq!(fx.canvas.get_pixel(5, 5), [255, 0, 0]);
        assert!(fx.clients.get_client(1).unwrap().last_update > 0);

        // Broadcast reaches everyone, the originator included
        let expected = r#"{"type":"pixelUpdate","x":5,"y":5,"color":[255,0,0]}"#;
        assert_eq!(recv_text(&mut rx1), expected);
        assert_eq!(recv_text(&mut rx2), expected);

        // Pixel (5, 5) with chunk size 7 lives in chunk (0, 0)
        assert!(fx.storage.is_chunk_dirty(0, 0));
        assert_eq!(fx.storage.dirty_chunk_count(), 1);
    }

    #[test]
    fn test_pixel_update_marks_containing_chunk() {
        let mut fx = fixture(0);
        let _rx = add_client(&mut fx, 1);

        handle(
            &mut fx,
            1,
            r#"{"type":"pixelUpdate","x":8,"y":9,"color":[1,1,1]}"#,
        );

        assert!(fx.storage.is_chunk_dirty(1, 1));
    }

    #[test]
    fn test_cooldown_blocks_second_update() {
        let mut fx = fixture(600_000);
        let mut rx = add_client(&mut fx, 1);

        handle(
            &mut fx,
            1,
            r#"{"type":"pixelUpdate","x":5,"y":5,"color":[1,2,3]}"#,
        );
        let ts_after_first = fx.clients.get_client(1).unwrap().last_update;

        handle(
            &mut fx,
            1,
            r#"{"type":"pixelUpdate","x":5,"y":5,"color":[9,9,9]}"#,
        );

        // First update wins; the second is silently dropped
        assert_eq!(fx.canvas.get_pixel(5, 5), [1, 2, 3]);
        assert_eq!(fx.clients.get_client(1).unwrap().last_update, ts_after_first);

        // Exactly one broadcast went out
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_zero_cooldown_accepts_consecutive_updates() {
        let mut fx = fixture(0);
        let _rx = add_client(&mut fx, 1);

        handle(
            &mut fx,
            1,
            r#"{"type":"pixelUpdate","x":1,"y":1,"color":[1,1,1]}"#,
        );
        handle(
            &mut fx,
            1,
            r#"{"type":"pixelUpdate","x":1,"y":1,"color":[2,2,2]}"#,
        );

        assert_eq!(fx.canvas.get_pixel(1, 1), [2, 2, 2]);
    }

    #[test]
    fn test_rate_limit_is_per_client() {
        let mut fx = fixture(600_000);
        let _rx1 = add_client(&mut fx, 1);
        let _rx2 = add_client(&mut fx, 2);

        handle(
            &mut fx,
            1,
            r#"{"type":"pixelUpdate","x":1,"y":1,"color":[1,1,1]}"#,
        );
        handle(
            &mut fx,
            2,
            r#"{"type":"pixelUpdate","x":2,"y":2,"color":[2,2,2]}"#,
        );

        // Client 1's cooldown does not block client 2
        assert_eq!(fx.canvas.get_pixel(1, 1), [1, 1, 1]);
        assert_eq!(fx.canvas.get_pixel(2, 2), [2, 2, 2]);
    }

    #[test]
    fn test_update_from_unknown_client_is_noop() {
        let mut fx = fixture(0);
        let mut rx = add_client(&mut fx, 1);

        // Connection 99 raced its own close; nothing happens
        handle(
            &mut fx,
            99,
            r#"{"type":"pixelUpdate","x":5,"y":5,"color":[255,0,0]}"#,
        );

        assert_eq!(fx.canvas.get_pixel(5, 5), [0, 0, 0]);
        assert!(rx.try_recv().is_err());
        assert_eq!(fx.storage.dirty_chunk_count(), 0);
    }

    #[test]
    fn test_out_of_bounds_update_is_rejected() {
        let mut fx = fixture(0);
        let mut rx = add_client(&mut fx, 1);

        handle(
            &mut fx,
            1,
            r#"{"type":"pixelUpdate","x":50,"y":5,"color":[255,0,0]}"#,
        );
        handle(
            &mut fx,
            1,
            r#"{"type":"pixelUpdate","x":-1,"y":5,"color":[255,0,0]}"#,
        );

        assert!(rx.try_recv().is_err());
        assert_eq!(fx.storage.dirty_chunk_count(), 0);
        assert_eq!(fx.clients.get_client(1).unwrap().last_update, 0);
    }

    #[test]
    fn test_chunk_request_answers_requester_only() {
        let mut fx = fixture(0);
        let mut rx1 = add_client(&mut fx, 1);
        let mut rx2 = add_client(&mut fx, 2);

        fx.canvas.set_pixel(0, 0, [255, 0, 0]);
        handle(&mut fx, 1, r#"{"type":"getChunk","x":0,"y":0}"#);

        let response: ServerMessage = serde_json::from_str(&recv_text(&mut rx1)).unwrap();
        match response {
            ServerMessage::Chunk { x, y, data } => {
                assert_eq!((x, y), (0, 0));
                assert_eq!(data.len(), 7 * 7 * 3);
                assert_eq!(&data[0..3], &[255, 0, 0]);
            }
            _ => panic!("Expected a chunk response"),
        }

        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn test_metadata_request_reflects_configuration() {
        let mut fx = fixture(600_000);
        let mut rx = add_client(&mut fx, 1);

        handle(&mut fx, 1, r#"{"type":"getMetadata"}"#);

        let raw = recv_text(&mut rx);
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "metadata",
                "canvas": {"width": 10, "height": 10},
                "chunks": {"size": 7},
                "ratelimits": {"cooldown": 600_000},
            })
        );
    }

    #[test]
    fn test_malformed_frame_changes_nothing() {
        let mut fx = fixture(0);
        let mut rx = add_client(&mut fx, 1);
        let before = fx.canvas.as_bytes().to_vec();

        handle(&mut fx, 1, "not json at all");
        handle(&mut fx, 1, r#"{"type":"bogus"}"#);
        handle(&mut fx, 1, r#"{"type":"pixelUpdate","x":1,"y":1}"#);
        handle(
            &mut fx,
            1,
            r#"{"type":"pixelUpdate","x":1,"y":1,"color":[0,0,999]}"#,
        );

        assert_eq!(fx.canvas.as_bytes(), &before[..]);
        assert!(rx.try_recv().is_err());
        assert_eq!(fx.storage.dirty_chunk_count(), 0);
    }

    #[test]
    fn test_requests_never_broadcast() {
        let mut fx = fixture(0);
        let _rx1 = add_client(&mut fx, 1);
        let mut rx2 = add_client(&mut fx, 2);

        handle(&mut fx, 1, r#"{"type":"getChunk","x":0,"y":0}"#);
        handle(&mut fx, 1, r#"{"type":"getMetadata"}"#);

        assert!(rx2.try_recv().is_err());
    }
}
