//! Server network layer: WebSocket connection lifecycle and the event loop
//! that owns all mutable state

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use crate::canvas::Canvas;
use crate::client_manager::{ClientManager, ConnectionId};
use crate::config::Config;
use crate::message_handler::MessageHandler;
use crate::storage::StorageManager;

/// Events sent from connection tasks to the main server loop.
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        conn_id: ConnectionId,
        sender: mpsc::UnboundedSender<Message>,
    },
    Disconnected {
        conn_id: ConnectionId,
    },
    Frame {
        conn_id: ConnectionId,
        text: String,
    },
}

/// Main server coordinating connection lifecycle, message dispatch and the
/// periodic persistence flush.
///
/// All mutable state (canvas, client registry, dirty-chunk set) is owned by
/// this struct and touched only from [`Server::run`]'s single event loop,
/// so handlers execute serialized and no locking is needed. Connection
/// tasks communicate with the loop exclusively through [`ServerEvent`]s.
pub struct Server {
    listener: TcpListener,
    config: Config,
    canvas: Canvas,
    clients: ClientManager,
    storage: StorageManager,
    handler: MessageHandler,
    next_conn_id: ConnectionId,

    event_tx: mpsc::UnboundedSender<ServerEvent>,
    event_rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Server {
    /// Binds the listener and loads the persisted canvas.
    ///
    /// A missing snapshot file bootstraps a blank canvas; any other load
    /// failure propagates, terminating startup before connections are
    /// accepted.
    pub async fn new(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let storage = StorageManager::new(config.clone());
        let snapshot = storage.read_from_disk().await?;

        let mut canvas = Canvas::new(&config);
        canvas.load(snapshot);

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            handler: MessageHandler::new(config.clone()),
            config,
            canvas,
            clients: ClientManager::new(),
            storage,
            next_conn_id: 1,
            event_tx,
            event_rx,
        })
    }

    /// The address the listener is bound to. Useful when binding port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Main server loop coordinating all operations.
    ///
    /// Accepts connections, processes connection events, flushes
    /// persistence on the configured interval and exits on Ctrl+C after a
    /// final snapshot write.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut flush_interval = interval(Duration::from_millis(self.config.flush_interval_ms));
        flush_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Skip the first tick since it fires immediately
        flush_interval.tick().await;

        info!("Server started successfully");

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let conn_id = self.next_conn_id;
                            self.next_conn_id += 1;
                            tokio::spawn(handle_connection(
                                conn_id,
                                stream,
                                addr,
                                self.event_tx.clone(),
                            ));
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                        }
                    }
                },

                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        // All senders gone; cannot happen while we hold event_tx
                        None => break,
                    }
                },

                _ = flush_interval.tick() => {
                    if let Err(e) = self.storage.flush_to_disk(&self.canvas).await {
                        error!("Failed to flush canvas to disk: {}", e);
                    }
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down gracefully...");
                    break;
                },
            }
        }

        // Final snapshot so nothing painted since the last tick is lost
        if let Err(e) = self.storage.write_to_disk(self.canvas.as_bytes()).await {
            error!("Failed to write final snapshot: {}", e);
        }
        info!("Server shut down");

        Ok(())
    }

    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Connected { conn_id, sender } => {
                self.clients.add_client(conn_id, sender);
            }
            ServerEvent::Disconnected { conn_id } => {
                self.clients.remove_client(conn_id);
            }
            ServerEvent::Frame { conn_id, text } => {
                self.handler.handle_message(
                    conn_id,
                    &text,
                    &mut self.canvas,
                    &mut self.clients,
                    &mut self.storage,
                );
            }
        }
    }
}

/// Performs the WebSocket handshake and services one connection.
///
/// The writer task drains the connection's outbound channel into the socket
/// and stops on the first failed send. The reader loop forwards text frames
/// to the event loop; binary frames are decoded as UTF-8 text, matching the
/// message handler's raw-bytes contract. When the connection ends for any
/// reason a disconnect event is emitted, and broadcasts still queued for
/// the connection fail silently in the writer.
async fn handle_connection(
    conn_id: ConnectionId,
    stream: TcpStream,
    addr: SocketAddr,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    debug!("WebSocket connection {} established from {}", conn_id, addr);

    let (mut ws_sink, mut ws_source) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();

    if event_tx
        .send(ServerEvent::Connected {
            conn_id,
            sender: out_tx,
        })
        .is_err()
    {
        return;
    }

    // Writer: exits when the registry drops this connection's sender or the
    // socket rejects a send
    tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if ws_sink.send(message).await.is_err() {
                break;
            }
        }
    });

    // Reader
    while let Some(frame) = ws_source.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if event_tx.send(ServerEvent::Frame { conn_id, text }).is_err() {
                    break;
                }
            }
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => {
                    if event_tx.send(ServerEvent::Frame { conn_id, text }).is_err() {
                        break;
                    }
                }
                Err(_) => {
                    warn!("Received non-UTF-8 binary frame on connection {}", conn_id);
                }
            },
            Ok(Message::Close(_)) => break,
            // Pings are answered by the protocol layer; pongs carry no state
            Ok(_) => {}
            Err(e) => {
                debug!("Connection {} error: {}", conn_id, e);
                break;
            }
        }
    }

    let _ = event_tx.send(ServerEvent::Disconnected { conn_id });
    debug!("Connection {} closed", conn_id);
}
