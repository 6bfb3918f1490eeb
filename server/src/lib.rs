//! # Pixel-Canvas Server Library
//!
//! This library implements the server side of a collaborative pixel canvas:
//! a shared grid of RGB cells that many clients observe and paint over
//! persistent WebSocket connections. The server applies rate-limited
//! single-pixel writes, fans every accepted write out to all connected
//! clients, serves bulk reads chunk by chunk, and persists the canvas to
//! disk.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Canvas State
//! The server owns the definitive canvas buffer. Clients bootstrap from a
//! metadata snapshot, fetch the regions they can see chunk by chunk, and
//! then keep their local copy in sync by applying the same pixel updates
//! the server broadcasts.
//!
//! ### Client Management
//! Handles the complete lifecycle of client connections including:
//! - Session registration at connection open and cleanup at close
//! - Per-client rate limiting via last-accepted-update timestamps
//! - Broadcast fan-out with per-connection failure isolation
//!
//! ### Persistence
//! The canvas survives restarts through a raw whole-buffer snapshot file.
//! Writes mark their containing chunk dirty, and a periodic flush persists
//! state independent of message traffic.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! All connection events, inbound frames and flush ticks funnel into one
//! event loop that owns every piece of mutable state. Handlers never run
//! concurrently, so canvas mutations are atomic with respect to all other
//! messages and no locking discipline is needed.
//!
//! ### Validated Message Boundary
//! Inbound frames are parsed against a closed, tagged JSON schema before
//! any handler sees them. Malformed frames are logged and dropped without
//! affecting the connection; handlers only ever observe well-formed,
//! strongly-typed messages.
//!
//! ## Module Organization
//!
//! - [`canvas`]: the flat pixel buffer with chunk extraction
//! - [`client_manager`]: session registry and broadcast delivery
//! - [`message_handler`]: frame validation, dispatch and rate limiting
//! - [`storage`]: snapshot persistence and dirty-chunk tracking
//! - [`network`]: connection lifecycle and the main event loop
//! - [`config`]: the validated settings object shared by all components
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::Config;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Bind with the default settings: a 1000x1000 canvas served on
//!     // ws://127.0.0.1:3000 with a 5 minute pixel cooldown
//!     let mut server = Server::new(Config::default()).await?;
//!
//!     // Run the event loop: accept connections, dispatch messages,
//!     // flush the canvas to disk periodically, exit on Ctrl+C
//!     server.run().await
//! }
//! ```

pub mod canvas;
pub mod client_manager;
pub mod config;
pub mod message_handler;
pub mod network;
pub mod storage;
pub mod utils;
