use serde::{Deserialize, Serialize};

/// One canvas cell as (R, G, B). The channel range 0-255 is carried by the
/// type, so deserialization rejects out-of-range channels before dispatch.
pub type Rgb = [u8; 3];

/// Messages a client may send to the server.
///
/// The wire format is a JSON object tagged by its `type` field. Anything that
/// does not parse into exactly one of these variants is a protocol violation
/// and never reaches handler logic.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Paint a single pixel. Coordinates are pixel coordinates.
    PixelUpdate { x: i32, y: i32, color: Rgb },
    /// Request one chunk of the canvas. Coordinates are chunk coordinates,
    /// not pixel coordinates.
    GetChunk { x: i32, y: i32 },
    /// Request the configuration snapshot a client needs to bootstrap its
    /// own canvas model.
    GetMetadata,
}

/// Messages the server sends to clients.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// An accepted pixel update, re-emitted to every connected client in the
    /// same shape it arrived in.
    PixelUpdate { x: i32, y: i32, color: Rgb },
    /// Response to `GetChunk`: the requested chunk as a flat byte array of
    /// length `chunk_size * chunk_size * 3`.
    Chunk { x: i32, y: i32, data: Vec<u8> },
    /// Response to `GetMetadata`.
    Metadata {
        canvas: CanvasInfo,
        chunks: ChunkInfo,
        ratelimits: RateLimitInfo,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CanvasInfo {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    pub size: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Minimum time in milliseconds a client must wait between accepted
    /// pixel updates.
    pub cooldown: u64,
}
