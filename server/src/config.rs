use std::path::PathBuf;

/// Validated server settings consumed by every component.
///
/// Construction goes through [`Config::new`], which rejects degenerate
/// values; the rest of the server can rely on positive dimensions and a
/// positive chunk size without re-checking them.
#[derive(Debug, Clone)]
pub struct Config {
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    /// Edge length of the square chunks used for bulk transfer and
    /// persistence tracking.
    pub chunk_size: u32,
    /// Minimum time in milliseconds between accepted pixel updates from the
    /// same client.
    pub cooldown_ms: u64,
    /// Path of the raw canvas snapshot file.
    pub snapshot_path: PathBuf,
    /// Interval in milliseconds between persistence flushes.
    pub flush_interval_ms: u64,
    /// Address the WebSocket listener binds to.
    pub host: String,
    pub port: u16,
}

impl Config {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        width: u32,
        height: u32,
        chunk_size: u32,
        cooldown_ms: u64,
        snapshot_path: PathBuf,
        flush_interval_ms: u64,
        host: String,
        port: u16,
    ) -> Result<Self, String> {
        if width == 0 || height == 0 {
            return Err(format!("Canvas dimensions must be positive, got {}x{}", width, height));
        }
        if chunk_size == 0 {
            return Err("Chunk size must be positive".to_string());
        }
        if flush_interval_ms == 0 {
            return Err("Flush interval must be positive".to_string());
        }

        Ok(Self {
            width,
            height,
            chunk_size,
            cooldown_ms,
            snapshot_path,
            flush_interval_ms,
            host,
            port,
        })
    }

    /// Length in bytes of the full canvas buffer.
    pub fn canvas_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 1000,
            chunk_size: 100,
            cooldown_ms: 5 * 60 * 1000,
            snapshot_path: PathBuf::from("data/canvas.bin"),
            flush_interval_ms: 5000,
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}
