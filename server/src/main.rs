use clap::Parser;
use server::config::Config;
use server::network::Server;
use std::path::PathBuf;

/// Main-method of the application.
/// Parses command-line arguments into the server configuration, then runs
/// the server until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "3000")]
        port: u16,
        /// Canvas width in pixels
        #[clap(long, default_value = "1000")]
        width: u32,
        /// Canvas height in pixels
        #[clap(long, default_value = "1000")]
        height: u32,
        /// Edge length of the square transfer chunks
        #[clap(long, default_value = "100")]
        chunk_size: u32,
        /// Minimum milliseconds between accepted pixel updates per client
        #[clap(long, default_value = "300000")]
        cooldown_ms: u64,
        /// Path of the canvas snapshot file
        #[clap(long, default_value = "data/canvas.bin")]
        snapshot_path: PathBuf,
        /// Milliseconds between persistence flushes
        #[clap(long, default_value = "5000")]
        flush_interval_ms: u64,
    }

    env_logger::init();

    let args = Args::parse();
    let config = Config::new(
        args.width,
        args.height,
        args.chunk_size,
        args.cooldown_ms,
        args.snapshot_path,
        args.flush_interval_ms,
        args.host,
        args.port,
    )?;

    let mut server = Server::new(config).await?;
    server.run().await
}
