//! PeerLink Signal Server
//!
//! WebSocket signaling relay for browser peers.
//!
//! # Usage
//!
//! ```bash
//! # Defaults (port 8080, or $PORT)
//! peerlink-signal
//!
//! # Explicit config file, JSON logs
//! peerlink-signal --config /etc/peerlink/config.toml --log-format json
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use peerlink_core::Config;
use peerlink_signal::SignalServer;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "peerlink-signal")]
#[command(about = "PeerLink WebRTC signaling relay")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides config)
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Bind address (overrides config)
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Print a sample configuration file and exit
    #[arg(long)]
    print_config: bool,
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.print_config {
        print!("{}", Config::sample());
        return Ok(());
    }

    init_logging(args.log_format);

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    if let Some(port) = args.port {
        config.signal.port = port;
    }
    if let Some(bind) = args.bind {
        config.signal.bind = bind;
    }

    let addr = SocketAddr::new(config.signal.bind, config.signal.port);

    info!("Starting PeerLink Signal Server");
    if config.signal.allowed_origins.is_empty() {
        info!("Accepting signaling connections from any origin");
    } else {
        info!("Allowed origins: {:?}", config.signal.allowed_origins);
    }

    let server = SignalServer::new(config.signal);

    tokio::select! {
        result = server.serve(addr) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}
