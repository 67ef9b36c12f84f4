//! portgate-send: entry point.
//!
//! ```text
//! portgate-send [--port <PORT>] <HOST> <MESSAGE>
//! ```
//!
//! Sends `MESSAGE` followed by a NUL byte to `HOST:PORT` and exits.  Connect
//! and send failures are reported on stderr but still exit 0; only a usage
//! error exits non-zero.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use portgate_core::protocol::DEFAULT_PORT;
use portgate_send::send_once;

/// Send one message to a portgate server.
#[derive(Debug, Parser)]
#[command(name = "portgate-send", about = "Send one message to a portgate server", version)]
struct Cli {
    /// Server host name or IP address.
    host: String,

    /// Message text.  A NUL terminator is appended.
    message: String,

    /// Server TCP port.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PORTGATE_PORT")]
    port: u16,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match send_once(&cli.host, cli.port, &cli.message).await {
        Ok(sent) => info!("sent {sent} bytes to {}:{}", cli.host, cli.port),
        Err(e) => error!("{e}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
