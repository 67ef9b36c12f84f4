//! portgate-server: entry point.
//!
//! Accepts TCP clients on one port, serves at most `max_clients` of them at
//! a time, and logs the single message each client sends.  Only one server
//! per pid file may run; a second copy prints a notice and exits successfully.
//!
//! # Usage
//!
//! ```text
//! portgate-server [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>            TOML config file
//!       --bind <ADDR>              IP address to bind [default: 0.0.0.0]
//!   -p, --port <PORT>              TCP port [default: 5008]
//!       --backlog <N>              Kernel accept-queue length [default: 32]
//!       --max-clients <N>          Concurrent clients [default: 32]
//!       --read-buffer-size <BYTES> Bytes read per client [default: 1024]
//!       --read-timeout-secs <SECS> Per-client read timeout [default: none]
//!       --pid-file <FILE>          Single-instance lock [default: /var/run/portgate.pid]
//!       --log-level <LEVEL>        Log level when RUST_LOG is unset [default: info]
//! ```
//!
//! # Configuration precedence
//!
//! Command-line flag, then `PORTGATE_*` environment variable, then the
//! config file, then the built-in default.
//!
//! | Variable                     | Flag                  |
//! |------------------------------|-----------------------|
//! | `PORTGATE_CONFIG`            | `--config`            |
//! | `PORTGATE_BIND`              | `--bind`              |
//! | `PORTGATE_PORT`              | `--port`              |
//! | `PORTGATE_BACKLOG`           | `--backlog`           |
//! | `PORTGATE_MAX_CLIENTS`       | `--max-clients`       |
//! | `PORTGATE_READ_BUFFER_SIZE`  | `--read-buffer-size`  |
//! | `PORTGATE_READ_TIMEOUT_SECS` | `--read-timeout-secs` |
//! | `PORTGATE_PID_FILE`          | `--pid-file`          |
//! | `PORTGATE_LOG_LEVEL`         | `--log-level`         |
//!
//! # Exit status
//!
//! 0 after an orderly shutdown (SIGINT/SIGTERM) or when another instance
//! already holds the pid file; non-zero when configuration, the pid file,
//! bind or listen fail, or when accept fails unrecoverably.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use portgate_server::application::{AdmissionLimiter, ConnectionWorker, LogHandler, WorkerSettings};
use portgate_server::domain::ServerConfig;
use portgate_server::infrastructure::signals::install_signal_handlers;
use portgate_server::infrastructure::storage::{load_config, FileConfig};
use portgate_server::infrastructure::{
    listen_on, shutdown_channel, singleton, ListenerLoop, LoopExit, ServerError, ServerState,
    ShutdownHook, SingletonError,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Bounded-concurrency TCP listener.
///
/// Every option is optional: unset options fall back to the config file and
/// then to the built-in defaults.
#[derive(Debug, Default, Parser)]
#[command(
    name = "portgate-server",
    about = "Bounded-concurrency TCP listener with a single-instance guard",
    version
)]
struct Cli {
    /// TOML config file.
    #[arg(short, long, env = "PORTGATE_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind the listening socket to.
    #[arg(long, env = "PORTGATE_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.  0 picks a free port.
    #[arg(short, long, env = "PORTGATE_PORT")]
    port: Option<u16>,

    /// Length of the kernel queue of not-yet-accepted connections.
    #[arg(long, env = "PORTGATE_BACKLOG")]
    backlog: Option<u32>,

    /// Maximum number of clients served at the same time.
    #[arg(long, env = "PORTGATE_MAX_CLIENTS")]
    max_clients: Option<usize>,

    /// Bytes read from each client.
    #[arg(long, env = "PORTGATE_READ_BUFFER_SIZE")]
    read_buffer_size: Option<usize>,

    /// Seconds to wait for a client's message before closing it.
    #[arg(long, env = "PORTGATE_READ_TIMEOUT_SECS")]
    read_timeout_secs: Option<u64>,

    /// Single-instance lock file.
    #[arg(long, env = "PORTGATE_PID_FILE")]
    pid_file: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, env = "PORTGATE_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Overlays every option that was given onto `file`.
    fn apply_to(self, file: &mut FileConfig) {
        if let Some(bind) = self.bind {
            file.bind_address = bind;
        }
        if let Some(port) = self.port {
            file.port = port;
        }
        if let Some(backlog) = self.backlog {
            file.backlog = backlog;
        }
        if let Some(max_clients) = self.max_clients {
            file.max_clients = max_clients;
        }
        if let Some(size) = self.read_buffer_size {
            file.read_buffer_size = size;
        }
        if let Some(secs) = self.read_timeout_secs {
            file.read_timeout_secs = Some(secs);
        }
        if let Some(pid_file) = self.pid_file {
            file.pid_file = pid_file;
        }
        if let Some(level) = self.log_level {
            file.log_level = level;
        }
    }

    /// Loads the config file (if any) and layers the CLI on top.
    ///
    /// Returns the validated server config and the log level to use.
    fn resolve(mut self) -> anyhow::Result<(ServerConfig, String)> {
        let mut file = match self.config.take() {
            Some(path) => load_config(&path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => FileConfig::default(),
        };
        self.apply_to(&mut file);

        let log_level = file.log_level.clone();
        let config = file
            .into_server_config()
            .context("invalid configuration")?;
        Ok((config, log_level))
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Startup order:
///
/// 1. Resolve configuration and initialise logging.
/// 2. Take the pid-file lock.  If another process holds it, say so and exit 0.
/// 3. Register the [`ShutdownHook`] with the lock, then attach the admission
///    gate and the listening socket as they are created.
/// 4. Run the accept loop until SIGINT/SIGTERM or a fatal accept error.
/// 5. Fire the hook; the lock is released when the hook is dropped.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, log_level) = Cli::parse().resolve()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .init();

    // ── Single instance ───────────────────────────────────────────────────────
    let lock = match singleton::acquire(&config.pid_file) {
        Ok(lock) => lock,
        Err(SingletonError::AlreadyRunning { path }) => {
            info!("pid file {} is locked by another process", path.display());
            println!("portgate-server: already running");
            return Ok(());
        }
        Err(e) => return Err(e).context("failed to take the single-instance lock"),
    };
    info!(
        "portgate-server starting (pid {}, lock {})",
        lock.pid(),
        lock.path().display()
    );

    let mut hook = ShutdownHook::register(ServerState::new().with_lock(lock));

    // ── Admission gate and listening socket ───────────────────────────────────
    let limiter = AdmissionLimiter::new(config.max_clients)
        .map_err(ServerError::from)
        .context("failed to create the admission gate")?;
    hook.attach_limiter(limiter.clone());

    let listener = listen_on(config.bind_addr, config.backlog)
        .with_context(|| format!("cannot listen on {}", config.bind_addr))?;
    hook.attach_listener(listener);

    if config.read_timeout.is_none() {
        warn!("no read timeout configured: a silent client holds its slot until it disconnects");
    }

    // ── Shutdown wiring ───────────────────────────────────────────────────────
    let (trigger, signal) = shutdown_channel();
    install_signal_handlers(trigger).context("failed to install signal handlers")?;

    // ── Accept loop ───────────────────────────────────────────────────────────
    let worker = ConnectionWorker::new(Arc::new(LogHandler), WorkerSettings::from(&config));
    let listener_loop = ListenerLoop::new(worker, limiter);

    let result = match hook.state().listener() {
        Some(listener) => listener_loop.run(listener, signal).await,
        None => Err(ServerError::NotListening),
    };

    hook.fire();

    match result.context("accept loop failed")? {
        LoopExit::Shutdown => info!("portgate-server stopped"),
        LoopExit::GateClosed => info!("portgate-server stopped: admission gate closed"),
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
