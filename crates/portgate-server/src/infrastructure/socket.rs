//! Listening socket construction.
//!
//! `TcpListener::bind` always uses the platform's default backlog.  The
//! listener relies on the backlog to hold clients while every admission slot
//! is busy, so the socket is built with [`TcpSocket`] and an explicit
//! backlog instead.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpSocket};
use tracing::debug;

use crate::infrastructure::error::ServerError;

/// Creates, binds, and listens on `addr` with the given `backlog`.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the socket cannot be created or bound
/// (e.g. the port is in use) and [`ServerError::Listen`] if `listen()` fails.
pub fn listen_on(addr: SocketAddr, backlog: u32) -> Result<TcpListener, ServerError> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|source| ServerError::Bind { addr, source })?;

    // Lets a restarted server rebind while old connections sit in TIME_WAIT.
    #[cfg(unix)]
    socket
        .set_reuseaddr(true)
        .map_err(|source| ServerError::Bind { addr, source })?;

    socket
        .bind(addr)
        .map_err(|source| ServerError::Bind { addr, source })?;

    let listener = socket
        .listen(backlog)
        .map_err(|source| ServerError::Listen { addr, source })?;

    debug!("listening socket ready on {addr} (backlog {backlog})");
    Ok(listener)
}
