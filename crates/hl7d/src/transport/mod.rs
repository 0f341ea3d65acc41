//! TCP listener for MLLP connections.
//!
//! The listener binds the configured endpoint and accepts connections on a
//! background thread, handing each one to a [`ConnectionHandler`] on its own
//! thread.

mod errors;
mod listener;

use std::net::TcpStream;

pub use self::errors::ListenerError;
pub use self::listener::{ListenerHandle, MllpListener};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Handles accepted connections.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Serves one connection until the peer leaves or the connection fails.
    /// Implementations should avoid panicking.
    fn handle(&self, stream: TcpStream);
}
