//! Per-connection MLLP read/reply loop.

use std::io;
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use hl7_core::{FrameError, FrameReader, write_frame};
use tracing::{debug, info, info_span, warn};

use super::{DISPATCH_TARGET, Dispatcher};
use crate::transport::ConnectionHandler;

/// Serves MLLP frames on accepted connections.
///
/// Frames are answered in the order they arrive. A frame that cannot be
/// decoded but leaves the stream in sync is answered with an invalid-message
/// acknowledgement; anything else closes the connection. The read timeout
/// bounds both the wait for a frame to start and the time one frame may take
/// to arrive.
#[derive(Debug)]
pub struct MllpConnectionHandler {
    dispatcher: Arc<Dispatcher>,
    max_frame_bytes: usize,
    read_timeout: Option<Duration>,
}

impl MllpConnectionHandler {
    /// Creates a handler sharing `dispatcher` across connections.
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        max_frame_bytes: usize,
        read_timeout: Option<Duration>,
    ) -> Self {
        Self {
            dispatcher,
            max_frame_bytes,
            read_timeout,
        }
    }

    fn serve(&self, stream: &TcpStream) -> io::Result<()> {
        stream.set_read_timeout(self.read_timeout)?;
        let mut writer = stream.try_clone()?;
        let mut frames = FrameReader::new(stream, self.max_frame_bytes)
            .with_frame_timeout(self.read_timeout);
        loop {
            match frames.next_frame() {
                Ok(Some(body)) => {
                    let dispatch = self.dispatcher.dispatch(&body);
                    debug!(
                        target: DISPATCH_TARGET,
                        outcome = ?dispatch.outcome,
                        "writing reply"
                    );
                    write_frame(&mut writer, &dispatch.reply)?;
                }
                Ok(None) => return Ok(()),
                Err(error) if error.is_recoverable() => {
                    info!(
                        target: DISPATCH_TARGET,
                        error = %error,
                        "answering undecodable frame"
                    );
                    let dispatch = self.dispatcher.invalid_frame(&error.to_string());
                    write_frame(&mut writer, &dispatch.reply)?;
                }
                Err(FrameError::TimedOut) => {
                    info!(target: DISPATCH_TARGET, "closing connection after read timeout");
                    return Ok(());
                }
                Err(error) => {
                    warn!(
                        target: DISPATCH_TARGET,
                        error = %error,
                        "closing connection after stream error"
                    );
                    return Ok(());
                }
            }
        }
    }
}

impl ConnectionHandler for MllpConnectionHandler {
    fn handle(&self, stream: TcpStream) {
        let peer = stream
            .peer_addr()
            .map_or_else(|_| "unknown".to_owned(), |addr| addr.to_string());
        let _span = info_span!(target: DISPATCH_TARGET, "connection", %peer).entered();
        debug!(target: DISPATCH_TARGET, "serving connection");
        if let Err(error) = self.serve(&stream) {
            warn!(
                target: DISPATCH_TARGET,
                error = %error,
                "connection failed"
            );
        }
        if let Err(error) = stream.shutdown(Shutdown::Both) {
            debug!(
                target: DISPATCH_TARGET,
                error = %error,
                "socket already closed"
            );
        }
        debug!(target: DISPATCH_TARGET, "connection closed");
    }
}
