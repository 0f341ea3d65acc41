//! Errors raised while framing, parsing and routing HL7v2 messages.
//!
//! I/O errors are wrapped in `Arc` to satisfy the `result_large_err` Clippy
//! lint and to keep the enums cloneable for test assertions.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Reasons an MLLP byte stream could not yield a frame.
#[derive(Debug, Clone, Error)]
pub enum FrameError {
    /// The peer closed the stream inside a frame.
    #[error("stream ended inside an MLLP frame after {received} bytes")]
    Truncated {
        /// Body bytes received before the stream ended.
        received: usize,
    },
    /// The frame body exceeded the configured limit.
    #[error("MLLP frame exceeds the {limit} byte limit")]
    Oversized {
        /// Configured maximum body size.
        limit: usize,
    },
    /// A start block arrived before the previous frame was closed.
    #[error("start block received inside an open frame; {discarded} bytes discarded")]
    UnexpectedStartBlock {
        /// Body bytes dropped from the unterminated frame.
        discarded: usize,
    },
    /// The end block was not followed by a carriage return.
    #[error("end block not followed by a carriage return")]
    MissingTrailer,
    /// The frame body is not valid UTF-8.
    #[error("frame body is not valid UTF-8 at byte {valid_up_to}")]
    NotUtf8 {
        /// Length of the valid UTF-8 prefix.
        valid_up_to: usize,
    },
    /// The input held no frame at all.
    #[error("input is not an MLLP frame")]
    NotFramed,
    /// The read timeout or the frame timeout elapsed.
    #[error("timed out waiting for an MLLP frame")]
    TimedOut,
    /// The underlying stream failed.
    #[error("failed to read MLLP stream: {source}")]
    Io {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

impl FrameError {
    /// Whether the reader can resynchronise on the next start block.
    ///
    /// Recoverable errors are answered with an invalid-message ACK. The
    /// others end the connection.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Oversized { .. }
                | Self::UnexpectedStartBlock { .. }
                | Self::MissingTrailer
                | Self::NotUtf8 { .. }
        )
    }
}

impl From<io::Error> for FrameError {
    fn from(source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::TimedOut,
            io::ErrorKind::UnexpectedEof => Self::Truncated { received: 0 },
            _ => Self::Io {
                source: Arc::new(source),
            },
        }
    }
}

/// Reasons a frame body could not be read as an HL7v2 message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The frame contained no segments.
    #[error("message is empty")]
    Empty,
    /// The first segment was not a message header.
    #[error("message must start with MSH, found '{found}'")]
    MissingHeader {
        /// Segment identifier found instead.
        found: String,
    },
    /// The header ended before the encoding characters.
    #[error("MSH segment is too short to declare its encoding characters")]
    TruncatedHeader,
    /// The encoding characters reuse or collide with other delimiters.
    #[error("invalid encoding characters '{characters}'")]
    InvalidEncodingCharacters {
        /// MSH-2 as received.
        characters: String,
    },
    /// A segment identifier was not three upper-case alphanumerics.
    #[error("invalid segment identifier '{id}' at segment {position}")]
    InvalidSegmentId {
        /// Identifier as received.
        id: String,
        /// One-based segment position within the message.
        position: usize,
    },
    /// A field the envelope depends on was empty.
    #[error("required field {segment}-{field} is missing")]
    MissingField {
        /// Segment identifier.
        segment: &'static str,
        /// One-based field number.
        field: usize,
    },
}

/// Failure reported by a transaction handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The handler could not produce a reply.
    #[error("handler '{handler}' failed: {message}")]
    Failed {
        /// Handler name.
        handler: String,
        /// Operator-facing description. Never sent to the peer.
        message: String,
    },
}

impl HandlerError {
    /// Builds a [`HandlerError::Failed`].
    pub fn failed(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            handler: handler.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while populating the handler registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The handler refused the message type it was registered for.
    #[error("handler '{handler}' cannot serve message type '{message_type}'")]
    IncompatibleHandler {
        /// Handler name.
        handler: String,
        /// Message type of the attempted registration.
        message_type: String,
    },
    /// The message type key was blank.
    #[error("message type must not be empty")]
    EmptyMessageType,
}
