//! Minimal Lower Layer Protocol framing.
//!
//! A frame is `0x0B`, the message text, then `0x1C 0x0D`. [`FrameReader`]
//! pulls frames from a byte stream one at a time and resynchronises on the
//! next start block after a recoverable framing error.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::FrameError;

/// Vertical tab opening every frame.
pub const START_BLOCK: u8 = 0x0B;
/// File separator closing every frame.
pub const END_BLOCK: u8 = 0x1C;
/// Carriage return that must follow [`END_BLOCK`].
pub const TRAILER: u8 = 0x0D;

/// Frame body limit used when the caller has no configured value.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

const READ_CHUNK: usize = 8 * 1024;
const MLLP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::mllp");

/// Wraps `text` in an MLLP frame.
#[must_use]
pub fn encode_frame(text: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(text.len() + 3);
    frame.push(START_BLOCK);
    frame.extend_from_slice(text.as_bytes());
    frame.push(END_BLOCK);
    frame.push(TRAILER);
    frame
}

/// Writes `text` to `writer` as one MLLP frame and flushes it.
///
/// # Errors
///
/// Returns the underlying I/O error when the write or flush fails.
pub fn write_frame<W: Write>(writer: &mut W, text: &str) -> io::Result<()> {
    writer.write_all(&encode_frame(text))?;
    writer.flush()
}

/// Extracts the text of a single complete frame.
///
/// # Errors
///
/// Returns [`FrameError::NotFramed`] when the bytes do not start with a start
/// block, [`FrameError::Truncated`] or [`FrameError::MissingTrailer`] when
/// they do not end with `0x1C 0x0D`, [`FrameError::UnexpectedStartBlock`] if
/// a second start block appears, and [`FrameError::NotUtf8`] for non-UTF-8
/// bodies.
pub fn decode_frame(bytes: &[u8]) -> Result<&str, FrameError> {
    let Some((&START_BLOCK, rest)) = bytes.split_first() else {
        return Err(FrameError::NotFramed);
    };
    let body = match rest {
        [body @ .., END_BLOCK, TRAILER] => body,
        [.., END_BLOCK, _] => return Err(FrameError::MissingTrailer),
        _ => {
            return Err(FrameError::Truncated {
                received: rest.len(),
            });
        }
    };
    if let Some(position) = body.iter().position(|byte| *byte == START_BLOCK) {
        return Err(FrameError::UnexpectedStartBlock {
            discarded: position,
        });
    }
    std::str::from_utf8(body).map_err(|error| FrameError::NotUtf8 {
        valid_up_to: error.valid_up_to(),
    })
}

/// Reads consecutive MLLP frames from a byte stream.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buffer: Vec<u8>,
    position: usize,
    filled: usize,
    max_frame_bytes: usize,
    frame_timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl<R: Read> FrameReader<R> {
    /// Wraps `inner`, rejecting frame bodies larger than `max_frame_bytes`.
    pub fn new(inner: R, max_frame_bytes: usize) -> Self {
        Self {
            inner,
            buffer: vec![0; READ_CHUNK],
            position: 0,
            filled: 0,
            max_frame_bytes,
            frame_timeout: None,
            deadline: None,
        }
    }

    /// Limits how long one frame may take to arrive, counted from its start
    /// block. `None` leaves frames unbounded.
    ///
    /// The deadline is checked around each read of the wrapped stream, so a
    /// peer trickling bytes cannot hold a frame open past it. A blocking
    /// stream still needs its own read timeout to bound a single stalled
    /// read.
    #[must_use]
    pub const fn with_frame_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.frame_timeout = timeout;
        self
    }

    /// Mutable access to the wrapped stream, for writing replies.
    pub const fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consumes the reader and returns the wrapped stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Reads the next frame body.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between frames.
    /// Whitespace between frames is ignored; other stray bytes are skipped
    /// with a warning.
    ///
    /// # Errors
    ///
    /// Returns a [`FrameError`]. After a recoverable error
    /// ([`FrameError::is_recoverable`]) the next call resumes at the next
    /// start block. [`FrameError::TimedOut`] is returned when the frame
    /// timeout elapses before the frame is complete.
    pub fn next_frame(&mut self) -> Result<Option<String>, FrameError> {
        self.deadline = None;
        if !self.seek_start_block()? {
            return Ok(None);
        }
        self.deadline = self
            .frame_timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));
        let mut body = Vec::new();
        loop {
            let Some(byte) = self.next_byte()? else {
                return Err(FrameError::Truncated {
                    received: body.len(),
                });
            };
            match byte {
                END_BLOCK => return self.finish_frame(body),
                START_BLOCK => {
                    self.unread();
                    return Err(FrameError::UnexpectedStartBlock {
                        discarded: body.len(),
                    });
                }
                _ if body.len() >= self.max_frame_bytes => {
                    self.skip_past_end_block()?;
                    return Err(FrameError::Oversized {
                        limit: self.max_frame_bytes,
                    });
                }
                _ => body.push(byte),
            }
        }
    }

    fn finish_frame(&mut self, body: Vec<u8>) -> Result<Option<String>, FrameError> {
        match self.next_byte()? {
            Some(TRAILER) => String::from_utf8(body).map(Some).map_err(|error| {
                FrameError::NotUtf8 {
                    valid_up_to: error.utf8_error().valid_up_to(),
                }
            }),
            Some(START_BLOCK) => {
                self.unread();
                Err(FrameError::MissingTrailer)
            }
            Some(_) => Err(FrameError::MissingTrailer),
            None => Err(FrameError::Truncated {
                received: body.len(),
            }),
        }
    }

    fn seek_start_block(&mut self) -> Result<bool, FrameError> {
        let mut skipped = 0usize;
        let found = loop {
            match self.next_byte()? {
                Some(START_BLOCK) => break true,
                Some(byte) if byte.is_ascii_whitespace() => {}
                Some(_) => skipped += 1,
                None => break false,
            }
        };
        if skipped > 0 {
            warn!(
                target: MLLP_TARGET,
                skipped,
                "discarded bytes outside an MLLP frame"
            );
        }
        if !found && skipped > 0 {
            return Err(FrameError::NotFramed);
        }
        Ok(found)
    }

    fn skip_past_end_block(&mut self) -> Result<(), FrameError> {
        while let Some(byte) = self.next_byte()? {
            match byte {
                END_BLOCK => return Ok(()),
                START_BLOCK => {
                    self.unread();
                    return Ok(());
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn next_byte(&mut self) -> Result<Option<u8>, FrameError> {
        if self.position >= self.filled {
            self.check_deadline()?;
            self.filled = read_with_retry(&mut self.inner, &mut self.buffer)?;
            self.position = 0;
            if self.filled == 0 {
                return Ok(None);
            }
            self.check_deadline()?;
        }
        let byte = self.buffer.get(self.position).copied();
        self.position += 1;
        Ok(byte)
    }

    fn check_deadline(&self) -> Result<(), FrameError> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(FrameError::TimedOut),
            _ => Ok(()),
        }
    }

    const fn unread(&mut self) {
        self.position = self.position.saturating_sub(1);
    }
}

fn read_with_retry<R: Read>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buffer) {
            Ok(count) => return Ok(count),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests;
