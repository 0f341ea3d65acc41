//! Insert-only journal of handled HL7 transactions.
//!
//! Each reply the dispatcher writes is recorded together with its request,
//! the module that produced it, and the time it was handled. Appending is
//! best-effort: a failed append is logged and never affects the reply.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

/// One handled transaction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MessageLogEntry {
    /// Request frame body as received.
    pub request: String,
    /// Reply frame body as sent.
    pub response: String,
    /// Module that built the reply, `hl7d` for generic acknowledgements.
    pub handler_module: String,
    /// When the transaction was handled.
    #[serde(with = "time::serde::rfc3339")]
    pub creation_date: OffsetDateTime,
}

impl MessageLogEntry {
    /// Entry stamped with the current UTC time.
    pub fn now(
        request: impl Into<String>,
        response: impl Into<String>,
        handler_module: impl Into<String>,
    ) -> Self {
        Self {
            request: request.into(),
            response: response.into(),
            handler_module: handler_module.into(),
            creation_date: OffsetDateTime::now_utc(),
        }
    }
}

/// Errors raised while appending to a message log.
#[derive(Debug, Clone, Error)]
pub enum MessageLogError {
    /// The journal file could not be opened.
    #[error("failed to open message log '{path}': {source}")]
    Open {
        /// Journal path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// An entry could not be encoded.
    #[error("failed to encode message log entry: {source}")]
    Encode {
        /// Underlying encode error.
        #[source]
        source: Arc<serde_json::Error>,
    },
    /// An entry could not be written.
    #[error("failed to write message log entry: {source}")]
    Write {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// A previous writer panicked while holding the journal.
    #[error("message log lock poisoned")]
    Poisoned,
}

/// Sink for handled transactions.
#[cfg_attr(test, mockall::automock)]
pub trait MessageLog: Send + Sync {
    /// Appends one entry.
    fn append(&self, entry: &MessageLogEntry) -> Result<(), MessageLogError>;
}

/// Log that discards every entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMessageLog;

impl MessageLog for NullMessageLog {
    fn append(&self, _entry: &MessageLogEntry) -> Result<(), MessageLogError> {
        Ok(())
    }
}

/// Log writing one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonlMessageLog {
    path: Utf8PathBuf,
    file: Mutex<File>,
}

impl JsonlMessageLog {
    /// Opens `path` for appending, creating it and its parent directory.
    pub fn open(path: &Utf8Path) -> Result<Self, MessageLogError> {
        let open_error = |source: io::Error| MessageLogError::Open {
            path: path.to_path_buf(),
            source: Arc::new(source),
        };
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            fs::create_dir_all(parent).map_err(open_error)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(open_error)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Journal location.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl MessageLog for JsonlMessageLog {
    fn append(&self, entry: &MessageLogEntry) -> Result<(), MessageLogError> {
        let mut line = serde_json::to_vec(entry).map_err(|source| MessageLogError::Encode {
            source: Arc::new(source),
        })?;
        line.push(b'\n');
        let mut file = self.file.lock().map_err(|_| MessageLogError::Poisoned)?;
        file.write_all(&line)
            .and_then(|()| file.flush())
            .map_err(|source| MessageLogError::Write {
                source: Arc::new(source),
            })
    }
}
