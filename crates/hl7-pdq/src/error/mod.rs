//! Errors raised while answering PDQ queries.
//!
//! Every [`PdqError`] maps onto the acknowledgement code, HL7 error code and
//! error location written to the reply. Store failures are logged in full but
//! reach the peer only as a generic message.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use hl7_core::{AckCode, ErrorCode, ErrorDetail, ErrorLocation};
use thiserror::Error;

use crate::query::{PARAMETERS_FIELD, ParameterCode, QUERY_SEGMENT, QueryKind};

/// Text sent in place of store failure details.
pub const PROCESSING_FAILURE_TEXT: &str = "Generic error during PDQ query execution";

/// Reasons the demographics store could not answer a search.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store is not reachable.
    #[error("demographics store unavailable: {message}")]
    Unavailable {
        /// Operator-facing description.
        message: String,
    },
    /// A demographics file could not be read.
    #[error("failed to read demographics from {}: {source}", .path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// Demographics data was not valid JSON for the record shape.
    #[error("failed to decode demographics: {source}")]
    Decode {
        /// Underlying decode error.
        #[source]
        source: Arc<serde_json::Error>,
    },
    /// The search itself failed.
    #[error("demographics query failed: {message}")]
    Query {
        /// Operator-facing description.
        message: String,
    },
}

/// Reasons a PDQ request was rejected or could not be answered.
#[derive(Debug, Clone, Error)]
pub enum PdqError {
    /// MSH-9 names a type this supplier does not answer.
    #[error("message type '{message_type}' is not a PDQ query")]
    UnsupportedMessageType {
        /// MSH-9 as received.
        message_type: String,
    },
    /// QPD-3 is absent or empty.
    #[error("The incoming message has not any query parameter")]
    MissingQueryParameters,
    /// A QPD-3 code is outside the allow-list.
    #[error("The parameter code {code} is not allowed in the PDQ request message: allowed codes are {allowed}")]
    InvalidQueryParameterCode {
        /// Code as received.
        code: String,
        /// Comma-separated allow-list of the query kind.
        allowed: String,
    },
    /// A QPD-3 pair has a code but no value.
    #[error("Missing the reference value for one or more query parameter")]
    MissingQueryParameterValue {
        /// Code whose value is blank.
        code: ParameterCode,
    },
    /// The birth date value is not `YYYY[MM[DD]]`.
    #[error("The date value {value} is not a valid HL7 date (YYYY[MM[DD]])")]
    InvalidDateParameterValue {
        /// Value as received.
        value: String,
    },
    /// MSH-3 names an application outside the configured allow-list.
    #[error("Sending Application value not allowed")]
    InvalidSendingApplicationParameterValue {
        /// MSH-3 as received.
        application: String,
    },
    /// The store failed while answering a valid query.
    #[error("PDQ query execution failed: {source}")]
    Processing {
        /// Store failure.
        #[from]
        source: StoreError,
    },
}

impl PdqError {
    pub(crate) fn invalid_code(code: &str, kind: QueryKind) -> Self {
        let allowed = kind
            .allowed_codes()
            .iter()
            .map(|known| known.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Self::InvalidQueryParameterCode {
            code: code.to_owned(),
            allowed,
        }
    }

    /// HL7 error condition code written to ERR-3.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedMessageType { .. } => ErrorCode::UnsupportedMessageType,
            Self::MissingQueryParameters | Self::MissingQueryParameterValue { .. } => {
                ErrorCode::RequiredFieldMissing
            }
            Self::InvalidDateParameterValue { .. } => ErrorCode::DataTypeError,
            Self::InvalidQueryParameterCode { .. }
            | Self::InvalidSendingApplicationParameterValue { .. }
            | Self::Processing { .. } => ErrorCode::ApplicationInternalError,
        }
    }

    /// Segment and field written to ERR-2, if any.
    #[must_use]
    pub fn location(&self) -> Option<ErrorLocation> {
        let (segment, sequence) = match self {
            Self::UnsupportedMessageType { .. } => ("MSH", 9),
            Self::InvalidSendingApplicationParameterValue { .. } => ("MSH", 3),
            Self::MissingQueryParameters
            | Self::InvalidQueryParameterCode { .. }
            | Self::MissingQueryParameterValue { .. }
            | Self::InvalidDateParameterValue { .. } => (QUERY_SEGMENT, PARAMETERS_FIELD),
            Self::Processing { .. } => return None,
        };
        Some(ErrorLocation {
            segment: segment.to_owned(),
            sequence,
        })
    }

    /// `AE` for store failures, `AR` for everything the peer got wrong.
    #[must_use]
    pub const fn ack_code(&self) -> AckCode {
        match self {
            Self::Processing { .. } => AckCode::ApplicationError,
            _ => AckCode::ApplicationReject,
        }
    }

    /// Text sent to the peer in ERR-3.
    #[must_use]
    pub fn wire_message(&self) -> String {
        match self {
            Self::Processing { .. } => PROCESSING_FAILURE_TEXT.to_owned(),
            _ => self.to_string(),
        }
    }

    /// Complete `ERR` content for the reply.
    #[must_use]
    pub fn detail(&self) -> ErrorDetail {
        ErrorDetail {
            code: self.error_code(),
            location: self.location(),
            message: self.wire_message(),
        }
    }
}
