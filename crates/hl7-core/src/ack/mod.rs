//! Acknowledgement and error reply construction.
//!
//! [`AckBuilder`] produces the `MSH`/`MSA`/`ERR` blocks shared by every
//! reply. Replies are deterministic apart from the timestamp and control ID
//! supplied by a [`Stamper`].

use std::fmt;
use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::datetime::format_timestamp;
use crate::message::{Delimiters, HEADER_SEGMENT, Message, Segment, recover_control_id};

/// HL7 version written to MSH-12.
pub const HL7_VERSION: &str = "2.5";

/// Processing ID written to MSH-11.
pub const PROCESSING_ID: &str = "P";

/// Message type of generic acknowledgements.
pub const ACK_MESSAGE_TYPE: &str = "ACK^ACK";

/// Coding system of HL7 table 0357 (message error condition codes).
pub const ERROR_CODE_TABLE: &str = "HL70357";

/// Severity written to ERR-4.
pub const ERROR_SEVERITY: &str = "E";

/// Acknowledgement code written to MSA-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckCode {
    /// `AA`: the request was processed.
    ApplicationAccept,
    /// `AE`: the request was valid but processing failed.
    ApplicationError,
    /// `AR`: the request was rejected.
    ApplicationReject,
}

impl AckCode {
    /// Wire form of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ApplicationAccept => "AA",
            Self::ApplicationError => "AE",
            Self::ApplicationReject => "AR",
        }
    }
}

impl fmt::Display for AckCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Error condition codes from HL7 table 0357.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// 100, segment sequence error.
    SegmentSequenceError,
    /// 101, required field missing.
    RequiredFieldMissing,
    /// 102, data type error.
    DataTypeError,
    /// 200, unsupported message type.
    UnsupportedMessageType,
    /// 207, application internal error.
    ApplicationInternalError,
}

impl ErrorCode {
    /// Numeric code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::SegmentSequenceError => 100,
            Self::RequiredFieldMissing => 101,
            Self::DataTypeError => 102,
            Self::UnsupportedMessageType => 200,
            Self::ApplicationInternalError => 207,
        }
    }

    /// Table description of the code.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::SegmentSequenceError => "Segment sequence error",
            Self::RequiredFieldMissing => "Required field missing",
            Self::DataTypeError => "Data type error",
            Self::UnsupportedMessageType => "Unsupported message type",
            Self::ApplicationInternalError => "Application internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.code())
    }
}

/// Segment and field an error refers to, written to ERR-2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLocation {
    /// Segment identifier, for example `QPD`.
    pub segment: String,
    /// One-based field number within the segment.
    pub sequence: usize,
}

/// Content of one `ERR` segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Condition code.
    pub code: ErrorCode,
    /// Offending segment and field, when known.
    pub location: Option<ErrorLocation>,
    /// Text sent to the peer.
    pub message: String,
}

impl ErrorDetail {
    /// Creates a detail without a location.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            location: None,
            message: message.into(),
        }
    }

    /// Attaches the segment and field the error refers to.
    #[must_use]
    pub fn at(mut self, segment: impl Into<String>, sequence: usize) -> Self {
        self.location = Some(ErrorLocation {
            segment: segment.into(),
            sequence,
        });
        self
    }

    /// Encodes the detail as
    /// `ERR||<segment>^<sequence>|<code>^<message>^HL70357|E`.
    #[must_use]
    pub fn to_segment(&self, delimiters: Delimiters) -> Segment {
        let location = self.location.as_ref().map_or_else(String::new, |location| {
            delimiters.join_components([
                delimiters.escape(&location.segment),
                location.sequence.to_string(),
            ])
        });
        let condition = delimiters.join_components([
            self.code.code().to_string(),
            delimiters.escape(&self.message),
            ERROR_CODE_TABLE.to_owned(),
        ]);
        Segment::new("ERR", delimiters)
            .with_field(2, location)
            .with_field(3, condition)
            .with_field(4, ERROR_SEVERITY)
    }
}

/// Timestamp and control ID of an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    /// MSH-7, `YYYYMMDDHHMMSS`.
    pub timestamp: String,
    /// MSH-10.
    pub control_id: String,
}

/// Source of [`Stamp`]s for outgoing messages.
pub trait Stamper: Send + Sync {
    /// Produces the stamp for the next outgoing message.
    fn stamp(&self) -> Stamp;
}

/// Stamps messages with the current UTC time and a random UUID.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemStamper;

impl Stamper for SystemStamper {
    fn stamp(&self) -> Stamp {
        Stamp {
            timestamp: format_timestamp(OffsetDateTime::now_utc()),
            control_id: Uuid::new_v4().simple().to_string(),
        }
    }
}

/// Stamps every message identically.
#[derive(Debug, Clone)]
pub struct FixedStamper {
    stamp: Stamp,
}

impl FixedStamper {
    /// Uses `timestamp` and `control_id` for every message.
    pub fn new(timestamp: impl Into<String>, control_id: impl Into<String>) -> Self {
        Self {
            stamp: Stamp {
                timestamp: timestamp.into(),
                control_id: control_id.into(),
            },
        }
    }
}

impl Stamper for FixedStamper {
    fn stamp(&self) -> Stamp {
        self.stamp.clone()
    }
}

/// Application and facility written to MSH-3 and MSH-4 of replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    /// Sending application.
    pub application: String,
    /// Sending facility.
    pub facility: String,
}

impl Sender {
    /// Creates a sender identity.
    pub fn new(application: impl Into<String>, facility: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            facility: facility.into(),
        }
    }
}

/// Locale fields (MSH-17 to MSH-19) carried by some replies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderLocale {
    /// Country code, MSH-17.
    pub country: String,
    /// Character set, MSH-18.
    pub character_set: String,
    /// Principal language, MSH-19.
    pub language: String,
}

/// What is known about the request being answered.
///
/// Values are kept as they appeared on the wire, escape sequences included,
/// so replies echo them unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    control_id: String,
    sending_application: String,
    sending_facility: String,
}

impl RequestContext {
    /// Context of a parsed request.
    #[must_use]
    pub fn from_message(message: &Message) -> Self {
        Self {
            control_id: message.control_id().to_owned(),
            sending_application: message.sending_application().to_owned(),
            sending_facility: message.sending_facility().to_owned(),
        }
    }

    /// Context of text that failed to parse; only MSH-10 is recovered.
    #[must_use]
    pub fn recovered(text: &str) -> Self {
        Self {
            control_id: recover_control_id(text).unwrap_or_default(),
            ..Self::default()
        }
    }

    /// Context of bytes that never formed a message.
    #[must_use]
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Control ID to echo in MSA-2, empty when unknown.
    #[must_use]
    pub fn control_id(&self) -> &str {
        &self.control_id
    }
}

/// Fields of an outgoing `MSH` segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    /// MSH-3.
    pub sending_application: String,
    /// MSH-4.
    pub sending_facility: String,
    /// MSH-5, the request's MSH-3 as received.
    pub receiving_application: String,
    /// MSH-6, the request's MSH-4 as received.
    pub receiving_facility: String,
    /// MSH-9 in `^`-joined form.
    pub message_type: String,
    /// MSH-7 and MSH-10.
    pub stamp: Stamp,
    /// MSH-17 to MSH-19, when the reply carries them.
    pub locale: Option<HeaderLocale>,
}

impl MessageHeader {
    /// Encodes the header as an `MSH` segment.
    #[must_use]
    pub fn to_segment(&self, delimiters: Delimiters) -> Segment {
        let message_type = self
            .message_type
            .split('^')
            .map(|component| delimiters.escape(component))
            .collect::<Vec<_>>();
        let mut header = Segment::new(HEADER_SEGMENT, delimiters)
            .with_value(3, &self.sending_application)
            .with_value(4, &self.sending_facility)
            .with_field(5, self.receiving_application.as_str())
            .with_field(6, self.receiving_facility.as_str())
            .with_value(7, &self.stamp.timestamp)
            .with_field(9, delimiters.join_components(message_type))
            .with_value(10, &self.stamp.control_id)
            .with_field(11, PROCESSING_ID)
            .with_field(12, HL7_VERSION);
        if let Some(locale) = &self.locale {
            header.set_value(17, &locale.country);
            header.set_value(18, &locale.character_set);
            header.set_value(19, &locale.language);
        }
        header
    }
}

/// Builds reply headers and acknowledgements for one sender identity.
#[derive(Clone)]
pub struct AckBuilder {
    sender: Sender,
    stamper: Arc<dyn Stamper>,
}

impl fmt::Debug for AckBuilder {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AckBuilder")
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}

impl AckBuilder {
    /// Creates a builder stamping messages with `stamper`.
    pub fn new(sender: Sender, stamper: Arc<dyn Stamper>) -> Self {
        Self { sender, stamper }
    }

    /// Identity written to MSH-3 and MSH-4.
    #[must_use]
    pub const fn sender(&self) -> &Sender {
        &self.sender
    }

    /// Header for a reply of `message_type` to `request`.
    #[must_use]
    pub fn header(
        &self,
        request: &RequestContext,
        message_type: &str,
        locale: Option<&HeaderLocale>,
    ) -> MessageHeader {
        MessageHeader {
            sending_application: self.sender.application.clone(),
            sending_facility: self.sender.facility.clone(),
            receiving_application: request.sending_application.clone(),
            receiving_facility: request.sending_facility.clone(),
            message_type: message_type.to_owned(),
            stamp: self.stamper.stamp(),
            locale: locale.cloned(),
        }
    }

    /// `MSA|<code>|<request control id>`.
    #[must_use]
    pub fn acknowledgment(request: &RequestContext, code: AckCode, delimiters: Delimiters) -> Segment {
        Segment::new("MSA", delimiters)
            .with_field(1, code.as_str())
            .with_field(2, request.control_id())
    }

    /// Generic negative acknowledgement carrying one `ERR` segment.
    #[must_use]
    pub fn negative(&self, request: &RequestContext, code: AckCode, detail: &ErrorDetail) -> Message {
        let delimiters = Delimiters::STANDARD;
        let mut message = Message::new(self.header(request, ACK_MESSAGE_TYPE, None).to_segment(delimiters));
        message.push(Self::acknowledgment(request, code, delimiters));
        message.push(detail.to_segment(delimiters));
        message
    }
}
