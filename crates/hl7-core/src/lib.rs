//! HL7v2 building blocks shared by the daemon and its protocol extensions.
//!
//! The crate covers the minimum a transaction server needs: a segment-level
//! message model, MLLP framing, acknowledgement construction, and the
//! [`TransactionHandler`] trait with the [`HandlerRegistry`] that routes
//! message types to handlers. It is not a general HL7v2 grammar; segments
//! beyond the envelope are kept as raw field text and split on demand.

pub mod ack;
pub mod datetime;
pub mod error;
pub mod message;
pub mod mllp;
pub mod registry;

#[cfg(test)]
mod tests;

pub use self::ack::{
    AckBuilder, AckCode, ErrorCode, ErrorDetail, ErrorLocation, FixedStamper, HeaderLocale,
    MessageHeader, RequestContext, Sender, Stamp, Stamper, SystemStamper,
};
pub use self::datetime::{PartialDate, is_hl7_date};
pub use self::error::{FrameError, HandlerError, ParseError, RegistryError};
pub use self::message::{Delimiters, Message, MessageType, Segment};
pub use self::mllp::{FrameReader, decode_frame, encode_frame, write_frame};
pub use self::registry::{HandlerRegistration, HandlerRegistry, TransactionHandler};
