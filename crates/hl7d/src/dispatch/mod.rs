//! Routing of received frames to transaction handlers.
//!
//! Every frame ends in exactly one reply. A frame that does not parse gets an
//! `AR` acknowledgement, a message type without a handler gets `AR` with
//! error 200, and a failing or panicking handler gets `AR` with error 207.
//! Nothing here returns an error to the transport. The message log is
//! written after the reply is known and its failures are only logged.

mod connection;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use hl7_core::{
    AckBuilder, AckCode, ErrorCode, ErrorDetail, HandlerRegistry, Message, RequestContext,
};
use tracing::{debug, error, info, warn};

pub use self::connection::MllpConnectionHandler;
use crate::message_log::{MessageLog, MessageLogEntry};

pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Module recorded for replies built by the dispatcher itself.
pub const DISPATCHER_MODULE: &str = env!("CARGO_PKG_NAME");

/// How a frame was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A handler produced the reply.
    Replied {
        /// Module of the handler.
        module: String,
    },
    /// The frame was not a usable HL7 message.
    Invalid,
    /// No handler is registered for the message type.
    Unmatched {
        /// MSH-9 of the request.
        message_type: String,
    },
    /// The handler failed or panicked.
    HandlerFailed {
        /// Module of the handler.
        module: String,
    },
}

impl Outcome {
    fn module(&self) -> &str {
        match self {
            Self::Replied { module } | Self::HandlerFailed { module } => module,
            Self::Invalid | Self::Unmatched { .. } => DISPATCHER_MODULE,
        }
    }
}

/// Reply to one frame and how it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Encoded reply, ready for framing.
    pub reply: String,
    /// Path the frame took.
    pub outcome: Outcome,
}

/// Turns frame bodies into replies.
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    acks: AckBuilder,
    log: Arc<dyn MessageLog>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("acks", &self.acks)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher over a populated registry.
    pub fn new(registry: Arc<HandlerRegistry>, acks: AckBuilder, log: Arc<dyn MessageLog>) -> Self {
        Self {
            registry,
            acks,
            log,
        }
    }

    /// Answers one frame body and records the transaction.
    pub fn dispatch(&self, raw: &str) -> Dispatch {
        debug!(target: DISPATCH_TARGET, request = raw, "received frame");
        let dispatch = match Message::parse(raw) {
            Ok(message) => self.route(&message),
            Err(parse_error) => {
                info!(
                    target: DISPATCH_TARGET,
                    error = %parse_error,
                    "rejecting unparseable message"
                );
                self.invalid(&RequestContext::recovered(raw), &parse_error.to_string())
            }
        };
        self.record(raw, &dispatch);
        dispatch
    }

    /// Reply to bytes that never formed a readable frame.
    ///
    /// The transaction is not recorded because there is no request text.
    pub fn invalid_frame(&self, reason: &str) -> Dispatch {
        self.invalid(&RequestContext::unknown(), reason)
    }

    fn route(&self, message: &Message) -> Dispatch {
        let message_type = message.message_type();
        let context = RequestContext::from_message(message);
        let Some(handler) = self.registry.lookup(message_type.as_str()) else {
            info!(
                target: DISPATCH_TARGET,
                message_type = %message_type,
                control_id = message.control_id(),
                "no handler registered for message type"
            );
            let detail = ErrorDetail::new(
                ErrorCode::UnsupportedMessageType,
                format!("Unsupported message type {message_type}"),
            )
            .at("MSH", 9);
            return Dispatch {
                reply: self
                    .acks
                    .negative(&context, AckCode::ApplicationReject, &detail)
                    .encode(),
                outcome: Outcome::Unmatched {
                    message_type: message_type.to_string(),
                },
            };
        };

        let module = handler.module().to_owned();
        let result = panic::catch_unwind(AssertUnwindSafe(|| handler.reply(message)));
        match result {
            Ok(Ok(reply)) => Dispatch {
                reply,
                outcome: Outcome::Replied { module },
            },
            Ok(Err(failure)) => {
                error!(
                    target: DISPATCH_TARGET,
                    handler = handler.name(),
                    control_id = message.control_id(),
                    error = %failure,
                    "transaction handler failed"
                );
                self.handler_failed(&context, module)
            }
            Err(_) => {
                error!(
                    target: DISPATCH_TARGET,
                    handler = handler.name(),
                    control_id = message.control_id(),
                    "transaction handler panicked"
                );
                self.handler_failed(&context, module)
            }
        }
    }

    fn invalid(&self, context: &RequestContext, reason: &str) -> Dispatch {
        let detail = ErrorDetail::new(ErrorCode::SegmentSequenceError, reason);
        Dispatch {
            reply: self
                .acks
                .negative(context, AckCode::ApplicationReject, &detail)
                .encode(),
            outcome: Outcome::Invalid,
        }
    }

    fn handler_failed(&self, context: &RequestContext, module: String) -> Dispatch {
        let detail = ErrorDetail::new(
            ErrorCode::ApplicationInternalError,
            ErrorCode::ApplicationInternalError.description(),
        );
        Dispatch {
            reply: self
                .acks
                .negative(context, AckCode::ApplicationReject, &detail)
                .encode(),
            outcome: Outcome::HandlerFailed { module },
        }
    }

    fn record(&self, raw: &str, dispatch: &Dispatch) {
        let entry = MessageLogEntry::now(raw, dispatch.reply.as_str(), dispatch.outcome.module());
        if let Err(log_error) = self.log.append(&entry) {
            warn!(
                target: DISPATCH_TARGET,
                error = %log_error,
                "failed to record transaction"
            );
        }
    }
}
