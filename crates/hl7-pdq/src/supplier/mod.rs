//! The PDQ supplier transaction handler.
//!
//! [`PdqSupplier`] answers `QBP^Q22` (PDQ) and `QBP^ZV1` (PDQV) requests. A
//! request passes through the sending application filter and parameter
//! validation before the store is searched; any failure yields a reply of
//! the response type carrying an `ERR` segment rather than a handler error.

mod response;

use std::fmt;
use std::sync::Arc;

use hl7_core::{
    AckBuilder, AckCode, HandlerError, HeaderLocale, Message, MessageType, RequestContext, Sender,
    Stamper, TransactionHandler,
};
use tracing::{Level, debug, info};

use self::response::ResponseBuilder;
pub use self::response::{AUTHORITY_UNIVERSAL_ID, AUTHORITY_UNIVERSAL_ID_TYPE};
use crate::error::PdqError;
use crate::query::{PatientQuery, QueryKind, extract_parameters};
use crate::store::{DemographicsStore, PatientRecord};

const SUPPLIER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supplier");

/// Handler name used in registrations and logs.
pub const SUPPLIER_NAME: &str = "pdq-supplier";

/// Module name used in registrations.
pub const SUPPLIER_MODULE: &str = env!("CARGO_PKG_NAME");

/// Which sending applications may query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ApplicationFilter {
    /// Every application may query.
    #[default]
    AllowAll,
    /// Only the listed MSH-3 values may query.
    AllowOnly(Vec<String>),
}

impl ApplicationFilter {
    /// Builds the filter from the `enabled` switch and its allow-list. Blank
    /// entries are dropped.
    #[must_use]
    pub fn from_settings(enabled: bool, applications: &[String]) -> Self {
        if !enabled {
            return Self::AllowAll;
        }
        Self::AllowOnly(
            applications
                .iter()
                .map(|application| application.trim())
                .filter(|application| !application.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }

    /// Whether `application` may query. Comparison is exact after trimming.
    #[must_use]
    pub fn permits(&self, application: &str) -> bool {
        match self {
            Self::AllowAll => true,
            Self::AllowOnly(allowed) => allowed
                .iter()
                .any(|candidate| candidate == application.trim()),
        }
    }
}

/// Settings of a [`PdqSupplier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdqConfig {
    /// MSH-3 and MSH-4 of replies. The application also names the assigning
    /// authority of PID-3.
    pub sender: Sender,
    /// MSH-17 to MSH-19 of replies.
    pub locale: HeaderLocale,
    /// Sending application filter.
    pub application_filter: ApplicationFilter,
}

impl Default for PdqConfig {
    fn default() -> Self {
        Self {
            sender: Sender::new("gnuhealth", ""),
            locale: HeaderLocale {
                country: "ITA".to_owned(),
                character_set: "UNICODE UTF-8".to_owned(),
                language: "EN".to_owned(),
            },
            application_filter: ApplicationFilter::AllowAll,
        }
    }
}

/// Answers PDQ and PDQV queries from a [`DemographicsStore`].
pub struct PdqSupplier {
    locale: HeaderLocale,
    filter: ApplicationFilter,
    store: Arc<dyn DemographicsStore>,
    acks: AckBuilder,
}

impl fmt::Debug for PdqSupplier {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("PdqSupplier")
            .field("locale", &self.locale)
            .field("filter", &self.filter)
            .field("acks", &self.acks)
            .finish_non_exhaustive()
    }
}

impl PdqSupplier {
    /// Creates a supplier searching `store` and stamping replies with
    /// `stamper`.
    pub fn new(config: PdqConfig, store: Arc<dyn DemographicsStore>, stamper: Arc<dyn Stamper>) -> Self {
        let PdqConfig {
            sender,
            locale,
            application_filter,
        } = config;
        Self {
            locale,
            filter: application_filter,
            store,
            acks: AckBuilder::new(sender, stamper),
        }
    }

    /// Encoded reply to `message`.
    ///
    /// Never fails: rejected requests and store failures are reported in the
    /// reply itself.
    #[must_use]
    pub fn respond(&self, message: &Message) -> String {
        let message_type = message.message_type();
        let Some(kind) = QueryKind::from_message_type(&message_type) else {
            return self.unsupported(message, &message_type);
        };
        let builder = ResponseBuilder {
            acks: &self.acks,
            locale: &self.locale,
            request: message,
            kind,
        };
        let reply = match self.answer(message, kind) {
            Ok(records) => {
                info!(
                    target: SUPPLIER_TARGET,
                    kind = %kind,
                    control_id = message.control_id(),
                    records = records.len(),
                    "answered PDQ query"
                );
                builder.found(&records)
            }
            Err(error) => {
                report(message, kind, &error);
                builder.rejected(&error)
            }
        };
        reply.encode()
    }

    fn answer(&self, message: &Message, kind: QueryKind) -> Result<Vec<PatientRecord>, PdqError> {
        let application = message.sending_application();
        if !self.filter.permits(application) {
            return Err(PdqError::InvalidSendingApplicationParameterValue {
                application: application.to_owned(),
            });
        }
        let parameters = extract_parameters(message, kind)?;
        let query = PatientQuery::from_parameters(&parameters);
        debug!(
            target: SUPPLIER_TARGET,
            kind = %kind,
            criteria = query.criteria().len(),
            "searching demographics"
        );
        Ok(self.store.search(&query, kind)?)
    }

    fn unsupported(&self, message: &Message, message_type: &MessageType) -> String {
        let error = PdqError::UnsupportedMessageType {
            message_type: message_type.to_string(),
        };
        info!(
            target: SUPPLIER_TARGET,
            message_type = %message_type,
            control_id = message.control_id(),
            "rejected message that is not a PDQ query"
        );
        self.acks
            .negative(&RequestContext::from_message(message), error.ack_code(), &error.detail())
            .encode()
    }
}

/// Level a failed query is logged at.
const fn report_level(error: &PdqError) -> Level {
    match error.ack_code() {
        AckCode::ApplicationError => Level::ERROR,
        AckCode::ApplicationAccept | AckCode::ApplicationReject => Level::INFO,
    }
}

fn report(message: &Message, kind: QueryKind, error: &PdqError) {
    if report_level(error) == Level::ERROR {
        tracing::error!(
            target: SUPPLIER_TARGET,
            kind = %kind,
            control_id = message.control_id(),
            error = %error,
            "PDQ query failed"
        );
    } else {
        info!(
            target: SUPPLIER_TARGET,
            kind = %kind,
            control_id = message.control_id(),
            sending_application = message.sending_application(),
            error = %error,
            "rejected PDQ query"
        );
    }
}

impl TransactionHandler for PdqSupplier {
    fn name(&self) -> &str {
        SUPPLIER_NAME
    }

    fn module(&self) -> &str {
        SUPPLIER_MODULE
    }

    fn accepts(&self, message_type: &MessageType) -> bool {
        QueryKind::from_message_type(message_type).is_some()
    }

    fn reply(&self, message: &Message) -> Result<String, HandlerError> {
        Ok(self.respond(message))
    }
}
