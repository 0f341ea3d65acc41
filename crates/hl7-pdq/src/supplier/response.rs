//! Assembly of `RSP_K21` and `RSP_ZV2` replies.

use hl7_core::datetime::format_date;
use hl7_core::{AckBuilder, AckCode, Delimiters, HeaderLocale, Message, RequestContext, Segment};

use crate::error::PdqError;
use crate::query::{QUERY_SEGMENT, QUERY_TAG_FIELD, QueryKind};
use crate::store::PatientRecord;

/// Universal ID written to the assigning authority of PID-3.
pub const AUTHORITY_UNIVERSAL_ID: &str = "1";

/// Universal ID type written to the assigning authority of PID-3.
pub const AUTHORITY_UNIVERSAL_ID_TYPE: &str = "ISO";

const RECORDS_FOUND: &str = "OK";
const NO_RECORDS_FOUND: &str = "NF";

/// Builds the replies to one PDQ request.
pub(crate) struct ResponseBuilder<'a> {
    pub(crate) acks: &'a AckBuilder,
    pub(crate) locale: &'a HeaderLocale,
    pub(crate) request: &'a Message,
    pub(crate) kind: QueryKind,
}

impl ResponseBuilder<'_> {
    /// `AA` reply listing `records` in order.
    pub(crate) fn found(&self, records: &[PatientRecord]) -> Message {
        let status = if records.is_empty() {
            NO_RECORDS_FOUND
        } else {
            RECORDS_FOUND
        };
        let mut message = self.start(AckCode::ApplicationAccept, None);
        message.push(self.query_acknowledgment(status, records.len()));
        self.echo_query(&mut message);
        let delimiters = *self.request.delimiters();
        for (index, record) in records.iter().enumerate() {
            let sequence = (index + 1).to_string();
            message.push(self.patient_segment(&sequence, record, delimiters));
            if self.kind == QueryKind::Pdqv {
                message.push(visit_segment(&sequence, record, delimiters));
            }
        }
        message
    }

    /// `AR` or `AE` reply carrying one `ERR` segment and no records.
    pub(crate) fn rejected(&self, error: &PdqError) -> Message {
        let code = error.ack_code();
        let mut message = self.start(code, Some(error));
        message.push(self.query_acknowledgment(code.as_str(), 0));
        self.echo_query(&mut message);
        message
    }

    fn start(&self, code: AckCode, error: Option<&PdqError>) -> Message {
        let delimiters = *self.request.delimiters();
        let context = RequestContext::from_message(self.request);
        let header = self
            .acks
            .header(&context, self.kind.response_type(), Some(self.locale));
        let mut message = Message::new(header.to_segment(delimiters));
        message.push(AckBuilder::acknowledgment(&context, code, delimiters));
        if let Some(failure) = error {
            message.push(failure.detail().to_segment(delimiters));
        }
        message
    }

    fn query_tag(&self) -> &str {
        self.request
            .segment(QUERY_SEGMENT)
            .map_or("", |qpd| qpd.field(QUERY_TAG_FIELD))
    }

    fn query_acknowledgment(&self, status: &str, count: usize) -> Segment {
        let total = count.to_string();
        Segment::new("QAK", *self.request.delimiters())
            .with_field(1, self.query_tag())
            .with_field(2, status)
            .with_field(4, total.as_str())
            .with_field(5, total.as_str())
            .with_field(6, "0")
    }

    fn echo_query(&self, message: &mut Message) {
        if let Some(qpd) = self.request.segment(QUERY_SEGMENT) {
            message.push(qpd.clone());
        }
    }

    fn patient_segment(&self, sequence: &str, record: &PatientRecord, delimiters: Delimiters) -> Segment {
        let authority = delimiters.join_subcomponents([
            delimiters.escape(&self.acks.sender().application),
            AUTHORITY_UNIVERSAL_ID.to_owned(),
            AUTHORITY_UNIVERSAL_ID_TYPE.to_owned(),
        ]);
        let identifier = delimiters.join_components([
            delimiters.escape(&record.identifier),
            String::new(),
            String::new(),
            authority,
        ]);
        let name = delimiters.join_components([
            delimiters.escape(&record.family_name),
            delimiters.escape(&record.given_name),
        ]);
        let address = delimiters.join_components([
            delimiters.escape(&record.street),
            String::new(),
            delimiters.escape(&record.city),
            delimiters.escape(&record.state),
            delimiters.escape(&record.postal_code),
        ]);
        let birth_date = record.birth_date.map(format_date).unwrap_or_default();
        Segment::new("PID", delimiters)
            .with_field(1, sequence)
            .with_field(3, identifier)
            .with_field(5, name)
            .with_field(7, birth_date)
            .with_value(8, &record.sex)
            .with_field(11, address)
            .with_value(16, &record.marital_status)
            .with_value(18, &record.account_number)
    }
}

fn visit_segment(sequence: &str, record: &PatientRecord, delimiters: Delimiters) -> Segment {
    Segment::new("PV1", delimiters)
        .with_field(1, sequence)
        .with_value(3, record.ward.as_deref().unwrap_or_default())
}
