//! Crate-level integration and BDD tests.

use std::io::Cursor;
use std::sync::Arc;

use crate::ack::{AckBuilder, AckCode, FixedStamper, RequestContext, Sender};
use crate::error::HandlerError;
use crate::message::{Message, MessageType};
use crate::mllp::{DEFAULT_MAX_FRAME_BYTES, FrameReader, encode_frame};
use crate::registry::{HandlerRegistry, TransactionHandler};


struct AcceptingHandler {
    acks: AckBuilder,
}

impl TransactionHandler for AcceptingHandler {
    fn name(&self) -> &str {
        "accepting"
    }

    fn module(&self) -> &str {
        "tests"
    }

    fn accepts(&self, message_type: &MessageType) -> bool {
        message_type.code() == "ADT"
    }

    fn reply(&self, message: &Message) -> Result<String, HandlerError> {
        let context = RequestContext::from_message(message);
        let delimiters = *message.delimiters();
        let mut reply = Message::new(self.acks.header(&context, "ACK^A01^ACK", None).to_segment(delimiters));
        reply.push(AckBuilder::acknowledgment(&context, AckCode::ApplicationAccept, delimiters));
        Ok(reply.encode())
    }
}

#[test]
fn framed_request_is_routed_and_acknowledged() {
    let acks = AckBuilder::new(
        Sender::new("gnuhealth", "gnuhealth"),
        Arc::new(FixedStamper::new("20240301000000", "OUT-1")),
    );
    let mut registry = HandlerRegistry::new();
    registry
        .register("ADT^A01", Arc::new(AcceptingHandler { acks }))
        .expect("register");

    let request = "MSH|^~\\&|ADM|WARD|gnuhealth|gnuhealth|20240301||ADT^A01|IN-7|P|2.5\rEVN|A01\r";
    let mut frames = FrameReader::new(Cursor::new(encode_frame(request)), DEFAULT_MAX_FRAME_BYTES);
    let text = frames.next_frame().expect("read").expect("one frame");
    let message = Message::parse(&text).expect("parse");
    let handler = registry
        .lookup(message.message_type().as_str())
        .expect("handler registered");
    let reply = Message::parse(&handler.reply(&message).expect("reply")).expect("reply parses");

    let msa = reply.segment("MSA").expect("MSA present");
    assert_eq!(msa.field(1), AckCode::ApplicationAccept.as_str());
    assert_eq!(msa.field(2), "IN-7");
    assert_eq!(reply.header().field(5), "ADM");
    assert_eq!(reply.control_id(), "OUT-1");
}
