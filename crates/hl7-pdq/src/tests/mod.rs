//! Crate-level registration and BDD tests.

use std::sync::Arc;

use hl7_core::{FixedStamper, HandlerRegistry, Message};

use crate::{InMemoryDemographicsStore, PdqConfig, PatientRecord, QueryKind, register};


#[test]
fn register_routes_both_query_types() {
    let mut registry = HandlerRegistry::new();
    let store = Arc::new(InMemoryDemographicsStore::new(vec![PatientRecord {
        identifier: "12345".into(),
        family_name: "Rossi".into(),
        ..PatientRecord::default()
    }]));
    register(
        &mut registry,
        PdqConfig::default(),
        store,
        Arc::new(FixedStamper::new("20240101000000", "OUT")),
    )
    .expect("registration succeeds");

    assert_eq!(registry.len(), 2);
    for kind in QueryKind::ALL {
        let handler = registry
            .lookup(kind.request_type())
            .expect("handler registered");
        assert_eq!(handler.name(), "pdq-supplier");
        assert_eq!(handler.module(), "hl7-pdq");
    }

    let request = Message::parse(
        "MSH|^~\\&|CLIENT|CLINIC|||T||QBP^Q22^QBP_Q21|IN-1|P|2.5\rQPD|Q|T1|@PID.3.1^12345\r",
    )
    .expect("request parses");
    let handler = registry
        .lookup(request.message_type().as_str())
        .expect("handler registered");
    let reply = Message::parse(&handler.reply(&request).expect("reply")).expect("reply parses");
    assert_eq!(reply.message_type().as_str(), "RSP^K22^RSP_K21");
    assert_eq!(reply.segment("PID").map(|pid| pid.component(3, 1)), Some("12345"));
}
