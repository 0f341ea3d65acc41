//! Behavioural tests for MLLP dispatch over a live listener.

use std::sync::Arc;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::bootstrap::{Daemon, bootstrap_with};
use crate::transport::ListenerHandle;

use super::support::{
    MllpClient, RecordingHealthReporter, SeededStoreProvider, TestConfigLoader, field, query,
    rossi, segment,
};

/// A running daemon, one client connection and the replies it received.
#[derive(Default)]
struct WireWorld {
    _loader: Option<TestConfigLoader>,
    _daemon: Option<Daemon>,
    listener: Option<ListenerHandle>,
    client: Option<MllpClient>,
    replies: Vec<String>,
}

impl WireWorld {
    fn client(&mut self) -> &mut MllpClient {
        if self.client.is_none() {
            let address = self
                .listener
                .as_ref()
                .expect("daemon running")
                .local_addr();
            self.client = Some(MllpClient::connect(address));
        }
        self.client.as_mut().expect("client connected")
    }

    fn exchange(&mut self, request: &str) {
        let reply = self.client().request(request);
        self.replies.push(reply);
    }

    fn reply(&self, index: usize) -> &str {
        index
            .checked_sub(1)
            .and_then(|position| self.replies.get(position))
            .expect("reply received")
    }
}

impl Drop for WireWorld {
    fn drop(&mut self) {
        self.client = None;
        if let Some(handle) = self.listener.take() {
            handle.shutdown();
            let _ = handle.join();
        }
    }
}

#[fixture]
fn wire() -> WireWorld {
    WireWorld::default()
}

#[given("a running daemon holding patient \"{identifier}\"")]
fn given_running_daemon(wire: &mut WireWorld, identifier: String) {
    let loader = TestConfigLoader::new();
    let patient = hl7_pdq::PatientRecord {
        identifier,
        ..rossi()
    };
    let daemon = bootstrap_with(
        &loader,
        Arc::new(RecordingHealthReporter::default()),
        &SeededStoreProvider::new(vec![patient]),
    )
    .expect("bootstrap should succeed");
    let listener = daemon
        .start_listener()
        .expect("listener should start")
        .expect("listener is enabled");
    wire._loader = Some(loader);
    wire._daemon = Some(daemon);
    wire.listener = Some(listener);
}

#[when("a client sends a PDQ query \"{control_id}\" for identifier \"{identifier}\"")]
fn when_client_queries(wire: &mut WireWorld, control_id: String, identifier: String) {
    let request = query(
        "QBP^Q22^QBP_Q21",
        &control_id,
        &format!("@PID.3.1^{identifier}"),
    );
    wire.exchange(&request);
}

#[when("the same client sends a PDQ query \"{control_id}\" for identifier \"{identifier}\"")]
fn when_same_client_queries(wire: &mut WireWorld, control_id: String, identifier: String) {
    when_client_queries(wire, control_id, identifier);
}

#[when("a client sends a \"{message_type}\" message \"{control_id}\"")]
fn when_client_sends_type(wire: &mut WireWorld, message_type: String, control_id: String) {
    let request = format!(
        "MSH|^~\\&|LAB|NORTH|gnuhealth|gnuhealth|20240301101455||{message_type}|{control_id}|P|2.5"
    );
    wire.exchange(&request);
}

#[then("reply {index} acknowledges \"{control_id}\" with \"{code}\"")]
fn then_reply_acknowledges(wire: &mut WireWorld, index: usize, control_id: String, code: String) {
    let msa = segment(wire.reply(index), "MSA").expect("MSA present");
    assert_eq!(field(msa, 1), code);
    assert_eq!(field(msa, 2), control_id);
}

#[then("reply {index} lists patient \"{identifier}\"")]
fn then_reply_lists_patient(wire: &mut WireWorld, index: usize, identifier: String) {
    let pid = segment(wire.reply(index), "PID").expect("PID present");
    let id = field(pid, 3).split('^').next().unwrap_or_default();
    assert_eq!(id, identifier);
}

#[then("reply {index} lists no patients")]
fn then_reply_lists_nobody(wire: &mut WireWorld, index: usize) {
    assert!(segment(wire.reply(index), "PID").is_none());
}

#[then("reply {index} carries error \"{code}\" at \"{location}\"")]
fn then_reply_error(wire: &mut WireWorld, index: usize, code: String, location: String) {
    let err = segment(wire.reply(index), "ERR").expect("ERR present");
    assert_eq!(field(err, 2), location);
    assert_eq!(field(err, 3).split('^').next(), Some(code.as_str()));
}

#[scenario(
    path = "tests/features/mllp_dispatch.feature",
    name = "A PDQ identifier query is answered with the patient"
)]
fn identifier_query(wire: WireWorld) {
    let _ = wire;
}

#[scenario(
    path = "tests/features/mllp_dispatch.feature",
    name = "An unknown message type is rejected"
)]
fn unknown_type(wire: WireWorld) {
    let _ = wire;
}

#[scenario(
    path = "tests/features/mllp_dispatch.feature",
    name = "Consecutive requests are answered in order"
)]
fn ordered_replies(wire: WireWorld) {
    let _ = wire;
}
