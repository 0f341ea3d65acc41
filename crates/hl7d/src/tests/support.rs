//! Collaborators and helpers shared by the daemon test suites.

use std::ffi::OsString;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::Utf8PathBuf;
use hl7_config::{Config, ListenEndpoint, LogFormat};
use hl7_core::{FrameReader, HandlerRegistration, encode_frame, mllp::DEFAULT_MAX_FRAME_BYTES};
use hl7_pdq::{DemographicsStore, InMemoryDemographicsStore, PatientRecord, StoreError};
use ortho_config::{OrthoConfig, OrthoError};
use tempfile::TempDir;

use crate::bootstrap::{BootstrapError, ConfigLoader, StoreProvider};
use crate::health::HealthReporter;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    HandlerRegistered(String),
    ListenerStarted(SocketAddr),
    ListenerDisabled,
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HealthEvent::HandlerRegistered(message_type) => Some(message_type),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn handler_registered(&self, registration: &HandlerRegistration) {
        self.record(HealthEvent::HandlerRegistered(
            registration.message_type.to_string(),
        ));
    }

    fn listener_started(&self, address: SocketAddr) {
        self.record(HealthEvent::ListenerStarted(address));
    }

    fn listener_disabled(&self) {
        self.record(HealthEvent::ListenerDisabled);
    }
}

/// Loader serving a loopback configuration whose message log lives in a
/// temporary directory.
pub struct TestConfigLoader {
    _dir: TempDir,
    config: Config,
}

impl TestConfigLoader {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temporary directory");
        let log_path = Utf8PathBuf::from_path_buf(dir.path().join("messages.jsonl"))
            .expect("temporary path is UTF-8");
        let config = Config {
            listen: ListenEndpoint::tcp("127.0.0.1", 0),
            message_log_path: Some(log_path),
            read_timeout_secs: 5,
            log_format: LogFormat::Compact,
            ..Config::default()
        };
        Self { _dir: dir, config }
    }

    pub fn with(mut self, adjust: impl FnOnce(&mut Config)) -> Self {
        adjust(&mut self.config);
        self
    }

    pub fn message_log_path(&self) -> Utf8PathBuf {
        self.config.message_log_path()
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Loader that fails by passing an unsupported listener scheme.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("hl7d"),
            OsString::from("--listen"),
            OsString::from("unix:///tmp/hl7d.sock"),
        ];
        Config::load_from_iter(args)
    }
}

pub fn rossi() -> PatientRecord {
    PatientRecord {
        identifier: "12345".to_owned(),
        family_name: "Rossi".to_owned(),
        given_name: "Mario".to_owned(),
        sex: "M".to_owned(),
        city: "Roma".to_owned(),
        ..PatientRecord::default()
    }
}

/// Provider serving a fixed set of patients.
#[derive(Clone)]
pub struct SeededStoreProvider {
    records: Vec<PatientRecord>,
}

impl SeededStoreProvider {
    pub fn new(records: Vec<PatientRecord>) -> Self {
        Self { records }
    }
}

impl Default for SeededStoreProvider {
    fn default() -> Self {
        Self::new(vec![rossi()])
    }
}

impl StoreProvider for SeededStoreProvider {
    fn open(&self, _config: &Config) -> Result<Arc<dyn DemographicsStore>, StoreError> {
        Ok(Arc::new(InMemoryDemographicsStore::new(self.records.clone())))
    }
}

/// Provider whose store never opens.
pub struct UnavailableStoreProvider;

impl StoreProvider for UnavailableStoreProvider {
    fn open(&self, _config: &Config) -> Result<Arc<dyn DemographicsStore>, StoreError> {
        Err(StoreError::Unavailable {
            message: "demographics database offline".to_owned(),
        })
    }
}

/// Blocking MLLP client for wire-level tests.
pub struct MllpClient {
    writer: TcpStream,
    frames: FrameReader<TcpStream>,
}

impl MllpClient {
    pub fn connect(address: SocketAddr) -> Self {
        let stream = TcpStream::connect(address).expect("connect to listener");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("set client timeout");
        let writer = stream.try_clone().expect("clone client stream");
        Self {
            writer,
            frames: FrameReader::new(stream, DEFAULT_MAX_FRAME_BYTES),
        }
    }

    pub fn send(&mut self, text: &str) {
        self.send_raw(&encode_frame(text));
    }

    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).expect("write request");
        self.writer.flush().expect("flush request");
    }

    /// Half-closes the connection so the server sees end of stream.
    pub fn writer_shutdown(&mut self) {
        self.writer.shutdown(Shutdown::Write).expect("shut down writer");
    }

    pub fn receive(&mut self) -> String {
        self.frames
            .next_frame()
            .expect("read reply frame")
            .expect("listener replied before closing")
    }

    pub fn request(&mut self, text: &str) -> String {
        self.send(text);
        self.receive()
    }

    /// Whether the server closed the connection, waiting up to the client
    /// read timeout.
    pub fn closed_by_peer(&mut self) -> bool {
        let mut byte = [0_u8; 1];
        matches!(self.frames.get_mut().read(&mut byte), Ok(0))
    }
}

/// Request of `message_type` carrying `parameters` in QPD-3.
pub fn query(message_type: &str, control_id: &str, parameters: &str) -> String {
    format!(
        "MSH|^~\\&|LAB|NORTH|gnuhealth|gnuhealth|20240301101455||{message_type}|{control_id}|P|2.5\r\
         QPD|IHE PDQ Query|TAG-{control_id}|{parameters}"
    )
}

/// Segment `id` of an encoded reply.
pub fn segment<'a>(reply: &'a str, id: &str) -> Option<&'a str> {
    reply
        .split('\r')
        .find(|segment| segment.split('|').next() == Some(id))
}

/// Field `number` of an encoded segment other than `MSH`.
pub fn field<'a>(segment: &'a str, number: usize) -> &'a str {
    segment.split('|').nth(number).unwrap_or_default()
}
