//! HL7v2 transaction daemon.
//!
//! The daemon accepts MLLP connections, parses each frame as an HL7v2
//! message, and routes it by MSH-9 to the transaction handler registered for
//! that type. Every frame gets exactly one reply: the handler's response, or
//! a generic `ACK` with an `ERR` segment when the frame is unreadable, the
//! type has no handler, or the handler fails. Handled transactions are
//! appended to a JSON Lines message log.
//!
//! Handlers come from protocol extensions. Bootstrap registers the PDQ
//! supplier from [`hl7_pdq`] when enabled, building its demographics store
//! through a [`StoreProvider`].
//!
//! Lifecycle events are emitted through a [`HealthReporter`] so operators can
//! follow bootstrap, registration, and listener startup in structured logs.

mod bootstrap;
pub mod dispatch;
mod health;
pub mod message_log;
mod process;
mod telemetry;
pub mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, FileStoreProvider, StaticConfigLoader, StoreProvider,
    SystemConfigLoader, bootstrap_with, pdq_config,
};
pub use dispatch::{Dispatch, Dispatcher, MllpConnectionHandler, Outcome};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use message_log::{JsonlMessageLog, MessageLog, MessageLogEntry, MessageLogError, NullMessageLog};
pub use process::{
    LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon, run_daemon_with,
};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{ListenerError, ListenerHandle, MllpListener};

#[cfg(test)]
mod tests;
