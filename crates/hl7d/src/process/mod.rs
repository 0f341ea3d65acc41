//! Process lifecycle: bootstrap, serve, then stop on a termination signal.
//!
//! The daemon runs in the foreground. Supervisors such as systemd own
//! backgrounding and PID tracking.

mod errors;
mod launch;
mod shutdown;

pub use errors::LaunchError;
pub use launch::{run_daemon, run_daemon_with};
pub use shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
