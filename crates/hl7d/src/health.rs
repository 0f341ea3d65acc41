//! Structured health reporting for daemon lifecycle events.

use std::net::SocketAddr;
use std::sync::Arc;

use hl7_config::Config;
use hl7_core::HandlerRegistration;

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once per routing table entry after extensions registered.
    fn handler_registered(&self, registration: &HandlerRegistration);

    /// Invoked when the MLLP listener accepts connections.
    fn listener_started(&self, address: SocketAddr);

    /// Invoked when configuration keeps the listener switched off.
    fn listener_disabled(&self);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn handler_registered(&self, registration: &HandlerRegistration) {
        (**self).handler_registered(registration);
    }

    fn listener_started(&self, address: SocketAddr) {
        (**self).listener_started(address);
    }

    fn listener_disabled(&self) {
        (**self).listener_disabled();
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            listen = %config.listen(),
            application = %config.application_code,
            pdq_enabled = config.pdq_enabled,
            message_log_enabled = config.message_log_enabled,
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn handler_registered(&self, registration: &HandlerRegistration) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "handler_registered",
            message_type = %registration.message_type,
            module = %registration.handler_module,
            handler = %registration.handler_name,
            "transaction handler registered"
        );
    }

    fn listener_started(&self, address: SocketAddr) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "listener_started",
            address = %address,
            "MLLP listener accepting connections"
        );
    }

    fn listener_disabled(&self) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "listener_disabled",
            "MLLP listener disabled by configuration"
        );
    }
}
