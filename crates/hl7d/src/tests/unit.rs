//! Unit tests for daemon bootstrap and process wiring.

use std::sync::Arc;

use rstest::rstest;

use crate::bootstrap::{BootstrapError, bootstrap_with};
use crate::process::{ShutdownError, ShutdownSignal, run_daemon_with};
use crate::{FileStoreProvider, LaunchError, pdq_config};

use super::support::{
    FailingConfigLoader, HealthEvent, RecordingHealthReporter, SeededStoreProvider,
    TestConfigLoader, UnavailableStoreProvider,
};

/// Shutdown signal that fires immediately.
struct ImmediateShutdown;

impl ShutdownSignal for ImmediateShutdown {
    fn wait(&self) -> Result<(), ShutdownError> {
        Ok(())
    }
}

#[rstest]
fn bootstrap_registers_both_pdq_message_types() {
    let loader = TestConfigLoader::new();
    let reporter = Arc::new(RecordingHealthReporter::default());

    let daemon = bootstrap_with(&loader, reporter.clone(), &SeededStoreProvider::default())
        .expect("bootstrap should succeed");

    assert!(daemon.registry().contains("QBP^Q22^QBP_Q21"));
    assert!(daemon.registry().contains("QBP^ZV1^QBP_Q21"));
    assert_eq!(daemon.registry().len(), 2);
    let mut registered = reporter.registered_types();
    registered.sort();
    assert_eq!(registered, vec!["QBP^Q22^QBP_Q21", "QBP^ZV1^QBP_Q21"]);
    let events = reporter.events();
    assert_eq!(events.first(), Some(&HealthEvent::BootstrapStarting));
    assert_eq!(events.last(), Some(&HealthEvent::BootstrapSucceeded));
}

#[rstest]
fn disabling_pdq_leaves_the_registry_empty() {
    let loader = TestConfigLoader::new().with(|config| config.pdq_enabled = false);
    let reporter = Arc::new(RecordingHealthReporter::default());

    let daemon = bootstrap_with(&loader, reporter.clone(), &UnavailableStoreProvider)
        .expect("the store is not opened when PDQ is disabled");

    assert!(daemon.registry().is_empty());
    assert!(reporter.registered_types().is_empty());
}

#[rstest]
fn configuration_failures_are_reported() {
    let reporter = Arc::new(RecordingHealthReporter::default());

    let error = bootstrap_with(
        &FailingConfigLoader,
        reporter.clone(),
        &SeededStoreProvider::default(),
    )
    .expect_err("invalid listener scheme");

    assert!(matches!(error, BootstrapError::Configuration { .. }), "{error}");
    assert!(matches!(
        reporter.events().last(),
        Some(HealthEvent::BootstrapFailed(_))
    ));
}

#[rstest]
fn invalid_settings_are_rejected() {
    let loader = TestConfigLoader::new().with(|config| config.application_code = " ".to_owned());
    let reporter = Arc::new(RecordingHealthReporter::default());

    let error = bootstrap_with(&loader, reporter, &SeededStoreProvider::default())
        .expect_err("blank application code");

    assert!(
        matches!(error, BootstrapError::InvalidConfiguration { .. }),
        "{error}"
    );
}

#[rstest]
fn store_failures_abort_bootstrap() {
    let loader = TestConfigLoader::new();
    let reporter = Arc::new(RecordingHealthReporter::default());

    let error = bootstrap_with(&loader, reporter.clone(), &UnavailableStoreProvider)
        .expect_err("store unavailable");

    assert!(matches!(error, BootstrapError::Demographics { .. }), "{error}");
    assert!(reporter.registered_types().is_empty());
}

#[rstest]
fn missing_demographics_file_is_a_bootstrap_error() {
    let loader = TestConfigLoader::new().with(|config| {
        config.demographics_path = Some("/nonexistent/hl7d/patients.json".into());
    });
    let reporter = Arc::new(RecordingHealthReporter::default());

    let error = bootstrap_with(&loader, reporter, &FileStoreProvider)
        .expect_err("demographics file is missing");

    assert!(matches!(error, BootstrapError::Demographics { .. }), "{error}");
}

#[rstest]
fn file_store_provider_starts_empty_without_a_path() {
    let loader = TestConfigLoader::new();
    let reporter = Arc::new(RecordingHealthReporter::default());

    let daemon = bootstrap_with(&loader, reporter, &FileStoreProvider)
        .expect("bootstrap should succeed");

    let dispatch = daemon.dispatcher().dispatch(&super::support::query(
        "QBP^Q22^QBP_Q21",
        "EMPTY-1",
        "@PID.5.1.1^Rossi",
    ));
    assert!(dispatch.reply.contains("\rQAK|TAG-EMPTY-1|NF||0|0|0"), "{}", dispatch.reply);
}

#[rstest]
fn message_log_is_created_when_enabled() {
    let loader = TestConfigLoader::new();
    let path = loader.message_log_path();

    bootstrap_with(
        &loader,
        Arc::new(RecordingHealthReporter::default()),
        &SeededStoreProvider::default(),
    )
    .expect("bootstrap should succeed");

    assert!(path.exists(), "message log should be created at {path}");
}

#[rstest]
fn message_log_is_skipped_when_disabled() {
    let loader = TestConfigLoader::new().with(|config| config.message_log_enabled = false);
    let path = loader.message_log_path();

    bootstrap_with(
        &loader,
        Arc::new(RecordingHealthReporter::default()),
        &SeededStoreProvider::default(),
    )
    .expect("bootstrap should succeed");

    assert!(!path.exists(), "message log should not be created");
}

#[rstest]
fn pdq_settings_follow_the_configuration() {
    let loader = TestConfigLoader::new().with(|config| {
        config.application_code = "HIS".to_owned();
        config.facility_name = "WEST".to_owned();
        config.pdq_country = "FRA".to_owned();
        config.pdq_filter_by_allowed_app = true;
        config.pdq_allowed_applications = vec!["LAB".to_owned()];
    });
    let config = crate::ConfigLoader::load(&loader).expect("static config");

    let settings = pdq_config(&config);

    assert_eq!(settings.sender.application, "HIS");
    assert_eq!(settings.sender.facility, "WEST");
    assert_eq!(settings.locale.country, "FRA");
    assert!(settings.application_filter.permits("LAB"));
    assert!(!settings.application_filter.permits("RADIOLOGY"));
}

#[rstest]
fn disabled_listener_is_reported_and_not_bound() {
    let loader = TestConfigLoader::new().with(|config| config.listener_enabled = false);
    let reporter = Arc::new(RecordingHealthReporter::default());
    let daemon = bootstrap_with(&loader, reporter.clone(), &SeededStoreProvider::default())
        .expect("bootstrap should succeed");

    let handle = daemon.start_listener().expect("listener start");

    assert!(handle.is_none());
    assert!(reporter.events().contains(&HealthEvent::ListenerDisabled));
}

#[rstest]
fn run_daemon_with_stops_after_shutdown_signal() {
    let loader = TestConfigLoader::new();
    let reporter = Arc::new(RecordingHealthReporter::default());

    run_daemon_with(
        &loader,
        reporter.clone(),
        &SeededStoreProvider::default(),
        &ImmediateShutdown,
    )
    .expect("daemon should stop cleanly");

    assert!(
        reporter
            .events()
            .iter()
            .any(|event| matches!(event, HealthEvent::ListenerStarted(_))),
        "listener should have started"
    );
}

#[rstest]
fn run_daemon_with_surfaces_bootstrap_errors() {
    let error = run_daemon_with(
        &FailingConfigLoader,
        Arc::new(RecordingHealthReporter::default()),
        &SeededStoreProvider::default(),
        &ImmediateShutdown,
    )
    .expect_err("configuration is invalid");

    assert!(matches!(error, LaunchError::Bootstrap { .. }), "{error}");
}
