//! Daemon bootstrap orchestration.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use hl7_config::{Config, ConfigError};
use hl7_core::{
    AckBuilder, HandlerRegistry, HeaderLocale, RegistryError, Sender, Stamper, SystemStamper,
};
use hl7_pdq::{
    ApplicationFilter, DemographicsStore, InMemoryDemographicsStore, PdqConfig, StoreError,
};

use crate::dispatch::{Dispatcher, MllpConnectionHandler};
use crate::health::HealthReporter;
use crate::message_log::{JsonlMessageLog, MessageLog, MessageLogError, NullMessageLog};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::{ListenerError, ListenerHandle, MllpListener};

const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a configuration built in code.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Source of the demographics store queried by the PDQ supplier.
pub trait StoreProvider: Send + Sync {
    /// Opens the store described by `config`.
    fn open(&self, config: &Config) -> Result<Arc<dyn DemographicsStore>, StoreError>;
}

/// Provider reading the JSON file named by `demographics_path`.
///
/// Without a path the store starts empty and every query answers `NF`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileStoreProvider;

impl StoreProvider for FileStoreProvider {
    fn open(&self, config: &Config) -> Result<Arc<dyn DemographicsStore>, StoreError> {
        let store = match config.demographics_path() {
            Some(path) => InMemoryDemographicsStore::from_json_file(path.as_std_path())?,
            None => InMemoryDemographicsStore::default(),
        };
        tracing::info!(
            target: BOOTSTRAP_TARGET,
            patients = store.len(),
            "demographics store loaded"
        );
        Ok(Arc::new(store))
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Configuration loaded but holds unusable values.
    #[error("invalid configuration: {source}")]
    InvalidConfiguration {
        /// Validation failure.
        #[source]
        source: ConfigError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The demographics store could not be opened.
    #[error("failed to open demographics store: {source}")]
    Demographics {
        /// Underlying store error.
        #[source]
        source: StoreError,
    },
    /// A transaction handler refused its registration.
    #[error("failed to register transaction handlers: {source}")]
    Registry {
        /// Underlying registry error.
        #[source]
        source: RegistryError,
    },
    /// The message log could not be opened.
    #[error("failed to open message log: {source}")]
    MessageLog {
        /// Underlying journal error.
        #[source]
        source: MessageLogError,
    },
}

/// Result of a successful bootstrap invocation.
pub struct Daemon {
    config: Config,
    registry: Arc<HandlerRegistry>,
    dispatcher: Arc<Dispatcher>,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Daemon")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Routing table built from the enabled extensions.
    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Dispatcher shared by every connection.
    #[must_use]
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Binds the configured endpoint and starts accepting connections.
    ///
    /// Returns `Ok(None)` when configuration disables the listener.
    pub fn start_listener(&self) -> Result<Option<ListenerHandle>, ListenerError> {
        if !self.config.listener_enabled {
            self.reporter.listener_disabled();
            return Ok(None);
        }
        let listener = MllpListener::bind(self.config.listen())?;
        let handler = Arc::new(MllpConnectionHandler::new(
            self.dispatcher(),
            self.config.max_frame_bytes,
            self.config.read_timeout(),
        ));
        let handle = listener.start(handler)?;
        self.reporter.listener_started(handle.local_addr());
        Ok(Some(handle))
    }
}

/// Bootstraps the daemon using the supplied collaborators.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    provider: &dyn StoreProvider,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();
    match assemble(loader, &reporter, provider) {
        Ok(daemon) => {
            reporter.bootstrap_succeeded(&daemon.config);
            Ok(daemon)
        }
        Err(error) => {
            reporter.bootstrap_failed(&error);
            Err(error)
        }
    }
}

fn assemble(
    loader: &dyn ConfigLoader,
    reporter: &Arc<dyn HealthReporter>,
    provider: &dyn StoreProvider,
) -> Result<Daemon, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    config
        .validate()
        .map_err(|source| BootstrapError::InvalidConfiguration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;

    let stamper: Arc<dyn Stamper> = Arc::new(SystemStamper);
    let routes = build_registry(&config, provider, &stamper)?;
    for registration in routes.registrations() {
        reporter.handler_registered(&registration);
    }
    let registry = Arc::new(routes);

    let log = open_message_log(&config)?;
    let sender = Sender::new(config.application_code.clone(), config.facility_name.clone());
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&registry),
        AckBuilder::new(sender, stamper),
        log,
    ));

    Ok(Daemon {
        config,
        registry,
        dispatcher,
        telemetry,
        reporter: Arc::clone(reporter),
    })
}

fn build_registry(
    config: &Config,
    provider: &dyn StoreProvider,
    stamper: &Arc<dyn Stamper>,
) -> Result<HandlerRegistry, BootstrapError> {
    let mut registry = HandlerRegistry::new();
    if config.pdq_enabled {
        let store = provider
            .open(config)
            .map_err(|source| BootstrapError::Demographics { source })?;
        hl7_pdq::register(&mut registry, pdq_config(config), store, Arc::clone(stamper))
            .map_err(|source| BootstrapError::Registry { source })?;
    }
    Ok(registry)
}

/// Supplier settings derived from the daemon configuration.
#[must_use]
pub fn pdq_config(config: &Config) -> PdqConfig {
    PdqConfig {
        sender: Sender::new(config.application_code.clone(), config.facility_name.clone()),
        locale: HeaderLocale {
            country: config.pdq_country.clone(),
            character_set: config.pdq_character_set.clone(),
            language: config.pdq_language.clone(),
        },
        application_filter: ApplicationFilter::from_settings(
            config.pdq_filter_by_allowed_app,
            &config.pdq_allowed_applications,
        ),
    }
}

fn open_message_log(config: &Config) -> Result<Arc<dyn MessageLog>, BootstrapError> {
    if !config.message_log_enabled {
        return Ok(Arc::new(NullMessageLog));
    }
    let path = config.message_log_path();
    let log = JsonlMessageLog::open(&path).map_err(|source| BootstrapError::MessageLog { source })?;
    tracing::info!(
        target: BOOTSTRAP_TARGET,
        path = %log.path(),
        "recording transactions"
    );
    Ok(Arc::new(log))
}
