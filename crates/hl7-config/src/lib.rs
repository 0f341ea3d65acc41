//! Shared configuration for the HL7v2 MLLP daemon.
//!
//! Values are layered by `ortho_config`: built-in defaults, then a TOML file
//! named by `--config-path` or `HL7_CONFIG_PATH`, then `HL7_*` environment
//! variables, then command-line flags.

mod defaults;
mod endpoint;

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

pub use defaults::{
    DEFAULT_APPLICATION_CODE, DEFAULT_LISTEN_HOST, DEFAULT_LOG_FILTER, DEFAULT_MAX_FRAME_BYTES,
    DEFAULT_MLLP_PORT, DEFAULT_PDQ_CHARACTER_SET, DEFAULT_PDQ_COUNTRY, DEFAULT_PDQ_LANGUAGE,
    DEFAULT_READ_TIMEOUT_SECS, default_application_code, default_listen_endpoint,
    default_log_filter, default_log_filter_string, default_log_format, default_message_log_path,
    default_pdq_character_set, default_pdq_country, default_pdq_language,
};
pub use endpoint::{EndpointParseError, ListenEndpoint, WILDCARD_HOST};

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

/// Daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "HL7")]
pub struct Config {
    /// Binds the MLLP listener when true. A disabled daemon still boots and
    /// waits for a shutdown signal.
    #[ortho_config(default = true)]
    pub listener_enabled: bool,
    /// Address the MLLP listener binds.
    #[ortho_config(default = default_listen_endpoint())]
    pub listen: ListenEndpoint,
    /// Sending application (MSH-3) of generated replies.
    #[ortho_config(default = default_application_code())]
    pub application_code: String,
    /// Sending facility (MSH-4) of generated replies.
    #[ortho_config(default = default_application_code())]
    pub facility_name: String,
    /// Records every request/response pair when true.
    #[ortho_config(default = true)]
    pub message_log_enabled: bool,
    /// JSON Lines journal for request/response pairs.
    pub message_log_path: Option<Utf8PathBuf>,
    /// Per-frame read timeout in seconds; zero waits forever.
    #[ortho_config(default = DEFAULT_READ_TIMEOUT_SECS)]
    pub read_timeout_secs: u64,
    /// Largest accepted MLLP frame body in bytes.
    #[ortho_config(default = DEFAULT_MAX_FRAME_BYTES)]
    pub max_frame_bytes: usize,
    /// Registers the PDQ and PDQV handlers when true.
    #[ortho_config(default = true)]
    pub pdq_enabled: bool,
    /// Restricts PDQ queries to the applications in
    /// [`Config::pdq_allowed_applications`].
    #[ortho_config(default = false)]
    pub pdq_filter_by_allowed_app: bool,
    /// Sending applications (MSH-3) allowed to query when filtering is on.
    #[ortho_config(merge_strategy = "append")]
    pub pdq_allowed_applications: Vec<String>,
    /// Country code (MSH-17) of PDQ responses.
    #[ortho_config(default = default_pdq_country())]
    pub pdq_country: String,
    /// Character set (MSH-18) of PDQ responses.
    #[ortho_config(default = default_pdq_character_set())]
    pub pdq_character_set: String,
    /// Principal language (MSH-19) of PDQ responses.
    #[ortho_config(default = default_pdq_language())]
    pub pdq_language: String,
    /// JSON file seeding the in-memory demographics store.
    pub demographics_path: Option<Utf8PathBuf>,
    /// `tracing` filter directive.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listener_enabled: true,
            listen: default_listen_endpoint(),
            application_code: default_application_code(),
            facility_name: default_application_code(),
            message_log_enabled: true,
            message_log_path: None,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            pdq_enabled: true,
            pdq_filter_by_allowed_app: false,
            pdq_allowed_applications: Vec::new(),
            pdq_country: default_pdq_country(),
            pdq_character_set: default_pdq_character_set(),
            pdq_language: default_pdq_language(),
            demographics_path: None,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Address the MLLP listener binds.
    #[must_use]
    pub const fn listen(&self) -> &ListenEndpoint {
        &self.listen
    }

    /// `tracing` filter directive.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Read timeout applied to client sockets, `None` when disabled.
    #[must_use]
    pub const fn read_timeout(&self) -> Option<Duration> {
        if self.read_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.read_timeout_secs))
        }
    }

    /// Journal location, falling back to the runtime directory.
    #[must_use]
    pub fn message_log_path(&self) -> Utf8PathBuf {
        self.message_log_path
            .clone()
            .unwrap_or_else(default_message_log_path)
    }

    /// JSON file seeding the demographics store, if configured.
    #[must_use]
    pub fn demographics_path(&self) -> Option<&Utf8Path> {
        self.demographics_path.as_deref()
    }

    /// Checks values that every layer may set but the daemon cannot run with.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_code.trim().is_empty() {
            return Err(ConfigError::EmptyValue {
                setting: "application_code",
            });
        }
        if self.facility_name.trim().is_empty() {
            return Err(ConfigError::EmptyValue {
                setting: "facility_name",
            });
        }
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::ZeroFrameLimit);
        }
        if self
            .pdq_allowed_applications
            .iter()
            .any(|application| application.trim().is_empty())
        {
            return Err(ConfigError::EmptyValue {
                setting: "pdq_allowed_applications",
            });
        }
        Ok(())
    }
}

/// Settings rejected by [`Config::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required text setting was blank.
    #[error("configuration value '{setting}' must not be empty")]
    EmptyValue {
        /// Name of the offending setting.
        setting: &'static str,
    },
    /// Frames could never be accepted.
    #[error("max_frame_bytes must be greater than zero")]
    ZeroFrameLimit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults_describe_a_local_listener() {
        let config = Config::default();
        assert_eq!(config.listen().to_string(), "tcp://127.0.0.1:2575");
        assert_eq!(config.application_code, "gnuhealth");
        assert_eq!(config.pdq_country, "ITA");
        assert_eq!(config.pdq_character_set, "UNICODE UTF-8");
        assert_eq!(config.pdq_language, "EN");
        assert_eq!(config.read_timeout(), Some(Duration::from_secs(60)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_timeout_disables_read_deadline() {
        let config = Config {
            read_timeout_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.read_timeout(), None);
    }

    #[test]
    fn message_log_path_prefers_configured_value() {
        let config = Config {
            message_log_path: Some(Utf8PathBuf::from("/var/log/hl7/journal.jsonl")),
            ..Config::default()
        };
        assert_eq!(
            config.message_log_path(),
            Utf8PathBuf::from("/var/log/hl7/journal.jsonl")
        );
        assert!(
            Config::default()
                .message_log_path()
                .as_str()
                .ends_with("hl7d-messages.jsonl")
        );
    }

    #[rstest]
    #[case(Config { application_code: "  ".into(), ..Config::default() }, "application_code")]
    #[case(Config { facility_name: String::new(), ..Config::default() }, "facility_name")]
    #[case(
        Config { pdq_allowed_applications: vec!["LAB".into(), String::new()], ..Config::default() },
        "pdq_allowed_applications"
    )]
    fn blank_values_fail_validation(#[case] config: Config, #[case] setting: &str) {
        let error = config.validate().expect_err("blank values must be rejected");
        assert!(matches!(error, ConfigError::EmptyValue { .. }));
        assert!(error.to_string().contains(setting), "unexpected error: {error}");
    }

    #[test]
    fn zero_frame_limit_fails_validation() {
        let config = Config {
            max_frame_bytes: 0,
            ..Config::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroFrameLimit));
    }

    #[rstest]
    #[case("json", LogFormat::Json)]
    #[case("COMPACT", LogFormat::Compact)]
    fn log_format_parses_case_insensitively(#[case] input: &str, #[case] expected: LogFormat) {
        assert_eq!(input.parse::<LogFormat>().expect("format parses"), expected);
    }
}
