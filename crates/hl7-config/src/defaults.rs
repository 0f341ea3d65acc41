use camino::Utf8PathBuf;
use std::env;

#[cfg(unix)]
use libc::geteuid;

#[cfg(unix)]
use dirs::runtime_dir;

use crate::LogFormat;
use crate::endpoint::ListenEndpoint;

/// Conventional MLLP port for HL7v2 listeners.
pub const DEFAULT_MLLP_PORT: u16 = 2575;

/// Host the listener binds unless configured otherwise.
pub const DEFAULT_LISTEN_HOST: &str = "127.0.0.1";

/// Value written to MSH-3 and MSH-4 of generated replies.
pub const DEFAULT_APPLICATION_CODE: &str = "gnuhealth";

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Seconds a connection may stay silent before it is closed.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;

/// Largest MLLP frame body accepted from a client.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Country code placed in MSH-17 of PDQ responses.
pub const DEFAULT_PDQ_COUNTRY: &str = "ITA";

/// Character set placed in MSH-18 of PDQ responses.
pub const DEFAULT_PDQ_CHARACTER_SET: &str = "UNICODE UTF-8";

/// Principal language placed in MSH-19 of PDQ responses.
pub const DEFAULT_PDQ_LANGUAGE: &str = "EN";

const MESSAGE_LOG_FILE: &str = "hl7d-messages.jsonl";

/// Default listener endpoint, `tcp://127.0.0.1:2575`.
#[must_use]
pub fn default_listen_endpoint() -> ListenEndpoint {
    ListenEndpoint::tcp(DEFAULT_LISTEN_HOST, DEFAULT_MLLP_PORT)
}

/// Owned application code for serde and ortho defaults.
#[must_use]
pub fn default_application_code() -> String {
    DEFAULT_APPLICATION_CODE.to_owned()
}

/// Default log filter expression used by the daemon.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the daemon.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Owned PDQ country code.
#[must_use]
pub fn default_pdq_country() -> String {
    DEFAULT_PDQ_COUNTRY.to_owned()
}

/// Owned PDQ character set.
#[must_use]
pub fn default_pdq_character_set() -> String {
    DEFAULT_PDQ_CHARACTER_SET.to_owned()
}

/// Owned PDQ language code.
#[must_use]
pub fn default_pdq_language() -> String {
    DEFAULT_PDQ_LANGUAGE.to_owned()
}

/// Location of the request/response journal when none is configured.
///
/// Prefers the per-user runtime directory and falls back to a uid-scoped
/// directory under the system temporary directory.
#[must_use]
pub fn default_message_log_path() -> Utf8PathBuf {
    runtime_base_directory().join(MESSAGE_LOG_FILE)
}

#[cfg(unix)]
fn runtime_base_directory() -> Utf8PathBuf {
    if let Some(mut dir) = runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok()) {
        dir.push("hl7d");
        return dir;
    }
    let mut dir = fallback_base_directory();
    dir.push("hl7d");
    dir.push(user_namespace());
    dir
}

#[cfg(not(unix))]
fn runtime_base_directory() -> Utf8PathBuf {
    let mut dir = fallback_base_directory();
    dir.push("hl7d");
    dir
}

fn fallback_base_directory() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

#[cfg(unix)]
fn user_namespace() -> String {
    // SAFETY: geteuid has no preconditions and cannot fail.
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}
