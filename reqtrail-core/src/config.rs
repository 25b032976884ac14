use crate::error::TrailError;
use figment::{Figment, providers::Env};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Plain-data logger settings.
///
/// Supplied once when the middleware is installed and never mutated
/// afterwards. Everything except `log_file` has a default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggerSettings {
    /// Destination file; one JSON record is appended per logged request.
    pub log_file: PathBuf,
    /// Top-level keys redacted from body, query, and headers.
    #[serde(default = "default_mask_fields")]
    pub mask_fields: Vec<String>,
    #[serde(default = "default_true")]
    pub capture_body: bool,
    #[serde(default)]
    pub track_query: bool,
    #[serde(default)]
    pub log_headers: bool,
    #[serde(default)]
    pub log_params: bool,
    /// Record the first 200 characters of the response body.
    #[serde(default)]
    pub log_response_body: bool,
    /// Suppress entries for responses with status < 400.
    #[serde(default)]
    pub only_log_on_error: bool,
    /// Serialized request bodies above this many bytes are replaced wholesale.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    #[serde(default)]
    pub track_origin: bool,
    #[serde(default)]
    pub enable_geoip: bool,
    #[serde(default = "default_slow_threshold_ms")]
    pub slow_threshold_ms: u64,
    #[serde(default)]
    pub track_slow: bool,
    /// Header read as the correlation id source.
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,
    #[serde(default)]
    pub pretty_print: bool,
    /// Exact-match request paths that bypass logging entirely.
    #[serde(default)]
    pub exclude_paths: Vec<String>,
    /// Pseudonymise the recorded client IP (after geolocation).
    #[serde(default)]
    pub anonymize_ips: bool,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_mask_fields() -> Vec<String> { vec!["password".into(), "token".into()] }
fn default_true() -> bool { true }
fn default_max_body_size() -> usize { 1024 }
fn default_slow_threshold_ms() -> u64 { 1000 }
fn default_request_id_header() -> String { "x-request-id".into() }

// ── Impls ─────────────────────────────────────────────────────

impl LoggerSettings {
    /// Settings for `log_file` with every other field at its default.
    pub fn new(log_file: impl Into<PathBuf>) -> Self {
        Self {
            log_file: log_file.into(),
            mask_fields: default_mask_fields(),
            capture_body: true,
            track_query: false,
            log_headers: false,
            log_params: false,
            log_response_body: false,
            only_log_on_error: false,
            max_body_size: default_max_body_size(),
            track_origin: false,
            enable_geoip: false,
            slow_threshold_ms: default_slow_threshold_ms(),
            track_slow: false,
            request_id_header: default_request_id_header(),
            pretty_print: false,
            exclude_paths: Vec::new(),
            anonymize_ips: false,
        }
    }

    /// Load settings from `REQTRAIL_*` environment variables.
    ///
    /// `REQTRAIL_LOG_FILE` is required; list values use figment's array
    /// syntax, e.g. `REQTRAIL_EXCLUDE_PATHS='["/health", "/ready"]'`.
    pub fn from_env() -> Result<Self, TrailError> {
        let settings: LoggerSettings = Figment::new()
            .merge(Env::prefixed("REQTRAIL_"))
            .extract()?;
        Ok(settings)
    }

    /// Whether `path` is in the exclusion set.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.exclude_paths.iter().any(|p| p == path)
    }

    /// Slow flag for a measured duration: `Some(true)` only when tracking is
    /// on and the threshold is exceeded, otherwise the field stays absent.
    pub fn slow_flag(&self, duration_ms: f64) -> Option<bool> {
        (self.track_slow && duration_ms > self.slow_threshold_ms as f64).then_some(true)
    }
}
