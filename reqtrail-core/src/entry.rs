//! The persisted request record.
//!
//! One [`LogEntry`] is produced per logged request, after the response has
//! finished. Field names are camelCase and optional fields are omitted (never
//! `null`) so every line stays compact and self-describing.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::Location as CallerLocation;
use std::path::Path;

/// `user` value when no identity could be extracted.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Marker stored in every [`Location`] field for loopback / unknown clients.
pub const LOCATION_NOT_AVAILABLE: &str = "Not available for local requests";

/// Best-effort attribution of the code that produced a response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Origin {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub func: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl Origin {
    /// Origin pointing at the caller's source file and line.
    ///
    /// Handlers attach this to their response extensions for explicit
    /// attribution (see [`crate::origin::ExplicitOrigin`]).
    #[track_caller]
    pub fn at(func: impl Into<String>) -> Self {
        let caller = CallerLocation::caller();
        Self {
            file: Some(base_name(caller.file())),
            func: Some(func.into()),
            line: Some(caller.line()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.func.is_none() && self.line.is_none()
    }
}

/// Directory-stripped file name; the input itself when it has no file name.
pub(crate) fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Geolocation attached to an entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl Location {
    /// Enrichment ran but does not apply (loopback or unknown client).
    pub fn not_available() -> Self {
        Self {
            country: Some(LOCATION_NOT_AVAILABLE.to_string()),
            region: Some(LOCATION_NOT_AVAILABLE.to_string()),
            city: Some(LOCATION_NOT_AVAILABLE.to_string()),
        }
    }
}

/// A single request log record.
///
/// Built once inside the response-finished handler, then handed to the
/// entry callback and the writer. Masking and size limiting have already
/// been applied to `body`, `query`, and `headers` by then.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Correlation id, from the configured header or freshly generated.
    pub request_id: String,
    /// RFC 3339 UTC, millisecond precision.
    pub timestamp: String,
    pub method: String,
    /// Original (unrewritten) URL including the query string.
    pub route: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Elapsed milliseconds, rounded to two decimals.
    pub duration_ms: f64,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_snippet: Option<String>,
    /// Present (and `true`) only for slow requests when tracking is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slow: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl LogEntry {
    /// Create an entry with the mandatory fields; optional ones start empty.
    pub fn new(
        request_id: impl Into<String>,
        method: impl Into<String>,
        route: impl Into<String>,
        status: u16,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            timestamp: now_timestamp(),
            method: method.into(),
            route: route.into(),
            status,
            ip: None,
            duration_ms: 0.0,
            user: ANONYMOUS_USER.to_string(),
            body: None,
            response_snippet: None,
            slow: None,
            query: None,
            origin: None,
            location: None,
            headers: None,
            params: None,
        }
    }

    /// Serialise to one line of JSON (or indented JSON) ending in `\n`.
    pub fn to_json_line(&self, pretty: bool) -> serde_json::Result<String> {
        let mut line = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        line.push('\n');
        Ok(line)
    }
}

/// Current UTC time as `2024-05-01T12:00:00.123Z`.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Milliseconds with two-decimal precision.
pub fn round_ms(elapsed: std::time::Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}
