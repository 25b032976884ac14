use http::HeaderMap;
use reqtrail_core::IdGenerator;
use std::time::Instant;

/// Correlation id of the current request, inserted as a request extension
/// for downstream handlers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-request state created when interception starts and carried until the
/// entry is written.
#[derive(Debug, Clone)]
pub(crate) struct RequestContext {
    pub request_id: String,
    pub started: Instant,
}

impl RequestContext {
    pub fn start(request_id: String) -> Self {
        Self {
            request_id,
            started: Instant::now(),
        }
    }
}

/// Correlation id from `header` (first value wins), or a fresh one.
pub(crate) fn correlation_id(headers: &HeaderMap, header: &str, ids: &dyn IdGenerator) -> String {
    headers
        .get_all(header)
        .iter()
        .next()
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| ids.generate())
}
