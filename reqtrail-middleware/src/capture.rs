//! Request-side capture: everything the entry needs from the request is
//! snapshotted here, before the request moves into the inner service.

use crate::config::LoggerConfig;
use axum::extract::{ConnectInfo, OriginalUri, RawPathParams};
use http::header::CONTENT_TYPE;
use http::request::Parts;
use http::{HeaderMap, Uri};
use reqtrail_core::ip::{ClientIp, resolve_client_ip};
use serde_json::{Map, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

/// Lower bound for the request-body capture ceiling.
const MIN_CAPTURE_BYTES: usize = 64 * 1024;

/// How many raw bytes to tee off a request body before giving up.
///
/// Larger than `max_body_size` because the limit applies to the masked JSON,
/// not to the wire bytes.
pub(crate) fn capture_limit(max_body_size: usize) -> usize {
    max_body_size.saturating_mul(16).max(MIN_CAPTURE_BYTES)
}

/// Bounded byte sink shared between a body decorator and the entry.
#[derive(Clone, Debug)]
pub(crate) struct BodyBuffer {
    inner: Arc<Mutex<Captured>>,
    limit: usize,
}

#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    overflowed: bool,
}

/// What ended up in a [`BodyBuffer`].
#[derive(Debug, PartialEq)]
pub(crate) enum CapturedBody {
    Empty,
    Overflowed,
    Bytes(Vec<u8>),
}

impl BodyBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Arc::default(),
            limit,
        }
    }

    pub fn push(&self, chunk: &[u8]) {
        let mut captured = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if captured.overflowed {
            return;
        }
        if captured.bytes.len() + chunk.len() > self.limit {
            captured.overflowed = true;
            captured.bytes = Vec::new();
            return;
        }
        captured.bytes.extend_from_slice(chunk);
    }

    pub fn take(&self) -> CapturedBody {
        let mut captured = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if captured.overflowed {
            CapturedBody::Overflowed
        } else if captured.bytes.is_empty() {
            CapturedBody::Empty
        } else {
            CapturedBody::Bytes(std::mem::take(&mut captured.bytes))
        }
    }
}

/// Request facts recorded at interception start.
#[derive(Debug)]
pub(crate) struct RequestSnapshot {
    pub method: String,
    pub route: String,
    pub ip: String,
    pub user: String,
    pub content_type: Option<String>,
    pub query: Option<Value>,
    pub headers: Option<Value>,
    pub params: Option<Value>,
    pub body: Option<BodyBuffer>,
}

impl RequestSnapshot {
    pub fn capture(
        config: &LoggerConfig,
        parts: &Parts,
        params: Option<Value>,
        body: Option<BodyBuffer>,
    ) -> Self {
        let settings = &config.settings;
        let route_uri = parts
            .extensions
            .get::<OriginalUri>()
            .map_or(&parts.uri, |original| &original.0);

        Self {
            method: parts.method.to_string(),
            route: route_of(route_uri),
            ip: client_ip(parts),
            user: config.user_of(parts),
            content_type: parts
                .headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            query: settings.track_query.then(|| query_object(route_uri)),
            headers: settings.log_headers.then(|| headers_object(&parts.headers)),
            params,
            body,
        }
    }
}

fn route_of(uri: &Uri) -> String {
    uri.path_and_query()
        .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string())
}

fn client_ip(parts: &Parts) -> String {
    let framework = parts.extensions.get::<ClientIp>().map(|ip| ip.0.as_str());
    let remote = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    resolve_client_ip(framework, remote, &parts.headers)
}

/// Query string as a flat object; `{}` when there is none.
pub(crate) fn query_object(uri: &Uri) -> Value {
    uri.query()
        .and_then(|q| decode_pairs(q.as_bytes()))
        .unwrap_or_else(|| Value::Object(Map::new()))
}

/// Lowercase header names to values, repeated headers joined with `", "`.
pub(crate) fn headers_object(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        map.insert(name.as_str().to_string(), Value::String(joined));
    }
    Value::Object(map)
}

/// Matched route params, `None` when there are none.
pub(crate) fn params_object(params: &RawPathParams) -> Option<Value> {
    let map: Map<String, Value> = params
        .iter()
        .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
        .collect();
    (!map.is_empty()).then_some(Value::Object(map))
}

/// Decode captured request bytes.
///
/// JSON first, then `application/x-www-form-urlencoded` when the content
/// type says so, otherwise the (lossy) UTF-8 text.
pub(crate) fn decode_body(bytes: &[u8], content_type: Option<&str>) -> Value {
    if let Ok(json) = serde_json::from_slice::<Value>(bytes) {
        return json;
    }
    let is_form = content_type
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
    if is_form {
        if let Some(form) = decode_pairs(bytes) {
            return form;
        }
    }
    Value::String(String::from_utf8_lossy(bytes).into_owned())
}

/// `a=1&b=2&a=3` → `{"a": ["1", "3"], "b": "2"}`.
fn decode_pairs(encoded: &[u8]) -> Option<Value> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(encoded).ok()?;
    let mut map = Map::new();
    for (key, value) in pairs {
        match map.get_mut(&key) {
            Some(Value::Array(values)) => values.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                map.insert(key, Value::String(value));
            }
        }
    }
    Some(Value::Object(map))
}
