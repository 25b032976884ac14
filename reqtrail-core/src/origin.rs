//! Response origin attribution.
//!
//! [`OriginProvider`] is the seam: the interceptor asks it once per request,
//! the first time the response is finalised. [`ExplicitOrigin`] reads an
//! [`Origin`] that the handler attached to its response; [`StackWalker`]
//! inspects the live call stack and serves as its fallback.
//!
//! The stack walk is best effort. Its skip list assumes a particular frame
//! layout of the runtime and the web stack, and attribution degrades when
//! that layout changes or when debug info is stripped.

use crate::entry::{Origin, base_name};
use http::Extensions;
use regex::Regex;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::sync::{Arc, LazyLock};

/// Resolves the code location that produced a response.
pub trait OriginProvider: Send + Sync + 'static {
    /// `extensions` are the response's extensions at finalisation time.
    fn resolve(&self, extensions: &Extensions) -> Option<Origin>;
}

/// Frames containing any of these are never attributed.
pub const SKIPPED_FRAME_MARKERS: &[&str] = &[
    // runtime internals
    "std::",
    "core::",
    "alloc::",
    "/rustc/",
    "__rust_",
    "<unknown>",
    // third-party dependencies
    "/.cargo/registry/",
    "/.cargo/git/",
    "tokio::",
    "tower::",
    "hyper::",
    "hyper_util::",
    "axum::",
    "axum_core::",
    "futures_util::",
    "futures_core::",
    "http_body",
    // the resolver itself
    "StackWalker",
    "resolve_from_trace",
    // this library, including the response-wrapping shim
    "reqtrail_core::",
    "reqtrail_middleware::",
    "reqtrail_writer::",
    "FinishBody",
    "RequestLoggerService",
];

static FRAME_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d+:\s*(.*?)\s*$").expect("static regex"));

// Tolerates `file://` prefixes and paths with embedded spaces.
static FRAME_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*at\s+(?:file://)?(.+?):(\d+)(?::\d+)?\s*$").expect("static regex")
});

static SYMBOL_HASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"::h[0-9a-f]{16}$").expect("static regex"));

/// Walks a freshly captured backtrace.
///
/// The interceptor resolves origin after the inner service future has
/// completed, so the handler's own frames are gone by then. The walker only
/// sees what is polling the service future: the connection task under a
/// server, or whatever spawned or awaited the request in tests. Handlers
/// that need exact attribution attach [`Origin::at`] and rely on
/// [`ExplicitOrigin`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StackWalker;

impl StackWalker {
    /// Capture the current stack and attribute it.
    #[inline(never)]
    pub fn capture() -> Option<Origin> {
        let trace = Backtrace::force_capture();
        if trace.status() != BacktraceStatus::Captured {
            return None;
        }
        resolve_from_trace(&trace.to_string())
    }
}

impl OriginProvider for StackWalker {
    fn resolve(&self, _extensions: &Extensions) -> Option<Origin> {
        Self::capture()
    }
}

/// Uses the [`Origin`] a handler stored in its response extensions, e.g.
/// `response.extensions_mut().insert(Origin::at("login"))`.
#[derive(Clone, Default)]
pub struct ExplicitOrigin {
    fallback: Option<Arc<dyn OriginProvider>>,
}

impl ExplicitOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consult `fallback` when the response carries no explicit origin.
    pub fn with_fallback(fallback: impl OriginProvider) -> Self {
        Self {
            fallback: Some(Arc::new(fallback)),
        }
    }
}

impl OriginProvider for ExplicitOrigin {
    fn resolve(&self, extensions: &Extensions) -> Option<Origin> {
        extensions
            .get::<Origin>()
            .filter(|o| !o.is_empty())
            .cloned()
            .or_else(|| self.fallback.as_ref()?.resolve(extensions))
    }
}

struct Frame<'a> {
    symbol: &'a str,
    location: Option<&'a str>,
}

/// Attribute a rendered backtrace.
///
/// The first frame is the capture point and is always skipped. Of the
/// remaining frames, the first whose symbol and location avoid
/// [`SKIPPED_FRAME_MARKERS`] and whose location parses is returned.
pub fn resolve_from_trace(trace: &str) -> Option<Origin> {
    split_frames(trace)
        .into_iter()
        .skip(1)
        .filter(|frame| !is_skipped(frame))
        .find_map(|frame| parse_frame(&frame))
}

fn split_frames(trace: &str) -> Vec<Frame<'_>> {
    let mut frames: Vec<Frame<'_>> = Vec::new();
    for line in trace.lines() {
        if let Some(caps) = FRAME_HEADER.captures(line) {
            let symbol = caps.get(1).map_or("", |m| m.as_str());
            frames.push(Frame { symbol, location: None });
        } else if FRAME_LOCATION.is_match(line) {
            // Inlined frames list several locations; the first is the call site.
            if let Some(frame) = frames.last_mut() {
                frame.location.get_or_insert(line);
            }
        }
    }
    frames
}

fn is_skipped(frame: &Frame<'_>) -> bool {
    let location = frame.location.unwrap_or("");
    SKIPPED_FRAME_MARKERS
        .iter()
        .any(|marker| frame.symbol.contains(marker) || location.contains(marker))
}

fn parse_frame(frame: &Frame<'_>) -> Option<Origin> {
    let caps = FRAME_LOCATION.captures(frame.location?)?;
    let file = caps.get(1)?.as_str();
    let line = caps.get(2).and_then(|m| m.as_str().parse().ok());
    Some(Origin {
        file: Some(base_name(file)),
        func: Some(function_name(frame.symbol)),
        line,
    })
}

fn function_name(symbol: &str) -> String {
    let mut name = SYMBOL_HASH.replace(symbol.trim(), "").into_owned();
    while let Some(stripped) = name.strip_suffix("::{{closure}}") {
        name = stripped.to_string();
    }
    if name.is_empty() {
        "anonymous".to_string()
    } else {
        name
    }
}
