//! # reqtrail-middleware
//!
//! A tower layer for axum that writes one structured JSON entry per request:
//! correlation id, timing, status, client IP, user, masked payload excerpts,
//! origin and geolocation.
//!
//! The request is passed on to the inner service immediately. The entry is
//! assembled once the response body has been sent in full, masked, and then
//! queued on a background writer; nothing on the response path waits for
//! disk I/O.
//!
//! ```rust,no_run
//! use axum::{Router, routing::post};
//! use reqtrail_middleware::{LoggerConfig, RequestLoggerLayer};
//!
//! # async fn example() {
//! let layer = RequestLoggerLayer::new(
//!     LoggerConfig::new("logs/requests.log").configure(|s| {
//!         s.track_query = true;
//!         s.exclude_paths.push("/health".into());
//!     }),
//! );
//!
//! let app: Router = Router::new()
//!     .route("/login", post(|| async { "ok" }))
//!     .layer(layer);
//! # }
//! ```
//!
//! Install with [`Router::route_layer`](axum::Router::route_layer) instead of
//! `layer` to have matched route params recorded.

mod body;
mod capture;
pub mod config;
mod context;
mod layer;
mod pending;

pub use body::SNIPPET_CHARS;
pub use config::{ANONYMOUS_USER, EntryCallback, LoggerConfig, UserExtractor};
pub use context::RequestId;
pub use layer::{RequestLoggerLayer, RequestLoggerService};

pub use reqtrail_core::ip::ClientIp;
pub use reqtrail_core::{
    CidrGeoTable, ExplicitOrigin, GeoLookup, GeoRecord, LogEntry, LoggerSettings, Origin,
    OriginProvider, StackWalker,
};
