//! Runtime configuration for the request logger.
//!
//! [`LoggerSettings`] carries the plain data (toggles, thresholds, paths) and
//! can come from the environment. [`LoggerConfig`] adds the collaborators
//! that can only be supplied in code.

use http::request::Parts;
use reqtrail_core::{
    ExplicitOrigin, GeoLookup, IdGenerator, LogEntry, LoggerSettings, OriginProvider, StackWalker,
    UuidV4,
};
use reqtrail_writer::{ErrorReporter, TracingReporter};
use std::path::PathBuf;
use std::sync::Arc;

pub use reqtrail_core::entry::ANONYMOUS_USER;

/// Derives the user identity from the request head.
pub type UserExtractor = Arc<dyn Fn(&Parts) -> String + Send + Sync>;

/// Side-effect hook invoked with every finished entry.
pub type EntryCallback = Arc<dyn Fn(&LogEntry) + Send + Sync>;

/// Settings plus collaborators, fixed once the layer is built.
#[derive(Clone)]
pub struct LoggerConfig {
    pub settings: LoggerSettings,
    pub(crate) track_user: Option<UserExtractor>,
    pub(crate) on_log: Option<EntryCallback>,
    pub(crate) geo_lookup: Option<Arc<dyn GeoLookup>>,
    pub(crate) origin_provider: Arc<dyn OriginProvider>,
    pub(crate) id_generator: Arc<dyn IdGenerator>,
    pub(crate) error_reporter: Arc<dyn ErrorReporter>,
}

impl LoggerConfig {
    /// Defaults for everything but the log path.
    pub fn new(log_file: impl Into<PathBuf>) -> Self {
        Self::from_settings(LoggerSettings::new(log_file))
    }

    pub fn from_settings(settings: LoggerSettings) -> Self {
        Self {
            settings,
            track_user: None,
            on_log: None,
            geo_lookup: None,
            origin_provider: Arc::new(ExplicitOrigin::with_fallback(StackWalker)),
            id_generator: Arc::new(UuidV4),
            error_reporter: Arc::new(TracingReporter),
        }
    }

    /// Adjust the data settings in place.
    pub fn configure(mut self, f: impl FnOnce(&mut LoggerSettings)) -> Self {
        f(&mut self.settings);
        self
    }

    pub fn track_user<F>(mut self, f: F) -> Self
    where
        F: Fn(&Parts) -> String + Send + Sync + 'static,
    {
        self.track_user = Some(Arc::new(f));
        self
    }

    pub fn on_log<F>(mut self, f: F) -> Self
    where
        F: Fn(&LogEntry) + Send + Sync + 'static,
    {
        self.on_log = Some(Arc::new(f));
        self
    }

    /// Lookup consulted when `enable_geoip` is on. Without one, only the
    /// local-address placeholder is ever recorded.
    pub fn geo_lookup(mut self, lookup: impl GeoLookup) -> Self {
        self.geo_lookup = Some(Arc::new(lookup));
        self
    }

    /// Replaces the default, which prefers an [`Origin`](reqtrail_core::Origin)
    /// attached to the response and falls back to [`StackWalker`].
    pub fn origin_provider(mut self, provider: impl OriginProvider) -> Self {
        self.origin_provider = Arc::new(provider);
        self
    }

    pub fn id_generator(mut self, generator: impl IdGenerator) -> Self {
        self.id_generator = Arc::new(generator);
        self
    }

    pub fn error_reporter(mut self, reporter: impl ErrorReporter) -> Self {
        self.error_reporter = Arc::new(reporter);
        self
    }

    pub(crate) fn user_of(&self, parts: &Parts) -> String {
        match &self.track_user {
            Some(extract) => extract(parts),
            None => ANONYMOUS_USER.to_string(),
        }
    }
}

impl std::fmt::Debug for LoggerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerConfig")
            .field("settings", &self.settings)
            .field("track_user", &self.track_user.is_some())
            .field("on_log", &self.on_log.is_some())
            .field("geo_lookup", &self.geo_lookup.is_some())
            .finish_non_exhaustive()
    }
}
