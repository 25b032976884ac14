use thiserror::Error;

/// Unified error type for Reqtrail.
///
/// None of these ever reach the request path: enrichment failures are
/// dropped and persistence failures go to the writer's error reporter.
#[derive(Error, Debug)]
pub enum TrailError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Geo lookup failed: {0}")]
    GeoLookup(String),

    #[error("Log writer is closed")]
    WriterClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<figment::Error> for TrailError {
    fn from(err: figment::Error) -> Self {
        TrailError::Config(err.to_string())
    }
}
