use reqtrail_core::TrailError;
use std::path::Path;
use tracing::error;

/// Receives persistence failures from the writer.
///
/// Failures never reach the request path; this is the only place they
/// surface. Any `Fn(&Path, &TrailError)` closure is a reporter.
pub trait ErrorReporter: Send + Sync + 'static {
    fn report(&self, path: &Path, error: &TrailError);
}

/// Default reporter: one `error!` event per failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, path: &Path, err: &TrailError) {
        error!(path = %path.display(), error = %err, "Failed to write log");
    }
}

impl<F> ErrorReporter for F
where
    F: Fn(&Path, &TrailError) + Send + Sync + 'static,
{
    fn report(&self, path: &Path, error: &TrailError) {
        self(path, error)
    }
}
