pub mod reporter;
pub mod writer;

pub use reporter::{ErrorReporter, TracingReporter};
pub use writer::LogWriter;
