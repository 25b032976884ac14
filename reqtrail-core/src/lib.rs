pub mod config;
pub mod entry;
pub mod error;
pub mod geo;
pub mod id;
pub mod ip;
pub mod mask;
pub mod origin;

pub use config::LoggerSettings;
pub use entry::{ANONYMOUS_USER, Location, LogEntry, Origin};
pub use error::TrailError;
pub use geo::{CidrGeoTable, GeoEnricher, GeoLookup, GeoRecord};
pub use id::{IdGenerator, UuidV4};
pub use mask::{FieldMasker, limit_size};
pub use origin::{ExplicitOrigin, OriginProvider, StackWalker};
