//! Common types for Ridge: CRDs, errors, caches, and the owner-scoped applier

#![deny(missing_docs)]

pub mod applier;
pub mod backoff;
pub mod cache;
pub mod certificate;
pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod relations;
pub mod store;
pub mod telemetry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default name of the Feature that selects the certificate issuer
pub const DEFAULT_ISSUER_FEATURE: &str = "letsencrypt";

/// Default `answers` key holding the issuer type
pub const DEFAULT_ISSUER_TYPE_KEY: &str = "type";

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
pub const WATCH_TIMEOUT_SECS: u32 = 25;
