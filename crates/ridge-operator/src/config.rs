//! Command line and environment configuration

use std::time::Duration;

use clap::Parser;

use ridge_common::backoff::ErrorBackoff;
use ridge_common::telemetry::{LogFormat, TelemetryConfig};
use ridge_common::{DEFAULT_ISSUER_FEATURE, DEFAULT_ISSUER_TYPE_KEY};

/// Ridge - binds public domains to apps and routers and issues their certificates
#[derive(Parser, Debug, Clone)]
#[command(name = "ridge-operator", version, about, long_about = None)]
pub struct Config {
    /// Print CRD manifests and exit
    #[arg(long)]
    pub crd: bool,

    /// Install or update CRDs on startup
    #[arg(long, env = "RIDGE_INSTALL_CRDS")]
    pub install_crds: bool,

    /// Namespace to watch; all namespaces when unset
    #[arg(long, env = "RIDGE_NAMESPACE")]
    pub namespace: Option<String>,

    /// Name of the Feature that selects the certificate issuer
    #[arg(long, env = "RIDGE_FEATURE_NAME", default_value = DEFAULT_ISSUER_FEATURE)]
    pub feature_name: String,

    /// Key in the Feature's answers holding the issuer type
    #[arg(long, env = "RIDGE_ISSUER_TYPE_KEY", default_value = DEFAULT_ISSUER_TYPE_KEY)]
    pub issuer_type_key: String,

    /// Log output format (json or pretty)
    #[arg(long, env = "RIDGE_LOG_FORMAT", default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "RIDGE_LOG_FILTER")]
    pub log_filter: Option<String>,

    /// First retry delay after a failed reconcile, in seconds
    #[arg(long, env = "RIDGE_BACKOFF_BASE_SECS", default_value_t = 5)]
    pub backoff_base_secs: u64,

    /// Maximum retry delay, in seconds
    #[arg(long, env = "RIDGE_BACKOFF_MAX_SECS", default_value_t = 300)]
    pub backoff_max_secs: u64,

    /// Periodic resync interval for healthy objects, in seconds
    #[arg(long, env = "RIDGE_REQUEUE_SECS", default_value_t = 300)]
    pub requeue_secs: u64,
}

impl Config {
    /// Telemetry settings
    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            format: self.log_format,
            filter: self.log_filter.clone(),
        }
    }

    /// A fresh backoff tracker; each controller gets its own
    pub fn backoff(&self) -> ErrorBackoff {
        ErrorBackoff::new(
            Duration::from_secs(self.backoff_base_secs),
            Duration::from_secs(self.backoff_max_secs),
        )
    }

    /// Resync interval for healthy objects
    pub fn resync(&self) -> Duration {
        Duration::from_secs(self.requeue_secs)
    }
}
