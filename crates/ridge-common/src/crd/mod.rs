//! Custom Resource Definitions for Ridge
//!
//! All Ridge kinds are namespaced and live in the `ridge.dev/v1` API group.
//! Status blocks are outputs of the reconcilers. They are only read back to
//! skip writes that would not change anything.

mod feature;
mod public_domain;
mod target;

pub use feature::{Feature, FeatureSpec};
pub use public_domain::{PublicDomain, PublicDomainSpec, PublicDomainStatus, SecretRef};
pub use target::{
    App, AppSpec, Router, RouterSpec, RoutingTarget, RoutingTargetStatus, TargetKind,
};

/// API group for Ridge CRDs
pub const GROUP: &str = "ridge.dev";

/// API version (group/version) for Ridge CRDs
pub const API_VERSION: &str = "ridge.dev/v1";

/// Serde default helper returning `true`
pub(crate) fn default_true() -> bool {
    true
}
