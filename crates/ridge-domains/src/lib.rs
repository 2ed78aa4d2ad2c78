//! Domain association syncer for Ridge
//!
//! Apps and Routers do not reference the PublicDomains that point at them.
//! This crate derives that reverse mapping: for every routing target it lists
//! the PublicDomains in the target's namespace whose `spec.targetName` names
//! it, and publishes their domain names on `status.publicDomains`.
//!
//! PublicDomain changes reach the syncer through the
//! [`RelationIndex`](ridge_common::relations::RelationIndex), wired in the
//! operator's controller runner. The trigger stream and the domain cache a
//! target controller reads must come from the same reflector, so a trigger
//! never observes a cache older than the change that caused it.

#![deny(missing_docs)]

pub mod controller;

pub use controller::{
    bound_domains, error_policy, reconcile, sync_target, SyncOutcome, SyncerContext,
    TargetKubeClient, TargetKubeClientImpl, CACHE_SYNC_RETRY,
};
