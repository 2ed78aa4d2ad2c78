//! Relation index: which keys to re-reconcile when a watched object changes
//!
//! Ridge kinds reference each other only by name, so a change to one object
//! has to be fanned out to the objects that name it:
//!
//! - PublicDomain changed → the routing target it names (`spec.targetName`).
//!   Registered once per target kind; the key is resolved as an App and as a
//!   Router, and whichever exists reconciles. When the index can see what
//!   targets publish, every target in the namespace whose published list no
//!   longer matches the live domains is added too. That is how the target a
//!   domain moved away from (or that lost a deleted domain) gets re-synced.
//! - Feature changed → every PublicDomain in the same namespace, but only for
//!   the issuer feature.
//! - App / Router changed → nothing. Their own controller already reconciles
//!   them, and no other kind derives state from them.
//!
//! Resolution is pure and total: unrecognized or incomplete objects, and cache
//! failures, resolve to an empty set.

use std::sync::Arc;

use kube::runtime::reflector::ObjectRef;
use kube::{Resource, ResourceExt};
use tracing::{debug, warn};

use crate::cache::{DomainLister, PublishedBindings};
use crate::crd::{App, Feature, PublicDomain, Router};

/// A change notification on one of the watched kinds
#[derive(Clone, Copy, Debug)]
pub enum WatchedObject<'a> {
    /// A PublicDomain changed
    PublicDomain(&'a PublicDomain),
    /// A Feature changed
    Feature(&'a Feature),
    /// An App changed
    App(&'a App),
    /// A Router changed
    Router(&'a Router),
}

/// Namespace/name key of an object to enqueue
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    /// Object namespace
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl ResourceKey {
    /// Create a key
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Convert into a controller `ObjectRef` for kind `K`
    pub fn object_ref<K>(&self) -> ObjectRef<K>
    where
        K: Resource<DynamicType = ()>,
    {
        ObjectRef::new(&self.name).within(&self.namespace)
    }
}

/// Domain names of the live PublicDomains binding to `target_name`.
///
/// Domains pending deletion are excluded. The result is sorted so that cache
/// iteration order never causes a spurious status write.
pub fn bound_domains(target_name: &str, domains: &[Arc<PublicDomain>]) -> Vec<String> {
    let mut names: Vec<String> = domains
        .iter()
        .filter(|pd| pd.binds_to(target_name) && !pd.is_terminating())
        .map(|pd| pd.spec.domain_name.clone())
        .collect();
    names.sort();
    names
}

/// Resolves watch events to the keys that must be re-reconciled
#[derive(Clone)]
pub struct RelationIndex {
    domains: Arc<dyn DomainLister>,
    published: Option<Arc<dyn PublishedBindings>>,
    feature_name: String,
}

impl RelationIndex {
    /// Create an index over a domain cache. `feature_name` is the Feature
    /// that configures issuance (e.g. `letsencrypt`).
    pub fn new(domains: Arc<dyn DomainLister>, feature_name: impl Into<String>) -> Self {
        Self {
            domains,
            published: None,
            feature_name: feature_name.into(),
        }
    }

    /// Also re-enqueue targets whose published bindings went stale.
    ///
    /// `published` covers one target kind, so the index is built per kind.
    pub fn with_published(mut self, published: Arc<dyn PublishedBindings>) -> Self {
        self.published = Some(published);
        self
    }

    /// Keys affected by a change to `changed`
    pub fn resolve(&self, changed: WatchedObject<'_>) -> Vec<ResourceKey> {
        match changed {
            WatchedObject::PublicDomain(pd) => self.targets_affected_by(pd),
            WatchedObject::Feature(feature) => self.domains_configured_by(feature),
            WatchedObject::App(_) | WatchedObject::Router(_) => Vec::new(),
        }
    }

    fn targets_affected_by(&self, pd: &PublicDomain) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = target_of(pd).into_iter().collect();
        if let (Some(published), Some(namespace)) = (&self.published, pd.namespace()) {
            keys.extend(self.stale_targets(published.as_ref(), &namespace));
        }
        keys.sort();
        keys.dedup();
        keys
    }

    /// Targets whose published list differs from what the live domains bind
    fn stale_targets(&self, published: &dyn PublishedBindings, namespace: &str) -> Vec<ResourceKey> {
        if !self.domains.is_synced() {
            debug!(namespace = %namespace, "domain cache still syncing, skipping stale scan");
            return Vec::new();
        }
        let domains = match self.domains.list_domains(namespace) {
            Ok(domains) => domains,
            Err(e) => {
                warn!(error = %e, namespace = %namespace, "failed to list public domains");
                return Vec::new();
            }
        };

        published
            .published_bindings(namespace)
            .into_iter()
            .filter(|(name, bound)| *bound != bound_domains(name, &domains))
            .map(|(name, _)| ResourceKey::new(namespace, name))
            .collect()
    }

    fn domains_configured_by(&self, feature: &Feature) -> Vec<ResourceKey> {
        if feature.name_any() != self.feature_name {
            return Vec::new();
        }
        let Some(namespace) = feature.namespace() else {
            return Vec::new();
        };

        match self.domains.list_domains(&namespace) {
            Ok(domains) => {
                let mut keys: Vec<ResourceKey> = domains
                    .iter()
                    .map(|pd| ResourceKey::new(namespace.clone(), pd.name_any()))
                    .collect();
                keys.sort();
                debug!(
                    feature = %self.feature_name,
                    namespace = %namespace,
                    affected = keys.len(),
                    "feature changed, re-enqueueing public domains"
                );
                keys
            }
            Err(e) => {
                warn!(error = %e, namespace = %namespace, "failed to list public domains");
                Vec::new()
            }
        }
    }
}

/// The routing target key a PublicDomain names, if complete
fn target_of(pd: &PublicDomain) -> Option<ResourceKey> {
    let namespace = pd.namespace()?;
    if pd.spec.target_name.is_empty() {
        return None;
    }
    Some(ResourceKey::new(namespace, pd.spec.target_name.clone()))
}
