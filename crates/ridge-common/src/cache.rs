//! Read-only cache views injected into reconcilers
//!
//! Reconcilers read related objects through these traits instead of holding
//! reflector stores directly, so tests can substitute fixed (or deliberately
//! stale) snapshots.
//!
//! Read-your-writes is NOT guaranteed: a domain created a moment ago may be
//! missing from `list_domains`, and a deleted one may still be present. Every
//! write that matters produces a watch event, which re-triggers the affected
//! keys, so reconcilers converge once the cache catches up.

use std::sync::Arc;

use futures::FutureExt;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::ResourceExt;

use crate::crd::{Feature, PublicDomain, RoutingTarget};
use crate::Error;

/// Lists PublicDomains by namespace
pub trait DomainLister: Send + Sync {
    /// All PublicDomains in `namespace`, in unspecified order
    fn list_domains(&self, namespace: &str) -> Result<Vec<Arc<PublicDomain>>, Error>;

    /// Whether the initial list has completed. Before that, an empty result
    /// does not mean the namespace has no domains.
    fn is_synced(&self) -> bool {
        true
    }
}

/// Lists the domain bindings routing targets currently publish
pub trait PublishedBindings: Send + Sync {
    /// `(name, status.publicDomains)` of the live targets in `namespace`.
    /// Targets that have never had a status written are omitted.
    fn published_bindings(&self, namespace: &str) -> Vec<(String, Vec<String>)>;
}

/// Looks up Features by namespace and name
pub trait FeatureSource: Send + Sync {
    /// The named Feature, or `None` if it does not exist
    fn get_feature(&self, namespace: &str, name: &str) -> Option<Arc<Feature>>;
}

impl DomainLister for Store<PublicDomain> {
    fn list_domains(&self, namespace: &str) -> Result<Vec<Arc<PublicDomain>>, Error> {
        Ok(self
            .state()
            .into_iter()
            .filter(|pd| pd.namespace().as_deref() == Some(namespace))
            .collect())
    }

    fn is_synced(&self) -> bool {
        matches!(self.wait_until_ready().now_or_never(), Some(Ok(())))
    }
}

impl<T: RoutingTarget> PublishedBindings for Store<T> {
    fn published_bindings(&self, namespace: &str) -> Vec<(String, Vec<String>)> {
        self.state()
            .into_iter()
            .filter(|t| t.namespace().as_deref() == Some(namespace) && !t.is_terminating())
            .filter_map(|t| t.bound_domains().map(|b| (t.name_any(), b.to_vec())))
            .collect()
    }
}

impl FeatureSource for Store<Feature> {
    fn get_feature(&self, namespace: &str, name: &str) -> Option<Arc<Feature>> {
        self.get(&ObjectRef::new(name).within(namespace))
    }
}

/// Fixed snapshot, for tests and one-shot tooling
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    /// Domains served by [`DomainLister`]
    pub domains: Vec<Arc<PublicDomain>>,
    /// Features served by [`FeatureSource`]
    pub features: Vec<Arc<Feature>>,
}

impl Snapshot {
    /// Build a snapshot from owned objects
    pub fn new(domains: Vec<PublicDomain>, features: Vec<Feature>) -> Self {
        Self {
            domains: domains.into_iter().map(Arc::new).collect(),
            features: features.into_iter().map(Arc::new).collect(),
        }
    }
}

impl DomainLister for Snapshot {
    fn list_domains(&self, namespace: &str) -> Result<Vec<Arc<PublicDomain>>, Error> {
        Ok(self
            .domains
            .iter()
            .filter(|pd| pd.namespace().as_deref() == Some(namespace))
            .cloned()
            .collect())
    }
}

impl FeatureSource for Snapshot {
    fn get_feature(&self, namespace: &str, name: &str) -> Option<Arc<Feature>> {
        self.features
            .iter()
            .find(|f| f.namespace().as_deref() == Some(namespace) && f.name_any() == name)
            .cloned()
    }
}
