//! PublicDomain controller for certificate issuance
//!
//! Each reconcile recomputes the domain's status and desired Certificate set
//! from scratch and hands the set to the owner-scoped applier, which creates,
//! updates, or garbage-collects Certificates as needed. A finalizer keeps the
//! domain around until its Certificates are gone.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use ridge_common::applier::{Applier, OwnerKey};
use ridge_common::backoff::ErrorBackoff;
use ridge_common::certificate::Certificate;
use ridge_common::crd::{PublicDomain, PublicDomainStatus};
use ridge_common::store::{KubeObjectStore, ObjectStore};
use ridge_common::Error;

use crate::features::FeatureCache;
use crate::synthesizer::synthesize;

/// Finalizer held on every PublicDomain until its Certificates are deleted
pub const FINALIZER: &str = "ridge.dev/publicdomain-certificates";

/// Set id scoping Certificates owned by this controller
pub const CERTIFICATE_SET_ID: &str = "publicdomain-certificates";

const FIELD_MANAGER: &str = "ridge-certificates";

/// Default periodic resync for domains
pub const DEFAULT_RESYNC: Duration = Duration::from_secs(300);

// =============================================================================
// Traits for dependency injection and testability
// =============================================================================

/// PublicDomain writes performed by the controller
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DomainKubeClient: Send + Sync {
    /// Replace the PublicDomain status. Unset fields are cleared.
    async fn patch_domain_status(
        &self,
        namespace: &str,
        name: &str,
        status: &PublicDomainStatus,
    ) -> Result<(), Error>;

    /// Add a finalizer if missing
    async fn add_finalizer(&self, namespace: &str, name: &str, finalizer: &str)
        -> Result<(), Error>;

    /// Remove a finalizer; a missing domain is not an error
    async fn remove_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct DomainKubeClientImpl {
    client: Client,
}

impl DomainKubeClientImpl {
    /// Wrap a Kubernetes client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<PublicDomain> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn patch_finalizers(
        &self,
        namespace: &str,
        name: &str,
        finalizers: Vec<String>,
    ) -> Result<(), Error> {
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        self.api(namespace)
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DomainKubeClient for DomainKubeClientImpl {
    async fn patch_domain_status(
        &self,
        namespace: &str,
        name: &str,
        status: &PublicDomainStatus,
    ) -> Result<(), Error> {
        // Explicit nulls so a merge patch clears fields that became unset
        let patch = serde_json::json!({
            "status": {
                "endpoint": status.endpoint,
                "issuerName": status.issuer_name,
                "secretRef": status.secret_ref,
            }
        });
        self.api(namespace)
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn add_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        // Get current domain to read existing finalizers
        let domain = self.api(namespace).get(name).await?;
        let mut finalizers = domain.metadata.finalizers.unwrap_or_default();
        if finalizers.iter().any(|f| f == finalizer) {
            return Ok(());
        }
        finalizers.push(finalizer.to_string());
        self.patch_finalizers(namespace, name, finalizers).await
    }

    async fn remove_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let Some(domain) = self.api(namespace).get_opt(name).await? else {
            return Ok(());
        };
        let finalizers: Vec<String> = domain
            .metadata
            .finalizers
            .unwrap_or_default()
            .into_iter()
            .filter(|f| f != finalizer)
            .collect();
        self.patch_finalizers(namespace, name, finalizers).await
    }
}

// =============================================================================
// Controller context
// =============================================================================

/// Shared context for the PublicDomain controller
pub struct CertContext {
    /// PublicDomain writer
    pub kube: Arc<dyn DomainKubeClient>,
    /// Issuer selection per namespace
    pub features: FeatureCache,
    /// Owner-scoped applier for Certificates
    pub applier: Applier<Certificate>,
    /// Per-key retry backoff
    pub backoff: ErrorBackoff,
    /// Periodic resync interval
    pub resync: Duration,
}

impl CertContext {
    /// Create a context committing Certificates through `store`
    pub fn new(
        kube: Arc<dyn DomainKubeClient>,
        features: FeatureCache,
        store: Arc<dyn ObjectStore<Certificate>>,
    ) -> Self {
        Self {
            kube,
            features,
            applier: Applier::new(store, CERTIFICATE_SET_ID),
            backoff: ErrorBackoff::default(),
            resync: DEFAULT_RESYNC,
        }
    }

    /// Create a context backed by a real client
    pub fn from_client(client: Client, features: FeatureCache) -> Self {
        Self::new(
            Arc::new(DomainKubeClientImpl::new(client.clone())),
            features,
            Arc::new(KubeObjectStore::<Certificate>::new(client, FIELD_MANAGER)),
        )
    }

    /// Override the retry backoff
    pub fn with_backoff(mut self, backoff: ErrorBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Override the resync interval
    pub fn with_resync(mut self, resync: Duration) -> Self {
        self.resync = resync;
        self
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

fn domain_key(domain: &PublicDomain) -> String {
    format!(
        "{}/{}",
        domain.namespace().unwrap_or_default(),
        domain.name_any()
    )
}

/// Reconcile a PublicDomain: synthesize, apply, publish status.
///
/// The status is written even when the apply fails, so the endpoint and
/// secret ref appear as soon as they are known. The apply error is returned
/// afterwards for retry.
#[instrument(
    skip(domain, ctx),
    fields(domain = %domain.name_any(), namespace = %domain.namespace().unwrap_or_default())
)]
pub async fn reconcile(domain: Arc<PublicDomain>, ctx: Arc<CertContext>) -> Result<Action, Error> {
    let name = domain.name_any();
    let owner = OwnerKey::of(domain.as_ref())?;
    let namespace = owner.namespace.clone();

    if domain.is_terminating() {
        return handle_deletion(&domain, &owner, &ctx).await;
    }

    if !domain.has_finalizer(FINALIZER) {
        info!("adding certificate finalizer");
        ctx.kube.add_finalizer(&namespace, &name, FINALIZER).await?;
    }

    let selection = ctx.features.selection(&namespace);
    let synthesis = synthesize(&domain, &selection)?;
    debug!(?selection, desired = synthesis.desired().len(), "synthesized certificates");

    let applied = ctx.applier.apply(&owner, synthesis.desired()).await;

    let current = domain.status.clone().unwrap_or_default();
    if current != synthesis.status {
        info!(
            endpoint = ?synthesis.status.endpoint,
            issuer = ?synthesis.status.issuer_name,
            "updating public domain status"
        );
        ctx.kube
            .patch_domain_status(&namespace, &name, &synthesis.status)
            .await?;
    }

    let outcome = applied?;
    debug!(?outcome, "certificates applied");

    ctx.backoff.reset(&domain_key(&domain));
    Ok(Action::requeue(ctx.resync))
}

/// Delete everything the domain owns, then release the finalizer
async fn handle_deletion(
    domain: &PublicDomain,
    owner: &OwnerKey,
    ctx: &CertContext,
) -> Result<Action, Error> {
    if !domain.has_finalizer(FINALIZER) {
        debug!("domain deleting without finalizer, nothing to do");
        ctx.backoff.reset(&domain_key(domain));
        return Ok(Action::await_change());
    }

    let outcome = ctx.applier.apply(owner, Vec::new()).await?;
    info!(deleted = outcome.deleted, "released certificates for deleted domain");

    ctx.kube
        .remove_finalizer(&owner.namespace, &owner.name, FINALIZER)
        .await?;
    ctx.backoff.reset(&domain_key(domain));
    Ok(Action::await_change())
}

/// Error policy: requeue with per-key exponential backoff
pub fn error_policy(domain: Arc<PublicDomain>, error: &Error, ctx: Arc<CertContext>) -> Action {
    let key = domain_key(&domain);
    let delay = ctx.backoff.next_delay(&key);
    warn!(
        ?error,
        domain = %key,
        transient = error.is_transient(),
        retry_in = ?delay,
        "public domain reconcile failed"
    );
    Action::requeue(delay)
}
