//! Routing target controller: keeps `status.publicDomains` in sync
//!
//! The same reconcile runs for both [`App`] and [`Router`]; the kind only
//! decides which API the status patch goes to.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use ridge_common::backoff::ErrorBackoff;
use ridge_common::cache::DomainLister;
use ridge_common::crd::{App, Router, RoutingTarget, TargetKind};
use ridge_common::Error;

pub use ridge_common::relations::bound_domains;

const FIELD_MANAGER: &str = "ridge-domain-syncer";

/// Default periodic resync for targets
pub const DEFAULT_RESYNC: Duration = Duration::from_secs(300);

/// Retry delay while the domain cache finishes its initial list
pub const CACHE_SYNC_RETRY: Duration = Duration::from_secs(1);

// =============================================================================
// Traits for dependency injection and testability
// =============================================================================

/// Kubernetes writes performed by the syncer
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TargetKubeClient: Send + Sync {
    /// Replace `status.publicDomains` on the given target
    async fn patch_bound_domains(
        &self,
        kind: TargetKind,
        namespace: &str,
        name: &str,
        domains: &[String],
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct TargetKubeClientImpl {
    client: Client,
}

impl TargetKubeClientImpl {
    /// Wrap a Kubernetes client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TargetKubeClient for TargetKubeClientImpl {
    async fn patch_bound_domains(
        &self,
        kind: TargetKind,
        namespace: &str,
        name: &str,
        domains: &[String],
    ) -> Result<(), Error> {
        let patch = serde_json::json!({ "status": { "publicDomains": domains } });
        let params = PatchParams::apply(FIELD_MANAGER);

        match kind {
            TargetKind::App => {
                let api: Api<App> = Api::namespaced(self.client.clone(), namespace);
                api.patch_status(name, &params, &Patch::Merge(&patch)).await?;
            }
            TargetKind::Router => {
                let api: Api<Router> = Api::namespaced(self.client.clone(), namespace);
                api.patch_status(name, &params, &Patch::Merge(&patch)).await?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Controller context
// =============================================================================

/// Shared context for the App and Router controllers
pub struct SyncerContext {
    /// Status writer
    pub kube: Arc<dyn TargetKubeClient>,
    /// Cached PublicDomains
    pub domains: Arc<dyn DomainLister>,
    /// Per-key retry backoff
    pub backoff: ErrorBackoff,
    /// Periodic resync interval
    pub resync: Duration,
}

impl SyncerContext {
    /// Create a context with default backoff and resync
    pub fn new(kube: Arc<dyn TargetKubeClient>, domains: Arc<dyn DomainLister>) -> Self {
        Self {
            kube,
            domains,
            backoff: ErrorBackoff::default(),
            resync: DEFAULT_RESYNC,
        }
    }

    /// Create a context writing through a real client
    pub fn from_client(client: Client, domains: Arc<dyn DomainLister>) -> Self {
        Self::new(Arc::new(TargetKubeClientImpl::new(client)), domains)
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
// Sync logic
// =============================================================================

/// Result of one sync pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Target is being deleted; left untouched
    Skipped,
    /// Published domains already matched
    Unchanged,
    /// Status was rewritten with these domains
    Updated(Vec<String>),
}

/// Recompute and publish the bound domains of one target.
///
/// On a cache error nothing is written and the error is returned for retry.
pub async fn sync_target<T: RoutingTarget>(
    target: &T,
    domains: &dyn DomainLister,
    kube: &dyn TargetKubeClient,
) -> Result<SyncOutcome, Error> {
    if target.is_terminating() {
        return Ok(SyncOutcome::Skipped);
    }

    let name = target.name_any();
    let namespace = target
        .namespace()
        .ok_or_else(|| Error::validation_for(&name, format!("{} missing namespace", T::TARGET_KIND)))?;

    let listed = domains.list_domains(&namespace)?;
    let desired = bound_domains(&name, &listed);

    if target.bound_domains() == Some(desired.as_slice()) {
        return Ok(SyncOutcome::Unchanged);
    }
    // An absent status and an empty binding are the same observable state
    if target.bound_domains().is_none() && desired.is_empty() {
        return Ok(SyncOutcome::Unchanged);
    }

    kube.patch_bound_domains(T::TARGET_KIND, &namespace, &name, &desired)
        .await?;
    Ok(SyncOutcome::Updated(desired))
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Reconcile an App or Router
#[instrument(skip(target, ctx), fields(kind = %T::TARGET_KIND, target = %target.name_any()))]
pub async fn reconcile<T: RoutingTarget>(
    target: Arc<T>,
    ctx: Arc<SyncerContext>,
) -> Result<Action, Error> {
    // An unsynced cache would read as "no domains" and wipe the status
    if !ctx.domains.is_synced() {
        debug!("domain cache still syncing");
        return Ok(Action::requeue(CACHE_SYNC_RETRY));
    }

    let outcome = sync_target(target.as_ref(), ctx.domains.as_ref(), ctx.kube.as_ref()).await?;
    ctx.backoff.reset(&backoff_key(target.as_ref()));

    match outcome {
        SyncOutcome::Skipped => {
            debug!("target terminating, skipping");
            Ok(Action::await_change())
        }
        SyncOutcome::Unchanged => {
            debug!("bound domains up to date");
            Ok(Action::requeue(ctx.resync))
        }
        SyncOutcome::Updated(domains) => {
            info!(domains = ?domains, "published bound domains");
            Ok(Action::requeue(ctx.resync))
        }
    }
}

/// Backoff key; Apps and Routers may share a name, so the kind is included
fn backoff_key<T: RoutingTarget>(target: &T) -> String {
    format!("{}/{}", T::TARGET_KIND, target.key())
}

/// Error policy: requeue with per-key exponential backoff
pub fn error_policy<T: RoutingTarget>(
    target: Arc<T>,
    error: &Error,
    ctx: Arc<SyncerContext>,
) -> Action {
    let key = target.key();
    let delay = ctx.backoff.next_delay(&backoff_key(target.as_ref()));
    warn!(
        ?error,
        kind = %T::TARGET_KIND,
        target = %key,
        transient = error.is_transient(),
        retry_in = ?delay,
        "bound domain sync failed"
    );
    Action::requeue(delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::api::ObjectMeta;
    use mockall::predicate::*;
    use ridge_common::cache::Snapshot;
    use ridge_common::crd::{AppSpec, PublicDomain, PublicDomainSpec, RouterSpec, RoutingTargetStatus};

    // =========================================================================
    // Test Fixtures
    // =========================================================================

    fn meta(ns: &str, name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(ns.to_string()),
            ..Default::default()
        }
    }

    fn terminating(mut meta: ObjectMeta) -> ObjectMeta {
        meta.deletion_timestamp = Some(Time(k8s_openapi::chrono::Utc::now()));
        meta
    }

    fn app(name: &str, bound: Option<Vec<&str>>) -> App {
        App {
            metadata: meta("shop", name),
            spec: AppSpec::default(),
            status: bound.map(|b| RoutingTargetStatus {
                public_domains: b.into_iter().map(String::from).collect(),
            }),
        }
    }

    fn router(name: &str) -> Router {
        Router {
            metadata: meta("shop", name),
            spec: RouterSpec::default(),
            status: None,
        }
    }

    fn domain(ns: &str, name: &str, dns: &str, target: &str) -> PublicDomain {
        PublicDomain {
            metadata: meta(ns, name),
            spec: PublicDomainSpec {
                domain_name: dns.to_string(),
                target_name: target.to_string(),
                disable_issuance: false,
            },
            status: None,
        }
    }

    fn snapshot(domains: Vec<PublicDomain>) -> Arc<Snapshot> {
        Arc::new(Snapshot::new(domains, vec![]))
    }

    // =========================================================================
    // Sync story tests
    // =========================================================================

    /// Story: a new domain pointing at an app shows up in the app's status
    #[tokio::test]
    async fn story_new_domain_is_published_on_app() {
        let mut kube = MockTargetKubeClient::new();
        kube.expect_patch_bound_domains()
            .with(
                eq(TargetKind::App),
                eq("shop"),
                eq("web"),
                eq(vec!["example.com".to_string()]),
            )
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let lister = snapshot(vec![domain("shop", "d1", "example.com", "web")]);
        let outcome = sync_target(&app("web", None), lister.as_ref(), &kube)
            .await
            .expect("sync succeeds");
        assert_eq!(outcome, SyncOutcome::Updated(vec!["example.com".to_string()]));
    }

    /// Story: routers are patched through the Router API
    #[tokio::test]
    async fn story_router_is_patched_as_router() {
        let mut kube = MockTargetKubeClient::new();
        kube.expect_patch_bound_domains()
            .with(eq(TargetKind::Router), eq("shop"), eq("edge"), always())
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let lister = snapshot(vec![domain("shop", "d1", "example.com", "edge")]);
        sync_target(&router("edge"), lister.as_ref(), &kube)
            .await
            .expect("sync succeeds");
    }

    /// Story: re-running with unchanged inputs writes nothing
    #[tokio::test]
    async fn story_unchanged_inputs_do_not_write() {
        let mut kube = MockTargetKubeClient::new();
        kube.expect_patch_bound_domains().times(0);

        let lister = snapshot(vec![domain("shop", "d1", "example.com", "web")]);
        let outcome = sync_target(&app("web", Some(vec!["example.com"])), lister.as_ref(), &kube)
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Unchanged);

        let outcome = sync_target(&app("api", None), lister.as_ref(), &kube)
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Unchanged);
    }

    /// Story: removing the last domain clears the published list
    #[tokio::test]
    async fn story_unbinding_clears_status() {
        let mut kube = MockTargetKubeClient::new();
        kube.expect_patch_bound_domains()
            .withf(|_, _, _, domains| domains.is_empty())
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let lister = snapshot(vec![]);
        let outcome = sync_target(&app("web", Some(vec!["example.com"])), lister.as_ref(), &kube)
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Updated(vec![]));
    }

    /// Story: a terminating target is left alone
    #[tokio::test]
    async fn story_terminating_target_is_skipped() {
        let mut kube = MockTargetKubeClient::new();
        kube.expect_patch_bound_domains().times(0);

        let mut target = app("web", None);
        target.metadata = terminating(target.metadata);
        let lister = snapshot(vec![domain("shop", "d1", "example.com", "web")]);
        let outcome = sync_target(&target, lister.as_ref(), &kube).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Skipped);
    }

    /// Story: domains in other namespaces never bind
    #[tokio::test]
    async fn story_other_namespaces_are_ignored() {
        let mut kube = MockTargetKubeClient::new();
        kube.expect_patch_bound_domains().times(0);

        let lister = snapshot(vec![domain("blog", "d1", "example.com", "web")]);
        let outcome = sync_target(&app("web", None), lister.as_ref(), &kube)
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Unchanged);
    }

    struct FailingLister;

    impl DomainLister for FailingLister {
        fn list_domains(&self, _: &str) -> Result<Vec<Arc<PublicDomain>>, Error> {
            Err(Error::store("list", "cache unavailable"))
        }
    }

    /// Story: a cache failure leaves status untouched and surfaces a transient error
    #[tokio::test]
    async fn story_cache_failure_is_retried() {
        let mut kube = MockTargetKubeClient::new();
        kube.expect_patch_bound_domains().times(0);
        let ctx = Arc::new(SyncerContext::new(Arc::new(kube), Arc::new(FailingLister)));

        let target = Arc::new(app("web", Some(vec!["example.com"])));
        let err = reconcile(target.clone(), ctx.clone())
            .await
            .expect_err("list fails");
        assert!(err.is_transient());

        let action = error_policy(target.clone(), &err, ctx.clone());
        assert_eq!(action, Action::requeue(Duration::from_secs(5)));
        let action = error_policy(target, &err, ctx);
        assert_eq!(action, Action::requeue(Duration::from_secs(10)));
    }

    /// Story: a successful reconcile resets the backoff
    #[tokio::test]
    async fn story_success_resets_backoff() {
        let mut kube = MockTargetKubeClient::new();
        kube.expect_patch_bound_domains()
            .returning(|_, _, _, _| Ok(()));
        let ctx = Arc::new(SyncerContext::new(
            Arc::new(kube),
            snapshot(vec![domain("shop", "d1", "example.com", "web")]),
        ));
        let target = Arc::new(app("web", None));
        ctx.backoff.next_delay(&backoff_key(target.as_ref()));

        let action = reconcile(target.clone(), ctx.clone()).await.unwrap();
        assert_eq!(action, Action::requeue(DEFAULT_RESYNC));
        assert_eq!(ctx.backoff.failures(&backoff_key(target.as_ref())), 0);
    }

    /// Story: an App and a Router with the same name back off independently
    #[tokio::test]
    async fn story_same_name_targets_do_not_share_backoff() {
        let ctx = Arc::new(SyncerContext::new(
            Arc::new(MockTargetKubeClient::new()),
            Arc::new(FailingLister),
        ));
        let err = Error::store("list", "cache unavailable");

        let web_app = Arc::new(app("web", None));
        error_policy(web_app.clone(), &err, ctx.clone());
        error_policy(web_app, &err, ctx.clone());

        let web_router = Arc::new(router("web"));
        let action = error_policy(web_router, &err, ctx);
        assert_eq!(action, Action::requeue(Duration::from_secs(5)));
    }

    struct SyncingLister;

    impl DomainLister for SyncingLister {
        fn list_domains(&self, _: &str) -> Result<Vec<Arc<PublicDomain>>, Error> {
            Ok(Vec::new())
        }

        fn is_synced(&self) -> bool {
            false
        }
    }

    /// Story: an unsynced cache never clears a published list
    #[tokio::test]
    async fn story_unsynced_cache_defers_without_writing() {
        let mut kube = MockTargetKubeClient::new();
        kube.expect_patch_bound_domains().times(0);
        let ctx = Arc::new(SyncerContext::new(Arc::new(kube), Arc::new(SyncingLister)));

        let target = Arc::new(app("web", Some(vec!["example.com"])));
        let action = reconcile(target.clone(), ctx.clone()).await.unwrap();
        assert_eq!(action, Action::requeue(CACHE_SYNC_RETRY));
        assert_eq!(ctx.backoff.failures(&backoff_key(target.as_ref())), 0);
    }

    /// Story: a failed status write is surfaced for retry
    #[tokio::test]
    async fn story_patch_failure_propagates() {
        let mut kube = MockTargetKubeClient::new();
        kube.expect_patch_bound_domains()
            .returning(|_, _, _, _| Err(Error::store("patch", "connection refused")));

        let lister = snapshot(vec![domain("shop", "d1", "example.com", "web")]);
        let err = sync_target(&app("web", None), lister.as_ref(), &kube)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
