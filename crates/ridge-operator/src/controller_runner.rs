//! Controller runner - builds the reflector and controller futures
//!
//! Each `build_*` function returns a Vec of boxed futures that can be composed
//! by the caller. Controllers wait for the shared caches to sync before they
//! start reconciling, so the first pass never sees an empty domain list. The
//! App and Router controllers also carry a private domain reflector; until it
//! has synced, their reconciles requeue instead of writing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::watcher::{self, Config as WatcherConfig};
use kube::runtime::{Controller, WatchStreamExt};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;

use ridge_certs::{CertContext, FeatureCache};
use ridge_common::crd::{App, Feature, PublicDomain, Router, RoutingTarget};
use ridge_common::relations::{RelationIndex, WatchedObject};
use ridge_common::WATCH_TIMEOUT_SECS;
use ridge_domains::SyncerContext;

use crate::config::Config;

/// A future driving one reflector or controller
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

/// Api scoped to the configured namespace, or cluster-wide
fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Read handles on the shared caches
#[derive(Clone)]
pub struct Caches {
    /// All watched PublicDomains
    pub domains: Store<PublicDomain>,
    /// All watched Features
    pub features: Store<Feature>,
}

impl Caches {
    /// Wait until both reflectors have completed their initial list
    pub async fn wait_until_ready(&self) -> bool {
        self.domains.wait_until_ready().await.is_ok() && self.features.wait_until_ready().await.is_ok()
    }

    fn relation_index(&self, config: &Config) -> RelationIndex {
        RelationIndex::new(Arc::new(self.domains.clone()), config.feature_name.clone())
    }
}

fn spawn_reflector<K>(api: Api<K>, name: &'static str) -> (Store<K>, ControllerFuture)
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + std::fmt::Debug + Send + Sync + 'static,
{
    let (reader, writer) = reflector::store();
    let stream = reflector::reflector(writer, watcher::watcher(api, watcher_config()))
        .default_backoff()
        .applied_objects()
        .for_each(move |event| {
            if let Err(e) = event {
                tracing::warn!(error = %e, cache = name, "reflector watch error");
            }
            std::future::ready(())
        });
    (reader, Box::pin(stream))
}

/// Build the shared PublicDomain and Feature caches
pub fn build_caches(client: &Client, config: &Config) -> (Caches, Vec<ControllerFuture>) {
    let namespace = config.namespace.as_deref();
    let (domains, domain_reflector) =
        spawn_reflector(scoped_api::<PublicDomain>(client, namespace), "PublicDomain");
    let (features, feature_reflector) =
        spawn_reflector(scoped_api::<Feature>(client, namespace), "Feature");

    (
        Caches { domains, features },
        vec![domain_reflector, feature_reflector],
    )
}

/// Routing targets to re-sync when a PublicDomain changes
pub fn targets_of<K>(index: &RelationIndex, domain: &PublicDomain) -> Vec<ObjectRef<K>>
where
    K: Resource<DynamicType = ()>,
{
    index
        .resolve(WatchedObject::PublicDomain(domain))
        .iter()
        .map(|key| key.object_ref())
        .collect()
}

/// PublicDomains to re-synthesize when a Feature changes
pub fn domains_of(index: &RelationIndex, feature: &Feature) -> Vec<ObjectRef<PublicDomain>> {
    index
        .resolve(WatchedObject::Feature(feature))
        .iter()
        .map(|key| key.object_ref())
        .collect()
}

/// Build the App and Router bound-domain controllers
pub fn build_domain_controllers(
    client: Client,
    config: &Config,
    caches: &Caches,
) -> Vec<ControllerFuture> {
    let controllers = vec![
        build_target_controller::<App>(client.clone(), config, caches, "App"),
        build_target_controller::<Router>(client, config, caches, "Router"),
    ];

    tracing::info!("- App controller");
    tracing::info!("- Router controller");

    controllers
}

/// One bound-domain controller for target kind `T`.
///
/// The controller owns a PublicDomain reflector: the same stream fills the
/// cache its reconciler reads and triggers its reconciles, so a trigger is
/// only seen after the cache holds the change. Its own target store lets the
/// relation index find targets still publishing a domain that moved away.
fn build_target_controller<T: RoutingTarget>(
    client: Client,
    config: &Config,
    caches: &Caches,
    name: &'static str,
) -> ControllerFuture {
    let namespace = config.namespace.as_deref();
    let (domains, writer) = reflector::store::<PublicDomain>();
    let domain_events = reflector::reflector(
        writer,
        watcher::watcher(scoped_api::<PublicDomain>(&client, namespace), watcher_config()),
    )
    .default_backoff()
    .touched_objects();

    let controller = Controller::new(scoped_api::<T>(&client, namespace), watcher_config());
    let index = RelationIndex::new(Arc::new(domains.clone()), config.feature_name.clone())
        .with_published(Arc::new(controller.store()));
    let ctx = Arc::new(
        SyncerContext::from_client(client, Arc::new(domains))
            .with_backoff(config.backoff())
            .with_resync(config.resync()),
    );

    let controller = controller
        .watches_stream(domain_events, move |domain| targets_of::<T>(&index, &domain))
        .shutdown_on_signal()
        .run(
            ridge_domains::reconcile::<T>,
            ridge_domains::error_policy::<T>,
            ctx,
        )
        .for_each(log_reconcile_result(name));

    gated(caches.clone(), controller)
}

/// Build the PublicDomain certificate controller
pub fn build_certificate_controllers(
    client: Client,
    config: &Config,
    caches: &Caches,
) -> Vec<ControllerFuture> {
    let namespace = config.namespace.as_deref();
    let features = FeatureCache::new(
        Arc::new(caches.features.clone()),
        config.feature_name.clone(),
        config.issuer_type_key.clone(),
    );
    let ctx = Arc::new(
        CertContext::from_client(client.clone(), features)
            .with_backoff(config.backoff())
            .with_resync(config.resync()),
    );

    let index = caches.relation_index(config);
    let domain_ctrl = Controller::new(
        scoped_api::<PublicDomain>(&client, namespace),
        watcher_config(),
    )
    .watches(
        scoped_api::<Feature>(&client, namespace),
        watcher_config(),
        move |feature| domains_of(&index, &feature),
    )
    .shutdown_on_signal()
    .run(ridge_certs::reconcile, ridge_certs::error_policy, ctx)
    .for_each(log_reconcile_result("PublicDomain"));

    tracing::info!("- PublicDomain certificate controller");

    vec![gated(caches.clone(), domain_ctrl)]
}

/// Hold a controller back until the caches have synced
fn gated<F>(caches: Caches, controller: F) -> ControllerFuture
where
    F: Future<Output = ()> + Send + 'static,
{
    Box::pin(async move {
        if !caches.wait_until_ready().await {
            tracing::error!("cache writer dropped before sync, controller not started");
            return;
        }
        controller.await
    })
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
