//! Owner-scoped desired-state applier
//!
//! Commits a complete desired object set for one owner and garbage-collects
//! whatever that owner previously had but no longer wants. Ownership is
//! recorded in labels scoped by a set id, so two reconcilers that own objects
//! for the same owner never delete each other's objects.
//!
//! Writes are ordered create/update first, deletes last. A failure part way
//! through leaves a superset of the desired set in the store, and because the
//! call is idempotent for identical input, retrying converges.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use tracing::{debug, info};

use crate::kube_utils::{deterministic_hash, label_selector};
use crate::store::{ObjectStore, OwnedObject};
use crate::Error;

/// Label carrying the reconciler set id
pub const SET_ID_LABEL: &str = "ridge.dev/set-id";
/// Label carrying a hash of the owner identity
pub const OWNER_LABEL: &str = "ridge.dev/owner";
/// Annotation with the owner's namespace (labels only hold the hash)
pub const OWNER_NAMESPACE_ANNOTATION: &str = "ridge.dev/owner-namespace";
/// Annotation with the owner's name
pub const OWNER_NAME_ANNOTATION: &str = "ridge.dev/owner-name";

/// Identity of the entity that owns a desired set
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnerKey {
    /// Owner apiVersion
    pub api_version: String,
    /// Owner kind
    pub kind: String,
    /// Owner namespace; owned objects live here too
    pub namespace: String,
    /// Owner name
    pub name: String,
    /// Owner uid, when known. Needed for an `ownerReference`.
    pub uid: Option<String>,
}

impl OwnerKey {
    /// Build the owner key for a namespaced Kubernetes resource
    pub fn of<K>(owner: &K) -> Result<Self, Error>
    where
        K: Resource<DynamicType = ()>,
    {
        let name = owner.name_any();
        let namespace = owner.namespace().ok_or_else(|| {
            Error::validation_for(&name, format!("{} is missing a namespace", K::kind(&())))
        })?;
        Ok(Self {
            api_version: K::api_version(&()).to_string(),
            kind: K::kind(&()).to_string(),
            namespace,
            name,
            uid: owner.uid(),
        })
    }

    /// Label value identifying this owner. Stable across renames of nothing
    /// but the owner's own identity.
    pub fn label_value(&self) -> String {
        deterministic_hash(&format!("{}/{}/{}", self.kind, self.namespace, self.name))
    }

    fn owner_reference(&self) -> Option<OwnerReference> {
        self.uid.as_ref().map(|uid| OwnerReference {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            uid: uid.clone(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        })
    }
}

/// Counts of the writes an apply performed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Objects created
    pub created: usize,
    /// Objects updated in place
    pub updated: usize,
    /// Objects garbage-collected
    pub deleted: usize,
    /// Objects already matching the desired state
    pub unchanged: usize,
}

impl ApplyOutcome {
    /// Total number of store writes
    pub fn writes(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// Identity used to diff live against desired
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ObjectKey {
    kind: &'static str,
    namespace: String,
    name: String,
}

impl ObjectKey {
    fn of<T: OwnedObject>(object: &T) -> Self {
        Self {
            kind: T::KIND,
            namespace: object.namespace().to_string(),
            name: object.name().to_string(),
        }
    }
}

/// Applies owner-scoped desired sets of `T` through an [`ObjectStore`].
pub struct Applier<T: OwnedObject> {
    store: Arc<dyn ObjectStore<T>>,
    set_id: String,
}

impl<T: OwnedObject> Applier<T> {
    /// Create an applier. `set_id` must be unique to the calling reconciler.
    pub fn new(store: Arc<dyn ObjectStore<T>>, set_id: impl Into<String>) -> Self {
        Self {
            store,
            set_id: set_id.into(),
        }
    }

    /// The set id this applier scopes ownership by
    pub fn set_id(&self) -> &str {
        &self.set_id
    }

    /// Label selector matching everything this applier owns for `owner`
    pub fn selector(&self, owner: &OwnerKey) -> String {
        let owner_label = owner.label_value();
        label_selector([
            (SET_ID_LABEL, self.set_id.as_str()),
            (OWNER_LABEL, owner_label.as_str()),
        ])
    }

    /// Make the live owned set for `owner` equal `desired`.
    ///
    /// An empty `desired` deletes everything the owner has. Any store error
    /// aborts the call; no rollback is attempted.
    pub async fn apply(
        &self,
        owner: &OwnerKey,
        desired: impl IntoIterator<Item = T>,
    ) -> Result<ApplyOutcome, Error> {
        let mut wanted: BTreeMap<ObjectKey, T> = BTreeMap::new();
        for object in desired {
            let object = self.stamp(owner, object)?;
            wanted.insert(ObjectKey::of(&object), object);
        }

        let mut live: BTreeMap<ObjectKey, T> = self
            .store
            .list(&owner.namespace, &self.selector(owner))
            .await?
            .into_iter()
            .map(|object| (ObjectKey::of(&object), object))
            .collect();

        let mut outcome = ApplyOutcome::default();

        for (key, object) in &wanted {
            match live.remove(key) {
                None => {
                    self.create_or_update(object).await?;
                    outcome.created += 1;
                }
                Some(current) if !object.content_eq(&current) => {
                    debug!(kind = key.kind, name = %key.name, "owned object drifted");
                    self.store.update(object).await?;
                    outcome.updated += 1;
                }
                Some(_) => outcome.unchanged += 1,
            }
        }

        for key in live.keys() {
            self.store.delete(&key.namespace, &key.name).await?;
            outcome.deleted += 1;
        }

        if outcome.writes() > 0 {
            info!(
                set_id = %self.set_id,
                owner = %format!("{}/{}", owner.namespace, owner.name),
                created = outcome.created,
                updated = outcome.updated,
                deleted = outcome.deleted,
                "applied desired set"
            );
        }
        Ok(outcome)
    }

    /// Create, falling back to update when the object already exists.
    ///
    /// The live listing may be stale, or the object may predate our labels.
    async fn create_or_update(&self, object: &T) -> Result<(), Error> {
        match self.store.create(object).await {
            Err(Error::Conflict { .. }) => {
                debug!(kind = T::KIND, name = %object.name(), "already exists, updating");
                self.store.update(object).await
            }
            other => other,
        }
    }

    /// Attach ownership labels, annotations, and owner reference.
    fn stamp(&self, owner: &OwnerKey, mut object: T) -> Result<T, Error> {
        if object.name().is_empty() {
            return Err(Error::validation_for(
                format!("{}/{}", owner.namespace, owner.name),
                format!("desired {} has no name", T::KIND),
            ));
        }

        let meta = object.metadata_mut();
        if meta.namespace.as_deref().map_or(true, str::is_empty) {
            meta.namespace = Some(owner.namespace.clone());
        } else if meta.namespace.as_deref() != Some(owner.namespace.as_str()) {
            return Err(Error::validation_for(
                format!("{}/{}", owner.namespace, owner.name),
                format!("desired {} must live in the owner's namespace", T::KIND),
            ));
        }

        let labels = meta.labels.get_or_insert_with(Default::default);
        labels.insert(SET_ID_LABEL.to_string(), self.set_id.clone());
        labels.insert(OWNER_LABEL.to_string(), owner.label_value());

        let annotations = meta.annotations.get_or_insert_with(Default::default);
        annotations.insert(
            OWNER_NAMESPACE_ANNOTATION.to_string(),
            owner.namespace.clone(),
        );
        annotations.insert(OWNER_NAME_ANNOTATION.to_string(), owner.name.clone());

        if let Some(reference) = owner.owner_reference() {
            meta.owner_references = Some(vec![reference]);
        }

        Ok(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::{Certificate, CertificateSpec, IssuerRef};
    use crate::testing::{InMemoryStore, StoreOp};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    const SET_ID: &str = "test-set";

    fn owner(name: &str) -> OwnerKey {
        OwnerKey {
            api_version: "ridge.dev/v1".to_string(),
            kind: "PublicDomain".to_string(),
            namespace: "shop".to_string(),
            name: name.to_string(),
            uid: Some(format!("uid-{name}")),
        }
    }

    fn cert(name: &str, dns: &str) -> Certificate {
        Certificate::new(
            ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            CertificateSpec {
                secret_name: name.to_string(),
                dns_names: vec![dns.to_string()],
                issuer_ref: IssuerRef::cluster_issuer("letsencrypt-http"),
            },
        )
    }

    fn setup() -> (Arc<InMemoryStore<Certificate>>, Applier<Certificate>) {
        let store = Arc::new(InMemoryStore::new());
        let applier = Applier::new(store.clone() as Arc<dyn ObjectStore<Certificate>>, SET_ID);
        (store, applier)
    }

    #[tokio::test]
    async fn creates_missing_objects_with_ownership() {
        let (store, applier) = setup();
        let outcome = applier
            .apply(&owner("d1"), vec![cert("shop-d1", "example.com")])
            .await
            .expect("apply succeeds");

        assert_eq!(outcome.created, 1);
        let live = store.get("shop", "shop-d1").expect("created");
        let labels = live.metadata.labels.as_ref().expect("labels");
        assert_eq!(labels.get(SET_ID_LABEL).map(String::as_str), Some(SET_ID));
        assert_eq!(labels.get(OWNER_LABEL), Some(&owner("d1").label_value()));
        let refs = live.metadata.owner_references.as_ref().expect("owner refs");
        assert_eq!(refs[0].name, "d1");
        assert_eq!(refs[0].uid, "uid-d1");
    }

    #[tokio::test]
    async fn second_apply_is_a_no_op() {
        let (store, applier) = setup();
        let desired = vec![cert("shop-d1", "example.com")];
        applier.apply(&owner("d1"), desired.clone()).await.unwrap();
        let writes = store.write_count();

        let outcome = applier.apply(&owner("d1"), desired).await.unwrap();
        assert_eq!(outcome.writes(), 0);
        assert_eq!(outcome.unchanged, 1);
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn drifted_objects_are_updated() {
        let (store, applier) = setup();
        applier
            .apply(&owner("d1"), vec![cert("shop-d1", "example.com")])
            .await
            .unwrap();

        let outcome = applier
            .apply(&owner("d1"), vec![cert("shop-d1", "example.org")])
            .await
            .unwrap();
        assert_eq!(outcome.updated, 1);
        assert_eq!(
            store.get("shop", "shop-d1").unwrap().spec.dns_names,
            vec!["example.org".to_string()]
        );
    }

    #[tokio::test]
    async fn empty_desired_set_deletes_everything_owned() {
        let (store, applier) = setup();
        applier
            .apply(&owner("d1"), vec![cert("shop-d1", "example.com")])
            .await
            .unwrap();

        let outcome = applier.apply(&owner("d1"), vec![]).await.unwrap();
        assert_eq!(outcome.deleted, 1);
        assert!(store.get("shop", "shop-d1").is_none());
    }

    #[tokio::test]
    async fn never_touches_other_owners_or_sets() {
        let (store, applier) = setup();
        applier
            .apply(&owner("d2"), vec![cert("shop-d2", "other.com")])
            .await
            .unwrap();
        let other_set = Applier::new(
            store.clone() as Arc<dyn ObjectStore<Certificate>>,
            "another-reconciler",
        );
        other_set
            .apply(&owner("d1"), vec![cert("shop-d1-extra", "example.com")])
            .await
            .unwrap();

        applier.apply(&owner("d1"), vec![]).await.unwrap();
        assert!(store.get("shop", "shop-d2").is_some());
        assert!(store.get("shop", "shop-d1-extra").is_some());
    }

    #[tokio::test]
    async fn stale_listing_converges_through_update() {
        let (store, applier) = setup();
        store.freeze_lists();
        applier
            .apply(&owner("d1"), vec![cert("shop-d1", "example.com")])
            .await
            .unwrap();

        // The frozen listing still misses shop-d1; create conflicts and falls back.
        let outcome = applier
            .apply(&owner("d1"), vec![cert("shop-d1", "example.com")])
            .await
            .unwrap();
        assert_eq!(outcome.created, 1);
        assert_eq!(store.count(StoreOp::Update), 1);
        assert_eq!(store.len(), 1);

        store.thaw_lists();
        let outcome = applier
            .apply(&owner("d1"), vec![cert("shop-d1", "example.com")])
            .await
            .unwrap();
        assert_eq!(outcome.writes(), 0);
    }

    #[tokio::test]
    async fn delete_failure_leaves_superset_and_retry_converges() {
        let (store, applier) = setup();
        applier
            .apply(
                &owner("d1"),
                vec![cert("shop-a", "a.com"), cert("shop-b", "b.com")],
            )
            .await
            .unwrap();

        store.fail_next(StoreOp::Delete);
        let err = applier
            .apply(&owner("d1"), vec![cert("shop-a", "a.com")])
            .await
            .expect_err("delete fails");
        assert!(err.is_transient());
        assert!(store.get("shop", "shop-a").is_some());
        assert!(store.get("shop", "shop-b").is_some());

        applier
            .apply(&owner("d1"), vec![cert("shop-a", "a.com")])
            .await
            .unwrap();
        assert!(store.get("shop", "shop-b").is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn rejects_unnamed_objects() {
        let (_, applier) = setup();
        let mut unnamed = cert("x", "a.com");
        unnamed.metadata.name = None;
        let err = applier.apply(&owner("d1"), vec![unnamed]).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn rejects_objects_outside_owner_namespace() {
        let (_, applier) = setup();
        let mut foreign = cert("shop-d1", "a.com");
        foreign.metadata.namespace = Some("elsewhere".to_string());
        let err = applier.apply(&owner("d1"), vec![foreign]).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn owner_key_without_uid_has_no_reference() {
        let mut key = owner("d1");
        key.uid = None;
        assert!(key.owner_reference().is_none());
    }

    #[test]
    fn selector_scopes_by_set_and_owner() {
        let (_, applier) = setup();
        let selector = applier.selector(&owner("d1"));
        assert!(selector.starts_with("ridge.dev/set-id=test-set,ridge.dev/owner="));
    }
}
