//! Declarative store contract for owned objects
//!
//! [`ObjectStore`] is the narrow list/create/update/delete surface the
//! [`Applier`](crate::applier::Applier) needs. Reconcilers never write owned
//! objects through any other path.
//!
//! # Consistency
//!
//! Read-your-writes is NOT guaranteed. A `list` issued right after a `create`
//! may not contain the new object, and may still contain an object that was
//! just deleted. Callers must converge anyway: create tolerates an existing
//! object by falling back to update, and delete treats NotFound as done.

use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::discovery::ApiResource;
use kube::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::kube_utils::HasApiResource;
use crate::Error;

/// A synthesized object type that can be owned and garbage-collected.
pub trait OwnedObject:
    HasApiResource + Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Object metadata
    fn metadata(&self) -> &ObjectMeta;

    /// Mutable object metadata
    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    /// Structural comparison of everything the operator writes.
    ///
    /// Fields the store populates itself (uid, resourceVersion, timestamps,
    /// managedFields, status) must not take part.
    fn content_eq(&self, live: &Self) -> bool;

    /// Object name, empty if unset
    fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// Object namespace, empty if unset
    fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }
}

/// Store operations on one owned object type.
#[async_trait]
pub trait ObjectStore<T: OwnedObject>: Send + Sync {
    /// List objects in `namespace` matching an equality label selector
    async fn list(&self, namespace: &str, selector: &str) -> Result<Vec<T>, Error>;

    /// Create an object; fails with [`Error::Conflict`] if it already exists
    async fn create(&self, object: &T) -> Result<(), Error>;

    /// Overwrite the operator-owned fields of an existing object
    async fn update(&self, object: &T) -> Result<(), Error>;

    /// Delete an object; deleting a missing object succeeds
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

/// [`ObjectStore`] backed by the Kubernetes API through `DynamicObject`.
pub struct KubeObjectStore<T> {
    client: Client,
    api_resource: ApiResource,
    field_manager: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: OwnedObject> KubeObjectStore<T> {
    /// Create a store using the type's static API resource
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self::with_api_resource(client, T::api_resource(), field_manager)
    }

    /// Create a store with a discovered API resource (e.g. a different served version)
    pub fn with_api_resource(
        client: Client,
        api_resource: ApiResource,
        field_manager: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_resource,
            field_manager: field_manager.into(),
            _marker: PhantomData,
        }
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.api_resource)
    }

    /// Serialize with the apiVersion the server actually serves
    fn to_json(&self, object: &T) -> Result<serde_json::Value, Error> {
        let mut json = serde_json::to_value(object)
            .map_err(|e| Error::serialization_for_kind(T::KIND, e.to_string()))?;
        if let Some(obj) = json.as_object_mut() {
            obj.insert(
                "apiVersion".to_string(),
                serde_json::Value::String(self.api_resource.api_version.clone()),
            );
        }
        Ok(json)
    }

    fn map_write_error(object: &T, err: kube::Error) -> Error {
        match err {
            kube::Error::Api(ae) if ae.code == 409 => {
                Error::conflict(T::KIND, object.namespace(), object.name(), ae.message)
            }
            other => other.into(),
        }
    }
}

#[async_trait]
impl<T: OwnedObject> ObjectStore<T> for KubeObjectStore<T> {
    async fn list(&self, namespace: &str, selector: &str) -> Result<Vec<T>, Error> {
        let list = self
            .api(namespace)
            .list(&ListParams::default().labels(selector))
            .await?;

        list.items
            .into_iter()
            .map(|obj| {
                let json = serde_json::to_value(obj)?;
                serde_json::from_value(json)
                    .map_err(|e| Error::serialization_for_kind(T::KIND, e.to_string()))
            })
            .collect()
    }

    async fn create(&self, object: &T) -> Result<(), Error> {
        let obj: DynamicObject = serde_json::from_value(self.to_json(object)?)?;
        self.api(object.namespace())
            .create(&PostParams::default(), &obj)
            .await
            .map_err(|e| Self::map_write_error(object, e))?;
        debug!(kind = T::KIND, name = %object.name(), "created resource");
        Ok(())
    }

    async fn update(&self, object: &T) -> Result<(), Error> {
        let json = self.to_json(object)?;
        let params = PatchParams::apply(&self.field_manager).force();
        self.api(object.namespace())
            .patch(object.name(), &params, &Patch::Apply(&json))
            .await
            .map_err(|e| Self::map_write_error(object, e))?;
        debug!(kind = T::KIND, name = %object.name(), "updated resource");
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        match self.api(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                debug!(kind = T::KIND, name = %name, "deleted resource");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
