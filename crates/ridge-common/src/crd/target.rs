//! Routing targets: `App` and `Router`
//!
//! Both kinds can be named by a `PublicDomain` through `spec.targetName`.
//! Their only reconciled field is `status.publicDomains`, written by the
//! domain association syncer.

use std::fmt;

use k8s_openapi::NamespaceResourceScope;
use kube::{CustomResource, Resource, ResourceExt};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// An application that can receive traffic for public domains.
///
/// Example:
/// ```yaml
/// apiVersion: ridge.dev/v1
/// kind: App
/// metadata:
///   name: web
///   namespace: shop
/// spec:
///   description: storefront
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "ridge.dev",
    version = "v1",
    kind = "App",
    namespaced,
    status = "RoutingTargetStatus",
    printcolumn = r#"{"name":"Domains","type":"string","jsonPath":".status.publicDomains"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AppSpec {
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A router that fans traffic out to apps.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "ridge.dev",
    version = "v1",
    kind = "Router",
    namespaced,
    status = "RoutingTargetStatus",
    printcolumn = r#"{"name":"Domains","type":"string","jsonPath":".status.publicDomains"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RouterSpec {
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Observed state shared by both routing target kinds
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoutingTargetStatus {
    /// Domain names of the PublicDomains currently bound to this target
    #[serde(default)]
    pub public_domains: Vec<String>,
}

/// The closed set of routing target kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// [`App`]
    App,
    /// [`Router`]
    Router,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::App => write!(f, "App"),
            Self::Router => write!(f, "Router"),
        }
    }
}

/// Common view over [`App`] and [`Router`] for the domain association syncer
pub trait RoutingTarget:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + fmt::Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
    /// Which kind this is
    const TARGET_KIND: TargetKind;

    /// Currently published bound domains, if status has been written
    fn bound_domains(&self) -> Option<&[String]>;

    /// Whether the target is pending deletion
    fn is_terminating(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }

    /// `namespace/name` for logs and errors
    fn key(&self) -> String {
        format!(
            "{}/{}",
            self.namespace().unwrap_or_default(),
            self.name_any()
        )
    }
}

impl RoutingTarget for App {
    const TARGET_KIND: TargetKind = TargetKind::App;

    fn bound_domains(&self) -> Option<&[String]> {
        self.status.as_ref().map(|s| s.public_domains.as_slice())
    }
}

impl RoutingTarget for Router {
    const TARGET_KIND: TargetKind = TargetKind::Router;

    fn bound_domains(&self) -> Option<&[String]> {
        self.status.as_ref().map(|s| s.public_domains.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::api::ObjectMeta;

    #[test]
    fn app_yaml_parses() {
        let yaml = r#"
apiVersion: ridge.dev/v1
kind: App
metadata:
  name: web
  namespace: shop
spec:
  description: storefront
status:
  publicDomains: ["shop.example.com"]
"#;
        let app: App = serde_yaml::from_str(yaml).expect("valid App");
        assert_eq!(app.spec.description.as_deref(), Some("storefront"));
        assert_eq!(
            app.bound_domains(),
            Some(&["shop.example.com".to_string()][..])
        );
        assert_eq!(app.key(), "shop/web");
    }

    #[test]
    fn router_without_status_has_no_bound_domains() {
        let router = Router {
            metadata: ObjectMeta {
                name: Some("edge".to_string()),
                namespace: Some("shop".to_string()),
                ..Default::default()
            },
            spec: RouterSpec::default(),
            status: None,
        };
        assert_eq!(router.bound_domains(), None);
        assert!(!router.is_terminating());
        assert_eq!(Router::TARGET_KIND.to_string(), "Router");
    }

    #[test]
    fn deletion_timestamp_marks_terminating() {
        let app = App {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("shop".to_string()),
                deletion_timestamp: Some(Time(k8s_openapi::chrono::Utc::now())),
                ..Default::default()
            },
            spec: AppSpec::default(),
            status: None,
        };
        assert!(app.is_terminating());
    }
}
