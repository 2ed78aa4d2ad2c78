//! PublicDomain CRD
//!
//! Binds an externally reachable DNS name to a routing target by name. The
//! binding is a peer relation: neither side holds an object reference to the
//! other, and many domains may name the same target.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// PublicDomain exposes a routing target under a DNS name.
///
/// Example:
/// ```yaml
/// apiVersion: ridge.dev/v1
/// kind: PublicDomain
/// metadata:
///   name: d1
///   namespace: shop
/// spec:
///   domainName: example.com
///   targetName: web
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "ridge.dev",
    version = "v1",
    kind = "PublicDomain",
    namespaced,
    status = "PublicDomainStatus",
    printcolumn = r#"{"name":"Domain","type":"string","jsonPath":".spec.domainName"}"#,
    printcolumn = r#"{"name":"Target","type":"string","jsonPath":".spec.targetName"}"#,
    printcolumn = r#"{"name":"Endpoint","type":"string","jsonPath":".status.endpoint"}"#,
    printcolumn = r#"{"name":"Issuer","type":"string","jsonPath":".status.issuerName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PublicDomainSpec {
    /// Fully qualified DNS name, e.g. `example.com`
    pub domain_name: String,

    /// Name of the App or Router in the same namespace to bind to
    pub target_name: String,

    /// Skip certificate issuance for this domain
    #[serde(default)]
    pub disable_issuance: bool,
}

/// PublicDomain status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicDomainStatus {
    /// `https://` URL for the domain; unset while issuance is disabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Resolved cluster issuer; empty when no issuer is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_name: Option<String>,

    /// Secret that holds (or will hold) the issued certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretRef>,
}

/// Namespaced reference to a Secret
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    /// Secret namespace
    pub namespace: String,
    /// Secret name
    pub name: String,
}

impl PublicDomain {
    /// Whether the domain is pending deletion
    pub fn is_terminating(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Whether this domain binds to the target `name`
    pub fn binds_to(&self, name: &str) -> bool {
        !self.spec.target_name.is_empty() && self.spec.target_name == name
    }

    /// Whether `finalizer` is present in metadata
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers().iter().any(|f| f == finalizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_domain_yaml_defaults() {
        let yaml = r#"
apiVersion: ridge.dev/v1
kind: PublicDomain
metadata:
  name: d1
  namespace: shop
spec:
  domainName: example.com
  targetName: web
"#;
        let pd: PublicDomain = serde_yaml::from_str(yaml).expect("valid PublicDomain");
        assert_eq!(pd.spec.domain_name, "example.com");
        assert!(!pd.spec.disable_issuance);
        assert!(pd.binds_to("web"));
        assert!(!pd.binds_to("api"));
        assert!(pd.status.is_none());
    }

    #[test]
    fn empty_target_binds_nothing() {
        let pd = PublicDomain::new("d1", PublicDomainSpec::default());
        assert!(!pd.binds_to(""));
    }

    #[test]
    fn status_omits_unset_fields() {
        let status = PublicDomainStatus {
            endpoint: Some("https://example.com".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&status).expect("serialize");
        assert_eq!(json, serde_json::json!({ "endpoint": "https://example.com" }));
    }
}
