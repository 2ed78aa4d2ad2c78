//! cert-manager Certificate types
//!
//! Only the fields the certificate synthesizer writes are modelled. The
//! operator talks to cert-manager through `DynamicObject`, so this type carries
//! its own apiVersion/kind constants instead of a generated `kube::Resource`.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

use crate::kube_utils::HasApiResource;
use crate::store::OwnedObject;

/// cert-manager API group
pub const CERT_MANAGER_GROUP: &str = "cert-manager.io";

/// Issuer kind used for all synthesized certificates
pub const CLUSTER_ISSUER_KIND: &str = "ClusterIssuer";

/// Annotation naming the ingress cert-manager edits to answer HTTP-01
/// challenges for this Certificate. The v1 API has no per-certificate solver
/// config, so the override travels in metadata.
pub const HTTP01_INGRESS_ANNOTATION: &str = "acme.cert-manager.io/http01-override-ingress-name";

/// cert-manager Certificate resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    /// API version (cert-manager.io/v1)
    #[serde(default = "Certificate::default_api_version")]
    pub api_version: String,
    /// Resource kind (Certificate)
    #[serde(default = "Certificate::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Certificate specification
    pub spec: CertificateSpec,
}

impl HasApiResource for Certificate {
    const API_VERSION: &'static str = "cert-manager.io/v1";
    const KIND: &'static str = "Certificate";
}

impl Certificate {
    /// Create a new Certificate
    pub fn new(metadata: ObjectMeta, spec: CertificateSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }

    fn default_api_version() -> String {
        <Self as HasApiResource>::API_VERSION.to_string()
    }

    fn default_kind() -> String {
        <Self as HasApiResource>::KIND.to_string()
    }
}

impl OwnedObject for Certificate {
    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn content_eq(&self, live: &Self) -> bool {
        self.spec == live.spec
            && self.metadata.labels == live.metadata.labels
            && self.metadata.annotations == live.metadata.annotations
            && self.metadata.owner_references == live.metadata.owner_references
    }
}

/// Certificate spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    /// Name of the Secret to store the certificate
    pub secret_name: String,
    /// DNS names for the certificate
    pub dns_names: Vec<String>,
    /// Reference to the issuer
    pub issuer_ref: IssuerRef,
}

/// Issuer reference for Certificate
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssuerRef {
    /// Issuer name
    pub name: String,
    /// Issuer kind (Issuer or ClusterIssuer)
    pub kind: String,
    /// API group (cert-manager.io)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl IssuerRef {
    /// Reference a cert-manager ClusterIssuer by name
    pub fn cluster_issuer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: CLUSTER_ISSUER_KIND.to_string(),
            group: Some(CERT_MANAGER_GROUP.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Certificate {
        Certificate::new(
            ObjectMeta {
                name: Some("shop-d1".to_string()),
                namespace: Some("shop".to_string()),
                annotations: Some(
                    [(HTTP01_INGRESS_ANNOTATION.to_string(), "d1-abcde".to_string())].into(),
                ),
                ..Default::default()
            },
            CertificateSpec {
                secret_name: "shop-d1".to_string(),
                dns_names: vec!["example.com".to_string()],
                issuer_ref: IssuerRef::cluster_issuer("letsencrypt-http"),
            },
        )
    }

    #[test]
    fn serializes_with_cert_manager_field_names() {
        let json = serde_json::to_value(sample()).expect("serialize");
        assert_eq!(json["apiVersion"], "cert-manager.io/v1");
        assert_eq!(json["kind"], "Certificate");
        assert_eq!(json["spec"]["secretName"], "shop-d1");
        assert_eq!(json["spec"]["dnsNames"][0], "example.com");
        assert_eq!(json["spec"]["issuerRef"]["kind"], "ClusterIssuer");
        assert_eq!(
            json["metadata"]["annotations"][HTTP01_INGRESS_ANNOTATION],
            "d1-abcde"
        );
    }

    #[test]
    fn spec_only_carries_v1_fields() {
        let json = serde_json::to_value(sample()).expect("serialize");
        let mut keys: Vec<&str> = json["spec"]
            .as_object()
            .expect("spec object")
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["dnsNames", "issuerRef", "secretName"]);
    }

    #[test]
    fn content_eq_ignores_store_populated_fields() {
        let desired = sample();
        let mut live = sample();
        live.metadata.resource_version = Some("42".to_string());
        live.metadata.uid = Some("uid-1".to_string());
        assert!(desired.content_eq(&live));

        live.spec.dns_names = vec!["example.org".to_string()];
        assert!(!desired.content_eq(&live));

        let mut moved = sample();
        moved.metadata.annotations = None;
        assert!(!desired.content_eq(&moved));
    }
}
