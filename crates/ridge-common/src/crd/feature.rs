//! Feature CRD
//!
//! Optional integrations are toggled per namespace through `Feature` objects.
//! The issuer selection reads the feature named by convention (default
//! `letsencrypt`) and its `answers` map.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Feature toggles an optional integration and carries its parameters.
///
/// Example:
/// ```yaml
/// apiVersion: ridge.dev/v1
/// kind: Feature
/// metadata:
///   name: letsencrypt
///   namespace: shop
/// spec:
///   enabled: true
///   answers:
///     type: http
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "ridge.dev",
    version = "v1",
    kind = "Feature",
    namespaced,
    printcolumn = r#"{"name":"Enabled","type":"boolean","jsonPath":".spec.enabled"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSpec {
    /// Whether the integration is turned on
    #[serde(default = "super::default_true")]
    pub enabled: bool,

    /// Free-form parameters for the integration
    #[serde(default)]
    pub answers: BTreeMap<String, String>,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Feature {
    /// Look up a parameter, treating empty strings as unset
    pub fn answer(&self, key: &str) -> Option<&str> {
        self.spec
            .answers
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}
