//! Feature configuration cache: the issuer selection of each namespace
//!
//! A read-only projection over the Feature reflector. Only the Feature named
//! by convention (default `letsencrypt`) is consulted, and one that is missing
//! or disabled means issuance is unavailable in that namespace. Neither case
//! is an error.

use std::sync::Arc;

use tracing::trace;

use ridge_common::cache::FeatureSource;
use ridge_common::{DEFAULT_ISSUER_FEATURE, DEFAULT_ISSUER_TYPE_KEY};

use crate::issuers::issuer_name_for_type;

/// Issuer configuration in effect for one namespace
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IssuerSelection {
    /// No enabled issuer Feature exists
    Unavailable,
    /// The Feature exists and names an issuer type (possibly empty or unknown)
    Configured {
        /// Raw value of the issuer type answer; empty when unset
        issuer_type: String,
    },
}

impl IssuerSelection {
    /// Concrete cluster issuer, if the selection maps to a known one
    pub fn issuer_name(&self) -> Option<&'static str> {
        match self {
            Self::Unavailable => None,
            Self::Configured { issuer_type } => issuer_name_for_type(issuer_type),
        }
    }
}

/// Looks up the issuer selection per namespace
#[derive(Clone)]
pub struct FeatureCache {
    source: Arc<dyn FeatureSource>,
    feature_name: String,
    type_key: String,
}

impl FeatureCache {
    /// Create a cache reading `feature_name` and its `type_key` answer
    pub fn new(
        source: Arc<dyn FeatureSource>,
        feature_name: impl Into<String>,
        type_key: impl Into<String>,
    ) -> Self {
        Self {
            source,
            feature_name: feature_name.into(),
            type_key: type_key.into(),
        }
    }

    /// Cache with the conventional feature name and answer key
    pub fn with_defaults(source: Arc<dyn FeatureSource>) -> Self {
        Self::new(source, DEFAULT_ISSUER_FEATURE, DEFAULT_ISSUER_TYPE_KEY)
    }

    /// Name of the Feature this cache reads
    pub fn feature_name(&self) -> &str {
        &self.feature_name
    }

    /// Issuer selection currently in effect in `namespace`
    pub fn selection(&self, namespace: &str) -> IssuerSelection {
        let Some(feature) = self.source.get_feature(namespace, &self.feature_name) else {
            trace!(namespace, feature = %self.feature_name, "issuer feature not found");
            return IssuerSelection::Unavailable;
        };
        if !feature.spec.enabled {
            trace!(namespace, feature = %self.feature_name, "issuer feature disabled");
            return IssuerSelection::Unavailable;
        }

        IssuerSelection::Configured {
            issuer_type: feature.answer(&self.type_key).unwrap_or_default().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridge_common::cache::Snapshot;
    use ridge_common::crd::{Feature, FeatureSpec};

    fn feature(ns: &str, name: &str, enabled: bool, answers: &[(&str, &str)]) -> Feature {
        let mut f = Feature::new(
            name,
            FeatureSpec {
                enabled,
                answers: answers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                description: None,
            },
        );
        f.metadata.namespace = Some(ns.to_string());
        f
    }

    fn cache(features: Vec<Feature>) -> FeatureCache {
        FeatureCache::with_defaults(Arc::new(Snapshot::new(vec![], features)))
    }

    #[test]
    fn enabled_feature_selects_issuer() {
        let cache = cache(vec![feature("ns", "letsencrypt", true, &[("type", "http")])]);
        let selection = cache.selection("ns");
        assert_eq!(
            selection,
            IssuerSelection::Configured {
                issuer_type: "http".to_string()
            }
        );
        assert_eq!(selection.issuer_name(), Some("letsencrypt-http"));
    }

    #[test]
    fn missing_feature_is_unavailable() {
        let cache = cache(vec![feature("other", "letsencrypt", true, &[("type", "http")])]);
        assert_eq!(cache.selection("ns"), IssuerSelection::Unavailable);
    }

    #[test]
    fn disabled_feature_is_unavailable() {
        let cache = cache(vec![feature("ns", "letsencrypt", false, &[("type", "http")])]);
        assert_eq!(cache.selection("ns"), IssuerSelection::Unavailable);
        assert_eq!(cache.selection("ns").issuer_name(), None);
    }

    #[test]
    fn unknown_or_empty_type_has_no_issuer() {
        let cache = cache(vec![
            feature("a", "letsencrypt", true, &[("type", "dns")]),
            feature("b", "letsencrypt", true, &[("type", "")]),
            feature("c", "letsencrypt", true, &[]),
        ]);
        for ns in ["a", "b", "c"] {
            assert!(matches!(cache.selection(ns), IssuerSelection::Configured { .. }));
            assert_eq!(cache.selection(ns).issuer_name(), None);
        }
    }

    #[test]
    fn custom_feature_name_and_key() {
        let cache = FeatureCache::new(
            Arc::new(Snapshot::new(
                vec![],
                vec![feature("ns", "tls", true, &[("issuer", "staging")])],
            )),
            "tls",
            "issuer",
        );
        assert_eq!(cache.feature_name(), "tls");
        assert_eq!(cache.selection("ns").issuer_name(), Some("letsencrypt-staging"));
    }
}
