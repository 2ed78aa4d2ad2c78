//! Certificate issuance for Ridge public domains
//!
//! Resolves the namespace's issuer selection from its Feature, synthesizes the
//! cert-manager Certificate each PublicDomain wants, and commits it through the
//! owner-scoped applier.

#![deny(missing_docs)]

pub mod controller;
pub mod features;
pub mod issuers;
pub mod synthesizer;

pub use controller::{
    error_policy, reconcile, CertContext, DomainKubeClient, DomainKubeClientImpl,
    CERTIFICATE_SET_ID, FINALIZER,
};
pub use features::{FeatureCache, IssuerSelection};
pub use issuers::{issuer_name_for_type, KNOWN_ISSUERS};
pub use synthesizer::{certificate_name, solver_ingress_name, synthesize, Synthesis};
