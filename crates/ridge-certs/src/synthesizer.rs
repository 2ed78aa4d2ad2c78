//! Certificate synthesizer
//!
//! Pure derivation of a PublicDomain's observed status and its desired
//! Certificate set from the domain spec and the namespace's issuer selection.
//! Everything is recomputed from scratch on every call, so calling it twice
//! with the same inputs yields the same output.
//!
//! Object names derive from the domain's namespace and name, never from the
//! DNS name, so editing `spec.domainName` updates the Certificate in place.

use kube::api::ObjectMeta;
use kube::ResourceExt;

use ridge_common::certificate::{
    Certificate, CertificateSpec, IssuerRef, HTTP01_INGRESS_ANNOTATION,
};
use ridge_common::crd::{PublicDomain, PublicDomainStatus, SecretRef};
use ridge_common::kube_utils::{safe_concat_name, short_hex};
use ridge_common::Error;

use crate::features::IssuerSelection;

/// Hex characters of the domain hash in the ACME solver ingress name
const SOLVER_HASH_LEN: usize = 5;

/// Output of one synthesis pass
#[derive(Clone, Debug, PartialEq)]
pub struct Synthesis {
    /// Status the PublicDomain should carry
    pub status: PublicDomainStatus,
    /// The Certificate to own, if issuance is configured
    pub certificate: Option<Certificate>,
}

impl Synthesis {
    /// The complete desired object set for the applier
    pub fn desired(&self) -> Vec<Certificate> {
        self.certificate.iter().cloned().collect()
    }
}

/// Name shared by the Certificate and the Secret it populates
pub fn certificate_name(namespace: &str, name: &str) -> String {
    safe_concat_name(&[namespace, name])
}

/// Name of the ingress cert-manager creates to answer HTTP-01 challenges
pub fn solver_ingress_name(name: &str, domain_name: &str) -> String {
    safe_concat_name(&[name, &short_hex(domain_name, SOLVER_HASH_LEN)])
}

/// Derive status and desired Certificate for `domain`.
///
/// - Disabled issuance: empty status, nothing desired.
/// - Otherwise the endpoint and secret ref are always set. The issuer name
///   and the Certificate only appear when the selection maps to a known
///   issuer.
pub fn synthesize(domain: &PublicDomain, selection: &IssuerSelection) -> Result<Synthesis, Error> {
    let name = domain.name_any();
    let namespace = domain
        .namespace()
        .ok_or_else(|| Error::validation_for(&name, "PublicDomain is missing a namespace"))?;

    if domain.spec.disable_issuance {
        return Ok(Synthesis {
            status: PublicDomainStatus::default(),
            certificate: None,
        });
    }

    let domain_name = &domain.spec.domain_name;
    let secret_name = certificate_name(&namespace, &name);
    let issuer_name = selection.issuer_name();

    let certificate = issuer_name.map(|issuer| {
        Certificate::new(
            ObjectMeta {
                name: Some(secret_name.clone()),
                namespace: Some(namespace.clone()),
                annotations: Some(
                    [(
                        HTTP01_INGRESS_ANNOTATION.to_string(),
                        solver_ingress_name(&name, domain_name),
                    )]
                    .into(),
                ),
                ..Default::default()
            },
            CertificateSpec {
                secret_name: secret_name.clone(),
                dns_names: vec![domain_name.clone()],
                issuer_ref: IssuerRef::cluster_issuer(issuer),
            },
        )
    });

    Ok(Synthesis {
        status: PublicDomainStatus {
            endpoint: Some(format!("https://{}", domain_name)),
            issuer_name: Some(issuer_name.unwrap_or_default().to_string()),
            secret_ref: Some(SecretRef {
                namespace,
                name: secret_name,
            }),
        },
        certificate,
    })
}
