//! Kubernetes helpers: API resource construction and deterministic naming
//!
//! Names of synthesized objects derive only from owner identity, never from
//! mutable spec fields, so repeated reconciles address the same objects.

use std::fmt::Write as _;

use kube::discovery::ApiResource;

/// Kubernetes object names (and label values) are capped at 63 characters.
pub const MAX_NAME_LEN: usize = 63;

/// Number of hex characters appended when a name must be truncated
const TRUNCATION_HASH_LEN: usize = 5;

/// Trait for types with static API version and kind constants.
///
/// Implement this for foreign CRD types (cert-manager etc.) that are handled
/// through `DynamicObject` rather than a generated `kube::Resource` impl.
pub trait HasApiResource {
    /// Full API version (e.g., "cert-manager.io/v1")
    const API_VERSION: &'static str;
    /// Resource kind (e.g., "Certificate")
    const KIND: &'static str;

    /// Build an ApiResource from the type's constants.
    fn api_resource() -> ApiResource {
        build_api_resource(Self::API_VERSION, Self::KIND)
    }
}

/// Build an ApiResource from an explicit apiVersion and kind.
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Split an apiVersion into (group, version). Core types have an empty group.
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Lowercase plural form of a kind, as used in API paths.
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

/// Compute a deterministic hash of the input string, returning a 16-char hex digest.
pub fn deterministic_hash(input: &str) -> String {
    use aws_lc_rs::digest;
    let hash = digest::digest(&digest::SHA256, input.as_bytes());
    hash.as_ref()[..8]
        .iter()
        .fold(String::with_capacity(16), |mut s, b| {
            let _ = write!(s, "{:02x}", b);
            s
        })
}

/// First `len` hex characters of the SHA-256 of `input` (at most 16).
///
/// Collisions are tolerated by callers: a collision only makes two objects
/// share a derived resource name, it never changes which object is addressed.
pub fn short_hex(input: &str, len: usize) -> String {
    let mut hex = deterministic_hash(input);
    hex.truncate(len.min(16));
    hex
}

/// Join name parts with `-`, keeping the result a valid object name.
///
/// Results longer than [`MAX_NAME_LEN`] are truncated and suffixed with a
/// short hash of the full joined name, so distinct long inputs stay distinct.
pub fn safe_concat_name(parts: &[&str]) -> String {
    let full = parts.join("-");
    if full.len() <= MAX_NAME_LEN {
        return full;
    }

    let suffix = short_hex(&full, TRUNCATION_HASH_LEN);
    let keep = MAX_NAME_LEN - TRUNCATION_HASH_LEN - 1;
    let mut prefix: String = full.chars().take(keep).collect();
    while prefix.ends_with(|c: char| !c.is_ascii_alphanumeric()) {
        prefix.pop();
    }
    format!("{}-{}", prefix, suffix)
}

/// Render a label map as an equality-based label selector string.
pub fn label_selector<'a>(labels: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    labels
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}
