//! Static mapping from issuer type to cluster issuer name

/// Known issuer types and the ClusterIssuer each one resolves to
pub const KNOWN_ISSUERS: &[(&str, &str)] = &[
    ("http", "letsencrypt-http"),
    ("staging", "letsencrypt-staging"),
    ("production", "letsencrypt-production"),
    ("selfsigned", "selfsigned"),
];

/// ClusterIssuer for an issuer type. Lookup is exact; unknown and empty
/// types have no issuer.
pub fn issuer_name_for_type(issuer_type: &str) -> Option<&'static str> {
    KNOWN_ISSUERS
        .iter()
        .find(|(t, _)| *t == issuer_type)
        .map(|(_, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_types_resolve() {
        assert_eq!(issuer_name_for_type("http"), Some("letsencrypt-http"));
        assert_eq!(issuer_name_for_type("staging"), Some("letsencrypt-staging"));
        assert_eq!(issuer_name_for_type("production"), Some("letsencrypt-production"));
        assert_eq!(issuer_name_for_type("selfsigned"), Some("selfsigned"));
    }

    #[test]
    fn unknown_types_do_not() {
        assert_eq!(issuer_name_for_type(""), None);
        assert_eq!(issuer_name_for_type("HTTP"), None);
        assert_eq!(issuer_name_for_type("dns01"), None);
    }
}
