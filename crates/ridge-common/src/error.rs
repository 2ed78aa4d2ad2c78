//! Error types for the Ridge operator
//!
//! Every failure inside the reconcile pipeline is retry-safe: controllers
//! requeue the key with backoff and rely on idempotent recomputation to
//! converge. [`Error::is_transient`] encodes that taxonomy so error policies
//! can pick a delay without string matching.
//!
//! A missing dependency (for example the issuer `Feature`) is not an error at
//! all. Client boundaries map HTTP 404 on lookups to `Ok(None)`.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for Ridge operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Declarative store operation failed (list/get/create/update/delete)
    #[error("store error during {operation}: {message}")]
    Store {
        /// Operation that failed (e.g., "list", "create")
        operation: String,
        /// Description of what failed
        message: String,
    },

    /// Write raced with another writer (409 Conflict / AlreadyExists)
    #[error("conflict on {kind} {namespace}/{name}: {message}")]
    Conflict {
        /// Resource kind
        kind: String,
        /// Resource namespace
        namespace: String,
        /// Resource name
        name: String,
        /// Description of the conflict
        message: String,
    },

    /// A watched object is structurally unusable (e.g., missing namespace)
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// `namespace/name` of the offending resource
        resource: String,
        /// Description of what's invalid
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "applier", "runner")
        context: String,
    },
}

impl Error {
    /// Create a store error for the given operation
    pub fn store(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Create a conflict error for a specific object
    pub fn conflict(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error for a resource
    pub fn validation_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error without resource context
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::validation_for(UNKNOWN_CONTEXT, msg)
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Whether retrying the same key later can succeed without a spec change.
    ///
    /// Store outages and write conflicts resolve on their own. Validation and
    /// serialization failures need the object to change first, so the caller
    /// should wait longer, but they are still retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if ae.code == 400 || ae.code == 422
            ),
            Self::Store { .. } | Self::Conflict { .. } | Self::Internal { .. } => true,
            Self::Validation { .. } | Self::Serialization { .. } => false,
        }
    }

    /// Whether this error is a 404 from the API server
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Kube { source: kube::Error::Api(ae) } if ae.code == 404)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}
