//! Error types for the Parcel operator
//!
//! Errors are structured with fields to aid debugging in production.
//! Each error variant includes contextual information like package names
//! and underlying causes.

use thiserror::Error;

/// Main error type for Parcel operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Bundle loading or parsing error
    #[error("bundle error [{path}]: {message}")]
    Bundle {
        /// Path or image reference the bundle was loaded from
        path: String,
        /// Description of what failed
        message: String,
    },

    /// Self-bootstrap error
    #[error("bootstrap error [{context}]: {message}")]
    Bootstrap {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g. "nuke", "poller", "self-install")
        context: String,
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
        /// Context where the error occurred (e.g. "reconciler", "controller")
        context: String,
    },
}

impl Error {
    /// Create a bundle error
    pub fn bundle(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Bundle {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create a bootstrap error with context
    pub fn bootstrap(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Bootstrap {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create an internal error with context
    pub fn internal(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Returns true if this wraps a 404 from the API server
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Kube {
                source: kube::Error::Api(ae)
            } if ae.code == 404
        )
    }

    /// Returns true if this wraps a 409 AlreadyExists from the API server
    ///
    /// Note: kube reports both AlreadyExists and Conflict as 409; the reason
    /// string disambiguates.
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Self::Kube {
                source: kube::Error::Api(ae)
            } if ae.code == 409 && ae.reason == "AlreadyExists"
        )
    }
}

/// Returns true if a raw kube error is a 404
pub fn kube_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> Error {
        Error::from(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: String::new(),
            reason: reason.to_string(),
            code,
        }))
    }

    #[test]
    fn not_found_detection() {
        assert!(api_error(404, "NotFound").is_not_found());
        assert!(!api_error(500, "InternalError").is_not_found());
        assert!(!Error::internal("test", "boom").is_not_found());
    }

    #[test]
    fn already_exists_detection() {
        assert!(api_error(409, "AlreadyExists").is_already_exists());
        // Conflict shares the status code but not the reason
        assert!(!api_error(409, "Conflict").is_already_exists());
        assert!(!api_error(404, "NotFound").is_already_exists());
    }

    #[test]
    fn error_display_includes_context() {
        let err = Error::bootstrap("nuke", "ClusterPackage still present");
        assert_eq!(
            err.to_string(),
            "bootstrap error [nuke]: ClusterPackage still present"
        );
    }
}
