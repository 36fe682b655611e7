//! Error types for the Ceph reconciler
//!
//! Provides structured error types for the REST client, the keyring codec,
//! the resource controllers, and the host driver.

use crate::domain::diagnostics::AttrPath;
use crate::keyring::KeyringError;
use thiserror::Error;

/// Unified error type for the reconciler
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    // =========================================================================
    // Provider Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    // =========================================================================
    // Plan Validation Errors
    // =========================================================================
    #[error("Validation failed{}: {message}", path_suffix(.path))]
    Validation {
        path: Option<AttrPath>,
        message: String,
    },

    #[error("{operation} is not supported for {kind}; changes to this resource require replacement")]
    NotSupported {
        kind: &'static str,
        operation: &'static str,
    },

    // =========================================================================
    // Ceph Manager API Errors
    // =========================================================================
    #[error("{operation}: unexpected status {status}: {body}")]
    Api {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("{operation}: {source}")]
    Transport {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation}: cancelled")]
    Cancelled { operation: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("{operation}: unable to decode response: {source}")]
    Decode {
        operation: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Keyring(#[from] KeyringError),

    #[error("Parse error: {0}")]
    Parse(String),

    // =========================================================================
    // Reconciliation Errors
    // =========================================================================
    #[error("{message}")]
    NotFound { message: String },

    #[error(
        "{operation} failed ({cause}) and rolling back applied changes also failed: {}; \
         the cluster may be inconsistent and manual intervention is required",
        .failures.join("; ")
    )]
    RollbackFailed {
        operation: String,
        cause: Box<Error>,
        failures: Vec<String>,
    },

    #[error("{source}\nhint: {hint}")]
    Hinted {
        #[source]
        source: Box<Error>,
        hint: String,
    },

    #[error("{path}: {source}")]
    AtPath {
        path: AttrPath,
        #[source]
        source: Box<Error>,
    },

    // =========================================================================
    // Driver Errors
    // =========================================================================
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn path_suffix(path: &Option<AttrPath>) -> String {
    match path {
        Some(p) => format!(" at {}", p),
        None => String::new(),
    }
}

/// Coarse classification of an error, used by callers that only need to
/// know which class of failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Authentication,
    Validation,
    Api,
    Transport,
    Parse,
    Drift,
    Rollback,
    Cancelled,
    Internal,
}

impl Error {
    /// Build a validation error without an attribute path
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            path: None,
            message: message.into(),
        }
    }

    /// Build a validation error attached to an attribute path
    pub fn validation_at(path: AttrPath, message: impl Into<String>) -> Self {
        Error::Validation {
            path: Some(path),
            message: message.into(),
        }
    }

    /// Attach a user-facing hint to this error
    pub fn with_hint(self, hint: impl Into<String>) -> Self {
        Error::Hinted {
            source: Box::new(self),
            hint: hint.into(),
        }
    }

    /// Attach this error to the attribute path it concerns
    pub fn at(self, path: AttrPath) -> Self {
        match self {
            // validation errors carry their own path
            Error::Validation { path: None, message } => Error::Validation {
                path: Some(path),
                message,
            },
            other => Error::AtPath {
                path,
                source: Box::new(other),
            },
        }
    }

    /// Determine the class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Authentication(_) => ErrorKind::Authentication,
            Error::Validation { .. } | Error::NotSupported { .. } => ErrorKind::Validation,
            Error::Api { .. } => ErrorKind::Api,
            Error::Transport { .. } => ErrorKind::Transport,
            Error::Cancelled { .. } => ErrorKind::Cancelled,
            Error::Decode { .. }
            | Error::Keyring(_)
            | Error::Parse(_)
            | Error::Json(_)
            | Error::Yaml(_) => ErrorKind::Parse,
            Error::NotFound { .. } => ErrorKind::Drift,
            Error::RollbackFailed { .. } => ErrorKind::Rollback,
            Error::Hinted { source, .. } | Error::AtPath { source, .. } => source.kind(),
            Error::Internal(_) | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status carried by an API error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Hinted { source, .. } | Error::AtPath { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Check if this error means the remote object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. }) || self.status() == Some(404)
    }

    /// Check if this error is fatal for the whole run rather than for a
    /// single resource
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Configuration
                | ErrorKind::Authentication
                | ErrorKind::Rollback
                | ErrorKind::Cancelled
        )
    }
}

/// Result type alias for the reconciler
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = Error::Api {
            operation: "unable to read pool".into(),
            status: 404,
            body: "{}".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Api);
        assert!(err.is_not_found());

        let err = Error::validation("bad plan");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!err.is_fatal());

        let err = Error::Configuration("no available endpoints".into());
        assert!(err.is_fatal());
    }

    #[test]
    fn test_hint_preserves_status_and_body() {
        let err = Error::Api {
            operation: "unable to delete crush rule".into(),
            status: 400,
            body: "crush rule r is in use".into(),
        }
        .with_hint("detach the rule from every pool first");

        assert_eq!(err.status(), Some(400));
        assert_eq!(err.kind(), ErrorKind::Api);
        let msg = err.to_string();
        assert!(msg.contains("crush rule r is in use"));
        assert!(msg.contains("hint: detach the rule"));
    }

    #[test]
    fn test_validation_picks_up_path() {
        let path = AttrPath::attr("config").key("global").key("mgr/x");
        let err = Error::validation("nope").at(path);
        assert_eq!(
            err.to_string(),
            "Validation failed at config[\"global\"][\"mgr/x\"]: nope"
        );
    }

    #[test]
    fn test_rollback_message() {
        let err = Error::RollbackFailed {
            operation: "unable to create ceph_config".into(),
            cause: Box::new(Error::Internal("boom".into())),
            failures: vec!["global/a: gone".into()],
        };
        assert_eq!(err.kind(), ErrorKind::Rollback);
        assert!(err.to_string().contains("manual intervention"));
    }
}
