//! Error types for the downscaler core

use std::num::ParseIntError;

use crate::kubernetes::models::WorkloadReference;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the core can report. Callers inspect the variant, not the message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("resource type {0:?} is not supported")]
    UnsupportedResource(String),

    #[error("{target} has no replicas specified")]
    NoReplicas { target: WorkloadReference },

    #[error("{target} has no suspend field")]
    NoSuspendField { target: WorkloadReference },

    #[error("{target} cannot be scaled to {replicas} replicas: {reason}")]
    ReplicasOutOfBounds {
        target: WorkloadReference,
        replicas: i32,
        reason: &'static str,
    },

    #[error("malformed {annotation} annotation {value:?} on {target}: {source}")]
    MalformedAnnotation {
        target: WorkloadReference,
        annotation: &'static str,
        value: String,
        source: ParseIntError,
    },

    #[error("expected a {expected} workload, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("{kind} workload has no underlying object")]
    NilUnderlyingObject { kind: String },

    #[error("failed to {action} {target}: {source}")]
    Kube {
        action: &'static str,
        target: WorkloadReference,
        source: kube::Error,
    },

    #[error("failed to list {resource} in {scope}: {source}")]
    List {
        resource: String,
        scope: String,
        source: kube::Error,
    },

    #[error("failed to decode {kind} from admission payload: {source}")]
    Decode {
        kind: String,
        source: serde_json::Error,
    },

    #[error("failed to serialize {kind}: {source}")]
    Serialization {
        kind: String,
        source: serde_json::Error,
    },

    #[error("invalid timespan {span:?}: {reason}")]
    TimeSpanFormat { span: String, reason: String },

    #[error("failed to load timezone {zone:?}: {reason}")]
    Timezone { zone: String, reason: String },

    #[error("time of day {value:?} has fields that are out of range")]
    TimeOfDayRange { value: String },

    #[error("invalid rule {pattern:?}: {source}")]
    Rule {
        pattern: String,
        source: regex::Error,
    },
}

impl Error {
    /// Transport failures are worth another attempt on the next pass; everything
    /// else needs a data or configuration change first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Kube { .. } | Error::List { .. })
    }

    /// The server rejected an update because the local object was stale.
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Kube {
                source: kube::Error::Api(response),
                ..
            } => response.code == 409,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn target() -> WorkloadReference {
        WorkloadReference {
            kind: "Deployment".to_string(),
            name: "api".to_string(),
            namespace: "prod".to_string(),
        }
    }

    #[test]
    fn conflict_is_detected_by_status_code() {
        let err = Error::Kube {
            action: "update",
            target: target(),
            source: kube::Error::Api(ErrorResponse {
                status: "Failure".to_string(),
                message: "the object has been modified".to_string(),
                reason: "Conflict".to_string(),
                code: 409,
            }),
        };
        assert!(err.is_conflict());
        assert!(err.is_retryable());
        assert!(err.to_string().contains("Deployment prod/api"));
    }

    #[test]
    fn data_errors_are_not_retryable() {
        let err = Error::NoReplicas { target: target() };
        assert!(!err.is_retryable());
        assert!(!err.is_conflict());
        assert_eq!(err.to_string(), "Deployment prod/api has no replicas specified");
    }
}
