//! The original replica count of a downscaled workload, persisted as an
//! annotation on the workload itself.
//!
//! These two functions are the only place the annotation is read or written.
//! The marker is present exactly while the workload is scaled down by us.

use std::collections::BTreeMap;

use super::models::{ANNOTATION_ORIGINAL_REPLICAS, WorkloadReference};
use crate::error::{Error, Result};

/// Reads the marker. `Ok(None)` means the workload was never scaled down or
/// has already been restored.
pub fn original_replicas(
    annotations: &BTreeMap<String, String>,
    target: impl FnOnce() -> WorkloadReference,
) -> Result<Option<i32>> {
    let Some(value) = annotations.get(ANNOTATION_ORIGINAL_REPLICAS) else {
        return Ok(None);
    };
    value
        .parse::<i32>()
        .map(Some)
        .map_err(|source| Error::MalformedAnnotation {
            target: target(),
            annotation: ANNOTATION_ORIGINAL_REPLICAS,
            value: value.clone(),
            source,
        })
}

/// Writes the marker, or removes it for `None`.
pub fn set_original_replicas(annotations: &mut BTreeMap<String, String>, replicas: Option<i32>) {
    match replicas {
        Some(replicas) => {
            annotations.insert(ANNOTATION_ORIGINAL_REPLICAS.to_string(), replicas.to_string());
        }
        None => {
            annotations.remove(ANNOTATION_ORIGINAL_REPLICAS);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> WorkloadReference {
        WorkloadReference {
            kind: "Deployment".to_string(),
            name: "api".to_string(),
            namespace: "prod".to_string(),
        }
    }

    #[test]
    fn absent_marker_is_none() {
        assert_eq!(original_replicas(&BTreeMap::new(), target).unwrap(), None);
    }

    #[test]
    fn marker_is_written_and_removed() {
        let mut annotations = BTreeMap::from([("team".to_string(), "core".to_string())]);
        set_original_replicas(&mut annotations, Some(-1));
        assert_eq!(annotations.get(ANNOTATION_ORIGINAL_REPLICAS).map(String::as_str), Some("-1"));
        assert_eq!(original_replicas(&annotations, target).unwrap(), Some(-1));

        set_original_replicas(&mut annotations, None);
        assert_eq!(original_replicas(&annotations, target).unwrap(), None);
        assert_eq!(annotations.len(), 1);
    }

    #[test]
    fn malformed_marker_is_an_error() {
        for value in ["three", "3.0", "2147483648"] {
            let annotations = BTreeMap::from([(ANNOTATION_ORIGINAL_REPLICAS.to_string(), value.to_string())]);
            let err = original_replicas(&annotations, target).unwrap_err();
            assert!(matches!(err, Error::MalformedAnnotation { .. }), "{value}");
        }
    }
}
