use std::fmt;

/// Annotation holding the replica count to restore on scale-up.
pub const ANNOTATION_ORIGINAL_REPLICAS: &str = "downscaler/original-replicas";

/// KEDA pauses a ScaledObject at the given replica count while this annotation is set.
pub const ANNOTATION_KEDA_PAUSED_REPLICAS: &str = "autoscaling.keda.sh/paused-replicas";

/// Node selector that no node carries, used to evict all DaemonSet pods.
pub const DAEMONSET_EXCLUDE_NODE_SELECTOR: &str = "kube-downscaler-non-existent";

/// Replica value meaning "not set", used by kinds whose scaled state may be absent.
pub const UNDEFINED_REPLICAS: i32 = -1;

/// Identifies a single workload in log lines and errors.
#[derive(Debug, Clone, Eq, Hash, PartialEq)]
pub struct WorkloadReference {
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

impl fmt::Display for WorkloadReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// A workload targeted by an external scaler. Empty `group`, `version` or `kind`
/// match anything.
#[derive(Debug, Clone, Default, Eq, Hash, PartialEq)]
pub struct WorkloadIdentifier {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

impl WorkloadIdentifier {
    /// Builds an identifier from a scale target reference. `api_version` is either
    /// `group/version` or a bare core-group `version`.
    pub fn from_target_ref(
        api_version: Option<&str>,
        kind: Option<&str>,
        name: &str,
        namespace: &str,
    ) -> Self {
        let (group, version) = match api_version.unwrap_or_default().split_once('/') {
            Some((group, version)) => (group.to_string(), version.to_string()),
            None => (String::new(), api_version.unwrap_or_default().to_string()),
        };
        WorkloadIdentifier {
            group,
            version,
            kind: kind.unwrap_or_default().to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }

    pub fn matches(&self, group: &str, version: &str, kind: &str, name: &str, namespace: &str) -> bool {
        fn wildcard(expected: &str, actual: &str) -> bool {
            expected.is_empty() || expected == actual
        }

        self.name == name
            && self.namespace == namespace
            && wildcard(&self.group, group)
            && wildcard(&self.version, version)
            && wildcard(&self.kind, kind)
    }
}

/// What a pass wants a workload to look like.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Scaling {
    Down,
    Up,
    Ignore,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_ref_splits_group_and_version() {
        let id = WorkloadIdentifier::from_target_ref(Some("apps/v1"), Some("Deployment"), "api", "prod");
        assert_eq!(id.group, "apps");
        assert_eq!(id.version, "v1");
        assert!(id.matches("apps", "v1", "Deployment", "api", "prod"));
        assert!(!id.matches("apps", "v1", "StatefulSet", "api", "prod"));
        assert!(!id.matches("apps", "v1", "Deployment", "api", "staging"));
    }

    #[test]
    fn missing_api_version_matches_any_group() {
        let id = WorkloadIdentifier::from_target_ref(None, Some("Deployment"), "api", "prod");
        assert!(id.matches("apps", "v1", "Deployment", "api", "prod"));
        assert!(id.matches("extensions", "v1beta1", "Deployment", "api", "prod"));
    }

    #[test]
    fn reference_display() {
        let reference = WorkloadReference {
            kind: "Deployment".to_string(),
            name: "api".to_string(),
            namespace: "prod".to_string(),
        };
        assert_eq!(reference.to_string(), "Deployment prod/api");
    }
}
