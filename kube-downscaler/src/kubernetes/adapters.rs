//! Kind specific accessors for the scaled state of each supported resource.
//!
//! Everything here only touches the in-memory object; nothing is sent to the
//! cluster until the owning workload is updated.

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};

use super::crds::{Prometheus, Rollout, ScaledObject, Stack};
use super::models::{
    ANNOTATION_KEDA_PAUSED_REPLICAS, DAEMONSET_EXCLUDE_NODE_SELECTOR, UNDEFINED_REPLICAS,
    WorkloadReference,
};
use crate::error::{Error, Result};

pub(crate) fn reference<K: Resource<DynamicType = ()>>(resource: &K) -> WorkloadReference {
    WorkloadReference {
        kind: K::kind(&()).to_string(),
        name: resource.name_any(),
        namespace: resource.namespace().unwrap_or_default(),
    }
}

/// Resources scaled by a replica count.
pub(crate) trait ReplicaAdapter {
    fn replicas(&self) -> Result<i32>;
    fn set_replicas(&mut self, replicas: i32) -> Result<()>;
}

/// Resources scaled by toggling a suspend flag.
pub(crate) trait SuspendAdapter {
    fn set_suspend(&mut self, suspend: bool) -> Result<()>;
}

/// Whether the object carries a spec at all. Copying or diffing an object
/// without one is refused.
pub(crate) trait Populated {
    fn is_populated(&self) -> bool;
}

macro_rules! optional_spec {
    ($($kind:ty),+ $(,)?) => {$(
        impl Populated for $kind {
            fn is_populated(&self) -> bool {
                self.spec.is_some()
            }
        }
    )+};
}

optional_spec!(
    Deployment,
    StatefulSet,
    DaemonSet,
    HorizontalPodAutoscaler,
    PodDisruptionBudget,
    Job,
    CronJob,
);

macro_rules! required_spec {
    ($($kind:ty),+ $(,)?) => {$(
        impl Populated for $kind {
            fn is_populated(&self) -> bool {
                true
            }
        }
    )+};
}

required_spec!(ScaledObject, Rollout, Stack, Prometheus);

// Built-in kinds whose spec is optional and carries `replicas` directly.
macro_rules! optional_spec_replicas {
    ($($kind:ty),+ $(,)?) => {$(
        impl ReplicaAdapter for $kind {
            fn replicas(&self) -> Result<i32> {
                self.spec
                    .as_ref()
                    .and_then(|spec| spec.replicas)
                    .ok_or_else(|| Error::NoReplicas { target: reference(self) })
            }

            fn set_replicas(&mut self, replicas: i32) -> Result<()> {
                let target = reference(self);
                let spec = self.spec.as_mut().ok_or(Error::NoReplicas { target })?;
                spec.replicas = Some(replicas);
                Ok(())
            }
        }
    )+};
}

// Custom resources always carry a spec.
macro_rules! spec_replicas {
    ($($kind:ty),+ $(,)?) => {$(
        impl ReplicaAdapter for $kind {
            fn replicas(&self) -> Result<i32> {
                self.spec
                    .replicas
                    .ok_or_else(|| Error::NoReplicas { target: reference(self) })
            }

            fn set_replicas(&mut self, replicas: i32) -> Result<()> {
                self.spec.replicas = Some(replicas);
                Ok(())
            }
        }
    )+};
}

optional_spec_replicas!(Deployment, StatefulSet);
spec_replicas!(Rollout, Stack, Prometheus);

/// A DaemonSet has no replica count. It is "scaled to zero" by pinning its pods
/// to a node selector that no node satisfies, and reports 0 or 1 accordingly.
impl ReplicaAdapter for DaemonSet {
    fn replicas(&self) -> Result<i32> {
        let pod_spec = self
            .spec
            .as_ref()
            .and_then(|spec| spec.template.spec.as_ref())
            .ok_or_else(|| Error::NoReplicas { target: reference(self) })?;
        let excluded = pod_spec
            .node_selector
            .as_ref()
            .is_some_and(|selector| selector.contains_key(DAEMONSET_EXCLUDE_NODE_SELECTOR));
        Ok(if excluded { 0 } else { 1 })
    }

    fn set_replicas(&mut self, replicas: i32) -> Result<()> {
        let target = reference(self);
        let pod_spec = self
            .spec
            .as_mut()
            .and_then(|spec| spec.template.spec.as_mut())
            .ok_or(Error::NoReplicas { target })?;

        if replicas == 0 {
            pod_spec
                .node_selector
                .get_or_insert_with(Default::default)
                .insert(DAEMONSET_EXCLUDE_NODE_SELECTOR.to_string(), "true".to_string());
        } else if let Some(selector) = pod_spec.node_selector.as_mut() {
            selector.remove(DAEMONSET_EXCLUDE_NODE_SELECTOR);
            if selector.is_empty() {
                pod_spec.node_selector = None;
            }
        }
        Ok(())
    }
}

/// An HPA is scaled through `minReplicas`, which the API server rejects below 1.
impl ReplicaAdapter for HorizontalPodAutoscaler {
    fn replicas(&self) -> Result<i32> {
        self.spec
            .as_ref()
            .and_then(|spec| spec.min_replicas)
            .ok_or_else(|| Error::NoReplicas { target: reference(self) })
    }

    fn set_replicas(&mut self, replicas: i32) -> Result<()> {
        let target = reference(self);
        if replicas < 1 {
            return Err(Error::ReplicasOutOfBounds {
                target,
                replicas,
                reason: "minReplicas must be at least 1",
            });
        }
        let spec = self.spec.as_mut().ok_or(Error::NoReplicas { target })?;
        spec.min_replicas = Some(replicas);
        Ok(())
    }
}

/// A PDB is scaled through whichever of `minAvailable`/`maxUnavailable` is set.
/// Percentages cannot be restored exactly and are treated as unset.
impl ReplicaAdapter for PodDisruptionBudget {
    fn replicas(&self) -> Result<i32> {
        let spec = self.spec.as_ref();
        let absolute = |value: Option<&IntOrString>| match value {
            Some(IntOrString::Int(count)) => Some(*count),
            _ => None,
        };
        spec.and_then(|spec| absolute(spec.min_available.as_ref()))
            .or_else(|| spec.and_then(|spec| absolute(spec.max_unavailable.as_ref())))
            .ok_or_else(|| Error::NoReplicas { target: reference(self) })
    }

    fn set_replicas(&mut self, replicas: i32) -> Result<()> {
        let target = reference(self);
        let Some(spec) = self.spec.as_mut() else {
            return Err(Error::NoReplicas { target });
        };
        if matches!(spec.min_available, Some(IntOrString::Int(_))) {
            spec.min_available = Some(IntOrString::Int(replicas));
        } else if matches!(spec.max_unavailable, Some(IntOrString::Int(_))) {
            spec.max_unavailable = Some(IntOrString::Int(replicas));
        } else {
            return Err(Error::NoReplicas { target });
        }
        Ok(())
    }
}

impl ScaledObject {
    /// The replica count KEDA is paused at. `None` when the annotation is absent.
    pub fn paused_replicas(&self) -> Result<Option<i32>> {
        let Some(value) = self.annotations().get(ANNOTATION_KEDA_PAUSED_REPLICAS) else {
            return Ok(None);
        };
        value
            .parse::<i32>()
            .map(Some)
            .map_err(|source| Error::MalformedAnnotation {
                target: reference(self),
                annotation: ANNOTATION_KEDA_PAUSED_REPLICAS,
                value: value.clone(),
                source,
            })
    }

    pub fn set_paused_replicas(&mut self, replicas: Option<i32>) {
        match replicas {
            Some(replicas) => {
                self.annotations_mut()
                    .insert(ANNOTATION_KEDA_PAUSED_REPLICAS.to_string(), replicas.to_string());
            }
            None => {
                self.annotations_mut().remove(ANNOTATION_KEDA_PAUSED_REPLICAS);
            }
        }
    }
}

/// A ScaledObject is scaled by pausing KEDA at a fixed replica count. An
/// unpaused object reports [`UNDEFINED_REPLICAS`], and restoring that value
/// removes the pause again.
impl ReplicaAdapter for ScaledObject {
    fn replicas(&self) -> Result<i32> {
        Ok(self.paused_replicas()?.unwrap_or(UNDEFINED_REPLICAS))
    }

    fn set_replicas(&mut self, replicas: i32) -> Result<()> {
        if replicas == UNDEFINED_REPLICAS {
            self.set_paused_replicas(None);
        } else {
            self.set_paused_replicas(Some(replicas));
        }
        Ok(())
    }
}

impl SuspendAdapter for Job {
    fn set_suspend(&mut self, suspend: bool) -> Result<()> {
        let target = reference(self);
        let spec = self.spec.as_mut().ok_or(Error::NoSuspendField { target })?;
        spec.suspend = Some(suspend);
        Ok(())
    }
}

impl SuspendAdapter for CronJob {
    fn set_suspend(&mut self, suspend: bool) -> Result<()> {
        let target = reference(self);
        let spec = self.spec.as_mut().ok_or(Error::NoSuspendField { target })?;
        spec.suspend = Some(suspend);
        Ok(())
    }
}
