//! The closed set of workloads the downscaler manages.
//!
//! A [`Workload`] is either suspend-scaled or replica-scaled, and each of those
//! wraps exactly one concrete resource kind.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference, Time};
use kube::core::GroupVersionKind;
use kube::{Client, Resource, ResourceExt};
use serde::Serialize;

use super::adapters::{Populated, ReplicaAdapter, SuspendAdapter, reference};
use super::client;
use super::crds::{Prometheus, Rollout, ScaledObject, Stack};
use super::models::WorkloadReference;
use crate::error::{Error, Result};

/// Structural difference between two objects, as a list of JSON patch operations.
pub type Patch = json_patch::Patch;

macro_rules! dispatch {
    ($enum:ident [$($variant:ident),+], $value:expr, $resource:ident => $body:expr) => {
        match $value {
            $($enum::$variant($resource) => $body,)+
        }
    };
}

macro_rules! suspend_scaled {
    ($value:expr, $resource:ident => $body:expr) => {
        dispatch!(SuspendScaled [CronJob, Job], $value, $resource => $body)
    };
}

macro_rules! replica_scaled {
    ($value:expr, $resource:ident => $body:expr) => {
        dispatch!(
            ReplicaScaled [
                Deployment,
                StatefulSet,
                DaemonSet,
                HorizontalPodAutoscaler,
                PodDisruptionBudget,
                ScaledObject,
                Rollout,
                Stack,
                Prometheus
            ],
            $value,
            $resource => $body
        )
    };
}

macro_rules! workload {
    ($value:expr, $resource:ident => $body:expr) => {
        match $value {
            Workload::SuspendScaled(suspend) => suspend_scaled!(suspend, $resource => $body),
            Workload::ReplicaScaled(replica) => replica_scaled!(replica, $resource => $body),
        }
    };
}

// Pairs up two values of the same enum and fails when their kinds differ.
macro_rules! same_kind {
    ($enum:ident [$($variant:ident),+], $left:expr, $right:expr, |$a:ident, $b:ident| $body:expr) => {
        match ($left, $right) {
            $(($enum::$variant($a), $enum::$variant($b)) => $body,)+
            (left, right) => Err(Error::TypeMismatch {
                expected: left.kind(),
                got: right.kind(),
            }),
        }
    };
}

/// Resources scaled by toggling `spec.suspend`.
#[derive(Debug, Clone)]
pub enum SuspendScaled {
    CronJob(CronJob),
    Job(Job),
}

/// Resources scaled by a replica count, remembering the original count while
/// scaled down.
#[derive(Debug, Clone)]
pub enum ReplicaScaled {
    Deployment(Deployment),
    StatefulSet(StatefulSet),
    DaemonSet(DaemonSet),
    HorizontalPodAutoscaler(HorizontalPodAutoscaler),
    PodDisruptionBudget(PodDisruptionBudget),
    ScaledObject(ScaledObject),
    Rollout(Rollout),
    Stack(Stack),
    Prometheus(Prometheus),
}

#[derive(Debug, Clone)]
pub enum Workload {
    SuspendScaled(SuspendScaled),
    ReplicaScaled(ReplicaScaled),
}

macro_rules! into_workload {
    ($strategy:ident: $($kind:ident),+) => {$(
        impl From<$kind> for Workload {
            fn from(resource: $kind) -> Self {
                Workload::$strategy($strategy::$kind(resource))
            }
        }
    )+};
}

into_workload!(SuspendScaled: CronJob, Job);
into_workload!(
    ReplicaScaled: Deployment,
    StatefulSet,
    DaemonSet,
    HorizontalPodAutoscaler,
    PodDisruptionBudget,
    ScaledObject,
    Rollout,
    Stack,
    Prometheus
);

fn group_version_kind<K: Resource<DynamicType = ()>>(_: &K) -> GroupVersionKind {
    GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()))
}

fn kind_of<K: Resource<DynamicType = ()>>(_: &K) -> String {
    K::kind(&()).to_string()
}

fn diff<K>(original: &K, changed: &K) -> Result<Patch>
where
    K: Resource<DynamicType = ()> + Populated + Serialize,
{
    if !original.is_populated() || !changed.is_populated() {
        return Err(Error::NilUnderlyingObject {
            kind: K::kind(&()).to_string(),
        });
    }
    let to_value = |resource: &K| {
        serde_json::to_value(resource).map_err(|source| Error::Serialization {
            kind: K::kind(&()).to_string(),
            source,
        })
    };
    Ok(json_patch::diff(&to_value(original)?, &to_value(changed)?))
}

fn copy<K: Resource<DynamicType = ()> + Populated + Clone>(resource: &K) -> Result<K> {
    if !resource.is_populated() {
        return Err(Error::NilUnderlyingObject {
            kind: K::kind(&()).to_string(),
        });
    }
    Ok(resource.clone())
}

impl SuspendScaled {
    pub fn kind(&self) -> String {
        suspend_scaled!(self, resource => kind_of(resource))
    }

    pub(crate) fn set_suspend(&mut self, suspend: bool) -> Result<()> {
        suspend_scaled!(self, resource => resource.set_suspend(suspend))
    }

    pub fn copy(&self) -> Result<Self> {
        Ok(match self {
            SuspendScaled::CronJob(resource) => SuspendScaled::CronJob(copy(resource)?),
            SuspendScaled::Job(resource) => SuspendScaled::Job(copy(resource)?),
        })
    }

    pub fn compare(&self, other: &SuspendScaled) -> Result<Patch> {
        same_kind!(SuspendScaled [CronJob, Job], self, other, |a, b| diff(a, b))
    }
}

impl ReplicaScaled {
    pub fn kind(&self) -> String {
        replica_scaled!(self, resource => kind_of(resource))
    }

    pub fn reference(&self) -> WorkloadReference {
        replica_scaled!(self, resource => reference(resource))
    }

    pub(crate) fn annotations(&self) -> &BTreeMap<String, String> {
        replica_scaled!(self, resource => resource.annotations())
    }

    pub(crate) fn annotations_mut(&mut self) -> &mut BTreeMap<String, String> {
        replica_scaled!(self, resource => resource.annotations_mut())
    }

    pub(crate) fn replicas(&self) -> Result<i32> {
        replica_scaled!(self, resource => resource.replicas())
    }

    pub(crate) fn set_replicas(&mut self, replicas: i32) -> Result<()> {
        replica_scaled!(self, resource => resource.set_replicas(replicas))
    }

    pub fn copy(&self) -> Result<Self> {
        Ok(match self {
            ReplicaScaled::Deployment(resource) => ReplicaScaled::Deployment(copy(resource)?),
            ReplicaScaled::StatefulSet(resource) => ReplicaScaled::StatefulSet(copy(resource)?),
            ReplicaScaled::DaemonSet(resource) => ReplicaScaled::DaemonSet(copy(resource)?),
            ReplicaScaled::HorizontalPodAutoscaler(resource) => {
                ReplicaScaled::HorizontalPodAutoscaler(copy(resource)?)
            }
            ReplicaScaled::PodDisruptionBudget(resource) => {
                ReplicaScaled::PodDisruptionBudget(copy(resource)?)
            }
            ReplicaScaled::ScaledObject(resource) => ReplicaScaled::ScaledObject(copy(resource)?),
            ReplicaScaled::Rollout(resource) => ReplicaScaled::Rollout(copy(resource)?),
            ReplicaScaled::Stack(resource) => ReplicaScaled::Stack(copy(resource)?),
            ReplicaScaled::Prometheus(resource) => ReplicaScaled::Prometheus(copy(resource)?),
        })
    }

    pub fn compare(&self, other: &ReplicaScaled) -> Result<Patch> {
        same_kind!(
            ReplicaScaled [
                Deployment,
                StatefulSet,
                DaemonSet,
                HorizontalPodAutoscaler,
                PodDisruptionBudget,
                ScaledObject,
                Rollout,
                Stack,
                Prometheus
            ],
            self,
            other,
            |a, b| diff(a, b)
        )
    }
}

impl Workload {
    pub fn meta(&self) -> &ObjectMeta {
        workload!(self, resource => resource.meta())
    }

    pub fn name(&self) -> String {
        workload!(self, resource => resource.name_any())
    }

    pub fn namespace(&self) -> String {
        self.meta().namespace.clone().unwrap_or_default()
    }

    pub fn uid(&self) -> Option<&str> {
        self.meta().uid.as_deref()
    }

    pub fn kind(&self) -> String {
        workload!(self, resource => kind_of(resource))
    }

    pub fn group_version_kind(&self) -> GroupVersionKind {
        workload!(self, resource => group_version_kind(resource))
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        workload!(self, resource => resource.labels())
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        workload!(self, resource => resource.annotations())
    }

    pub fn creation_timestamp(&self) -> Option<&Time> {
        self.meta().creation_timestamp.as_ref()
    }

    pub fn owner_references(&self) -> &[OwnerReference] {
        self.meta().owner_references.as_deref().unwrap_or_default()
    }

    pub fn reference(&self) -> WorkloadReference {
        workload!(self, resource => reference(resource))
    }

    pub fn as_scaled_object(&self) -> Option<&ScaledObject> {
        match self {
            Workload::ReplicaScaled(ReplicaScaled::ScaledObject(scaled_object)) => Some(scaled_object),
            _ => None,
        }
    }

    /// Replaces the local object with the server's current state.
    pub async fn reget(&mut self, client: &Client) -> Result<()> {
        workload!(self, resource => *resource = client::reget(client, &*resource).await?);
        Ok(())
    }

    /// Commits the local object. Call at most once per sequence of mutations.
    pub async fn update(&mut self, client: &Client) -> Result<()> {
        workload!(self, resource => *resource = client::update(client, &*resource).await?);
        Ok(())
    }

    pub fn copy(&self) -> Result<Workload> {
        Ok(match self {
            Workload::SuspendScaled(suspend) => Workload::SuspendScaled(suspend.copy()?),
            Workload::ReplicaScaled(replica) => Workload::ReplicaScaled(replica.copy()?),
        })
    }

    /// Patch turning `self` into `other`. Both must be the same concrete kind.
    pub fn compare(&self, other: &Workload) -> Result<Patch> {
        match (self, other) {
            (Workload::SuspendScaled(left), Workload::SuspendScaled(right)) => left.compare(right),
            (Workload::ReplicaScaled(left), Workload::ReplicaScaled(right)) => left.compare(right),
            (left, right) => Err(Error::TypeMismatch {
                expected: left.kind(),
                got: right.kind(),
            }),
        }
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reference())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deployment(replicas: i32) -> Workload {
        let deployment: Deployment = serde_json::from_value(json!({
            "metadata": {
                "name": "api",
                "namespace": "prod",
                "uid": "uid-api",
                "labels": { "app": "api" }
            },
            "spec": { "replicas": replicas, "selector": {}, "template": {} }
        }))
        .unwrap();
        deployment.into()
    }

    fn statefulset() -> Workload {
        let statefulset: StatefulSet = serde_json::from_value(json!({
            "metadata": { "name": "db", "namespace": "prod" },
            "spec": { "replicas": 1, "selector": {}, "serviceName": "db", "template": {} }
        }))
        .unwrap();
        statefulset.into()
    }

    #[test]
    fn identity_comes_from_metadata() {
        let workload = deployment(3);
        assert_eq!(workload.name(), "api");
        assert_eq!(workload.namespace(), "prod");
        assert_eq!(workload.uid(), Some("uid-api"));
        assert_eq!(workload.labels().get("app").map(String::as_str), Some("api"));
        assert!(workload.owner_references().is_empty());
        let gvk = workload.group_version_kind();
        assert_eq!((gvk.group.as_str(), gvk.version.as_str(), gvk.kind.as_str()), ("apps", "v1", "Deployment"));
        assert_eq!(workload.to_string(), "Deployment prod/api");
    }

    #[test]
    fn compare_reports_replica_change() {
        let original = deployment(3);
        let mut changed = original.copy().unwrap();
        let Workload::ReplicaScaled(replica) = &mut changed else {
            unreachable!()
        };
        replica.set_replicas(0).unwrap();

        let patch = serde_json::to_value(original.compare(&changed).unwrap()).unwrap();
        assert_eq!(patch, json!([{ "op": "replace", "path": "/spec/replicas", "value": 0 }]));
    }

    #[test]
    fn compare_of_identical_copies_is_empty() {
        let original = deployment(3);
        let copy = original.copy().unwrap();
        assert!(original.compare(&copy).unwrap().0.is_empty());
    }

    #[test]
    fn compare_across_kinds_is_a_type_mismatch() {
        let err = deployment(3).compare(&statefulset()).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { ref expected, ref got } if expected == "Deployment" && got == "StatefulSet"));

        let job: Job = serde_json::from_value(json!({ "metadata": { "name": "backup" }, "spec": { "template": {} } })).unwrap();
        let err = deployment(3).compare(&job.into()).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn objects_without_spec_cannot_be_copied() {
        let deployment: Deployment = serde_json::from_value(json!({ "metadata": { "name": "api" } })).unwrap();
        let workload: Workload = deployment.into();
        assert!(matches!(workload.copy().unwrap_err(), Error::NilUnderlyingObject { .. }));
        assert!(matches!(
            workload.compare(&workload.clone()).unwrap_err(),
            Error::NilUnderlyingObject { .. }
        ));
    }
}
