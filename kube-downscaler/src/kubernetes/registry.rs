//! Resource names the downscaler understands, and how to list or decode each.

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::Client;

use super::client::{self, ClusterResource};
use super::crds::{Prometheus, Rollout, ScaledObject, Stack};
use super::models::Scaling;
use super::workload::{Patch, Workload};
use crate::error::{Error, Result};

async fn list_as<K>(client: &Client, namespace: Option<&str>) -> Result<Vec<Workload>>
where
    K: ClusterResource + Into<Workload>,
{
    let resources = client::list::<K>(client, namespace).await?;
    Ok(resources.into_iter().map(Into::into).collect())
}

fn decode_as<K>(payload: &[u8]) -> Result<Workload>
where
    K: ClusterResource + Into<Workload>,
{
    serde_json::from_slice::<K>(payload)
        .map(Into::into)
        .map_err(|source| Error::Decode {
            kind: K::kind(&()).to_string(),
            source,
        })
}

fn kind_as<K: ClusterResource>() -> String {
    K::kind(&()).to_string()
}

macro_rules! registry {
    ($($kind:ty => $singular:literal, $plural:literal;)+) => {
        /// Plural resource names accepted by [`list_workloads`].
        pub const RESOURCES: &[&str] = &[$($plural),+];

        /// Lists every workload of a plural resource name. `None` lists across all namespaces.
        pub async fn list_workloads(client: &Client, resource: &str, namespace: Option<&str>) -> Result<Vec<Workload>> {
            match resource {
                $($plural => list_as::<$kind>(client, namespace).await,)+
                other => Err(Error::UnsupportedResource(other.to_string())),
            }
        }

        /// Decodes a single object of a singular resource name from its JSON form.
        pub fn decode_workload(resource: &str, payload: &[u8]) -> Result<Workload> {
            match resource {
                $($singular => decode_as::<$kind>(payload),)+
                other => Err(Error::UnsupportedResource(other.to_string())),
            }
        }

        /// Kind name of a plural resource name, e.g. `deployments` to `Deployment`.
        pub fn kind_of(resource: &str) -> Result<String> {
            match resource {
                $($plural => Ok(kind_as::<$kind>()),)+
                other => Err(Error::UnsupportedResource(other.to_string())),
            }
        }
    };
}

registry! {
    Deployment => "deployment", "deployments";
    StatefulSet => "statefulset", "statefulsets";
    DaemonSet => "daemonset", "daemonsets";
    CronJob => "cronjob", "cronjobs";
    Job => "job", "jobs";
    HorizontalPodAutoscaler => "horizontalpodautoscaler", "horizontalpodautoscalers";
    PodDisruptionBudget => "poddisruptionbudget", "poddisruptionbudgets";
    ScaledObject => "scaledobject", "scaledobjects";
    Rollout => "rollout", "rollouts";
    Stack => "stack", "stacks";
    Prometheus => "prometheus", "prometheuses";
}

/// Computes the patch that scaling the admitted object would produce, without
/// committing anything.
pub fn evaluate_admission(resource: &str, payload: &[u8], scaling: Scaling, replicas: i32) -> Result<Patch> {
    let original = decode_workload(resource, payload)?;
    let mut scaled = original.copy()?;
    scaled.apply(scaling, replicas)?;
    original.compare(&scaled)
}
