//! Third-party resources the downscaler can scale.
//!
//! Only the fields the downscaler reads or writes are typed. Everything else in
//! `spec` is carried through `other`, so an update never drops fields that this
//! crate does not know about.

use std::collections::BTreeMap;

use kube::CustomResource;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// KEDA ScaledObject (`keda.sh/v1alpha1`).
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize)]
#[kube(
    group = "keda.sh",
    version = "v1alpha1",
    kind = "ScaledObject",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ScaledObjectSpec {
    pub scale_target_ref: ScaleTargetRef,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleTargetRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub name: String,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// Argo Rollout (`argoproj.io/v1alpha1`).
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize)]
#[kube(
    group = "argoproj.io",
    version = "v1alpha1",
    kind = "Rollout",
    namespaced,
    schema = "disabled"
)]
pub struct RolloutSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// Zalando Stack (`zalando.org/v1`).
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize)]
#[kube(group = "zalando.org", version = "v1", kind = "Stack", namespaced, schema = "disabled")]
pub struct StackSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// Prometheus Operator Prometheus (`monitoring.coreos.com/v1`).
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize)]
#[kube(
    group = "monitoring.coreos.com",
    version = "v1",
    kind = "Prometheus",
    plural = "prometheuses",
    namespaced,
    schema = "disabled"
)]
pub struct PrometheusSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}
