use std::future::Future;

use chrono::Utc;
use futures::{StreamExt, future, stream};
use kube::Client;
use log::{debug, error, info, warn};

use super::filter::FilterRules;
use super::models::Scaling;
use super::registry;
use super::workload::Workload;
use crate::config::Args;
use crate::error::{Error, Result};

const CONCURRENT_UPDATES: usize = 16;

/// Cluster operations a pass needs. Implemented by [`kube::Client`] and by
/// in-memory doubles in tests.
pub trait Cluster: Sync {
    fn list(&self, resource: &str, namespace: Option<&str>) -> impl Future<Output = Result<Vec<Workload>>> + Send;
    fn reget(&self, workload: &mut Workload) -> impl Future<Output = Result<()>> + Send;
    fn update(&self, workload: &mut Workload) -> impl Future<Output = Result<()>> + Send;
}

impl Cluster for Client {
    async fn list(&self, resource: &str, namespace: Option<&str>) -> Result<Vec<Workload>> {
        registry::list_workloads(self, resource, namespace).await
    }

    async fn reget(&self, workload: &mut Workload) -> Result<()> {
        workload.reget(self).await
    }

    async fn update(&self, workload: &mut Workload) -> Result<()> {
        workload.update(self).await
    }
}

/// Outcome of a single pass over all namespace scopes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub scaled: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// Namespace scopes left untouched because a listing failed.
    pub skipped_scopes: usize,
}

impl PassSummary {
    fn record(&mut self, outcome: &Result<bool>) {
        match outcome {
            Ok(true) => self.scaled += 1,
            Ok(false) => self.unchanged += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Lists, filters and scales every included workload once.
pub async fn run_pass<C: Cluster>(cluster: &C, args: &Args, rules: &FilterRules) -> PassSummary {
    let scaling = args.scaling_at(Utc::now());
    let mut summary = PassSummary::default();
    if scaling == Scaling::Ignore {
        debug!(target: "controller", "no downtime or uptime configured, nothing to do");
        return summary;
    }

    for namespace in args.namespaces() {
        let scope = namespace.unwrap_or("all namespaces");
        let workloads = match list_scope(cluster, &args.include_resources, namespace).await {
            Ok(workloads) => rules.apply(workloads),
            Err(err) => {
                error!(target: "controller", "{err}, skipping {scope} for this pass");
                summary.skipped_scopes += 1;
                continue;
            }
        };
        info!(target: "controller", "scaling {} workloads in {scope} {scaling:?}", workloads.len());

        let outcomes: Vec<Result<bool>> = stream::iter(workloads)
            .map(|workload| scale_workload(cluster, workload, scaling, args.downscale_replicas, args.dry_run))
            .buffer_unordered(CONCURRENT_UPDATES)
            .collect()
            .await;
        for outcome in &outcomes {
            summary.record(outcome);
        }
    }
    summary
}

/// Lists every included resource of one scope concurrently. Exclusion needs
/// the complete set, so any failed listing fails the scope.
async fn list_scope<C: Cluster>(cluster: &C, resources: &[String], namespace: Option<&str>) -> Result<Vec<Workload>> {
    let listings = future::try_join_all(resources.iter().map(|resource| cluster.list(resource, namespace))).await?;
    Ok(listings.into_iter().flatten().collect())
}

/// Applies `scaling` to one workload. Returns whether anything was committed.
async fn scale_workload<C: Cluster>(
    cluster: &C,
    workload: Workload,
    scaling: Scaling,
    replicas: i32,
    dry_run: bool,
) -> Result<bool> {
    let outcome = try_scale_workload(cluster, workload, scaling, replicas, dry_run).await;
    if let Err(err) = &outcome {
        let retry = if err.is_retryable() { ", retrying next pass" } else { "" };
        error!(target: "controller", "{err}{retry}");
    }
    outcome
}

/// Scaled copy of `workload` and the rendered patch leading to it, or `None`
/// when scaling changes nothing.
fn plan(workload: &Workload, scaling: Scaling, replicas: i32) -> Result<Option<(Workload, String)>> {
    let mut scaled = workload.copy()?;
    scaled.apply(scaling, replicas)?;
    let patch = workload.compare(&scaled)?;
    if patch.0.is_empty() {
        return Ok(None);
    }
    let rendered = serde_json::to_string(&patch).map_err(|source| Error::Serialization {
        kind: workload.kind(),
        source,
    })?;
    Ok(Some((scaled, rendered)))
}

async fn try_scale_workload<C: Cluster>(
    cluster: &C,
    mut workload: Workload,
    scaling: Scaling,
    replicas: i32,
    dry_run: bool,
) -> Result<bool> {
    let Some((mut scaled, rendered)) = plan(&workload, scaling, replicas)? else {
        debug!(target: "controller", "{workload} is already {scaling:?}");
        return Ok(false);
    };
    if dry_run {
        info!(target: "controller", "dry run, would patch {workload}: {rendered}");
        return Ok(false);
    }

    match cluster.update(&mut scaled).await {
        Ok(()) => {
            info!(target: "controller", "scaled {workload} {scaling:?}: {rendered}");
            Ok(true)
        }
        Err(err) if err.is_conflict() => {
            warn!(target: "controller", "{workload} changed while scaling, retrying on the latest version");
            cluster.reget(&mut workload).await?;
            let Some((mut scaled, rendered)) = plan(&workload, scaling, replicas)? else {
                debug!(target: "controller", "{workload} is already {scaling:?} on the latest version");
                return Ok(false);
            };
            cluster.update(&mut scaled).await?;
            info!(target: "controller", "scaled {workload} {scaling:?} on the latest version: {rendered}");
            Ok(true)
        }
        Err(err) => Err(err),
    }
}
