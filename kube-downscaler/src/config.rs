use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Parser;

use crate::error::Result;
use crate::kubernetes::filter::{FilterRules, RegexList};
use crate::kubernetes::models::Scaling;
use crate::kubernetes::registry;
use crate::timespan::TimeSpans;

/// Scales cluster workloads down outside of working hours and restores them afterwards.
#[derive(Debug, Clone, Parser)]
#[command(name = "kube-downscaler", version, about)]
pub struct Args {
    /// Seconds between two passes
    #[arg(long, env = "INTERVAL", default_value_t = 30)]
    pub interval: u64,

    /// Namespaces to manage, comma separated. Empty manages the whole cluster
    #[arg(long, env = "NAMESPACE", value_delimiter = ',')]
    pub namespace: Vec<String>,

    /// Plural resource names to manage, comma separated
    #[arg(
        long,
        env = "INCLUDE_RESOURCES",
        value_delimiter = ',',
        default_value = "deployments"
    )]
    pub include_resources: Vec<String>,

    /// Windows during which workloads are scaled down
    #[arg(long, env = "DEFAULT_DOWNTIME", conflicts_with = "uptime")]
    pub downtime: Option<TimeSpans>,

    /// Windows during which workloads are scaled up
    #[arg(long, env = "DEFAULT_UPTIME")]
    pub uptime: Option<TimeSpans>,

    /// Replica count of a scaled down workload
    #[arg(
        long,
        env = "DOWNSCALE_REPLICAS",
        default_value_t = 0,
        value_parser = clap::value_parser!(i32).range(0..)
    )]
    pub downscale_replicas: i32,

    /// Only manage workloads with a `key=value` label matching one of these rules
    #[arg(long, env = "INCLUDE_LABELS", default_value = "")]
    pub include_labels: RegexList,

    /// Never manage workloads in namespaces matching these rules
    #[arg(long, env = "EXCLUDE_NAMESPACES", default_value = "kube-system,kube-downscaler")]
    pub exclude_namespaces: RegexList,

    /// Never manage workloads with names matching these rules
    #[arg(long, env = "EXCLUDE_DEPLOYMENTS", default_value = "")]
    pub exclude_workloads: RegexList,

    /// Log the changes a pass would make without applying them
    #[arg(long, env = "DRY_RUN")]
    pub dry_run: bool,

    /// Run a single pass and exit
    #[arg(long)]
    pub once: bool,
}

impl Args {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// Namespace scopes of a pass. `None` is the whole cluster.
    pub fn namespaces(&self) -> Vec<Option<&str>> {
        let namespaces: Vec<Option<&str>> = self
            .namespace
            .iter()
            .map(|namespace| namespace.trim())
            .filter(|namespace| !namespace.is_empty())
            .map(Some)
            .collect();
        if namespaces.is_empty() { vec![None] } else { namespaces }
    }

    /// Builds the filter of a pass. Fails on resource names without a lister.
    pub fn filter_rules(&self) -> Result<FilterRules> {
        let included_kinds: HashSet<String> = self
            .include_resources
            .iter()
            .map(|resource| registry::kind_of(resource.trim()))
            .collect::<Result<_>>()?;
        Ok(FilterRules {
            include_labels: self.include_labels.clone(),
            exclude_namespaces: self.exclude_namespaces.clone(),
            exclude_workloads: self.exclude_workloads.clone(),
            included_kinds,
        })
    }

    /// What workloads should look like at `now`.
    pub fn scaling_at(&self, now: DateTime<Utc>) -> Scaling {
        match (&self.downtime, &self.uptime) {
            (Some(downtime), _) if downtime.contains(now) => Scaling::Down,
            (Some(_), _) => Scaling::Up,
            (None, Some(uptime)) if uptime.contains(now) => Scaling::Up,
            (None, Some(_)) => Scaling::Down,
            (None, None) => Scaling::Ignore,
        }
    }
}
