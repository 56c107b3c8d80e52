//! Decides which workloads of a pass are in scope.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use log::debug;
use regex::Regex;

use super::models::WorkloadIdentifier;
use super::workload::Workload;
use crate::error::{Error, Result};

/// Comma-separated regular expressions, each matched against the whole input.
#[derive(Debug, Clone, Default)]
pub struct RegexList(Vec<Regex>);

impl RegexList {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        patterns
            .into_iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                Regex::new(&format!("^(?:{pattern})$")).map_err(|source| Error::Rule {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(RegexList)
    }

    pub fn matches_any(&self, value: &str) -> bool {
        self.0.iter().any(|rule| rule.is_match(value))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for RegexList {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        RegexList::new(s.split(',').map(str::trim).filter(|pattern| !pattern.is_empty()))
    }
}

/// Rules applied to every workload of a pass, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct FilterRules {
    /// `key=value` rules. Empty includes everything.
    pub include_labels: RegexList,
    pub exclude_namespaces: RegexList,
    pub exclude_workloads: RegexList,
    /// Kind names (`Deployment`, `CronJob`, ...) managed in this pass.
    pub included_kinds: HashSet<String>,
}

struct Pass<'a> {
    by_uid: HashMap<&'a str, &'a Workload>,
    externally_scaled: Vec<WorkloadIdentifier>,
}

impl<'a> Pass<'a> {
    fn new(workloads: &'a [Workload]) -> Self {
        let by_uid = workloads
            .iter()
            .filter_map(|workload| workload.uid().map(|uid| (uid, workload)))
            .collect();
        let externally_scaled = workloads
            .iter()
            .filter_map(Workload::as_scaled_object)
            .map(|scaled_object| {
                let target = &scaled_object.spec.scale_target_ref;
                WorkloadIdentifier::from_target_ref(
                    target.api_version.as_deref(),
                    target.kind.as_deref(),
                    &target.name,
                    scaled_object.metadata.namespace.as_deref().unwrap_or_default(),
                )
            })
            .collect();
        Pass {
            by_uid,
            externally_scaled,
        }
    }

    /// Follows controller references from `owner` towards the root controller
    /// and reports whether the chain leads back to `workload`. Missing targets
    /// and cycles end the walk.
    fn leads_back_to(&self, workload: &Workload, owner: &'a OwnerReference) -> bool {
        let mut current = owner;
        let mut visited = HashSet::new();
        loop {
            if workload.uid() == Some(current.uid.as_str()) {
                return true;
            }
            if !visited.insert(current.uid.as_str()) {
                return false;
            }
            let Some(next) = self.by_uid.get(current.uid.as_str()).and_then(|parent| controller_of(*parent)) else {
                return false;
            };
            current = next;
        }
    }

    /// Kinds of the non-controller owners of `workload`. Controller owners
    /// never count, whatever their chain resolves to.
    fn owner_kinds(&self, workload: &'a Workload) -> Vec<&'a str> {
        workload
            .owner_references()
            .iter()
            .filter_map(|owner| {
                if owner.controller != Some(true) {
                    return Some(owner.kind.as_str());
                }
                if self.leads_back_to(workload, owner) {
                    debug!(target: "filter", "controller chain of {workload} leads back to itself");
                }
                None
            })
            .collect()
    }

    fn is_externally_scaled(&self, workload: &Workload) -> bool {
        let gvk = workload.group_version_kind();
        let (name, namespace) = (workload.name(), workload.namespace());
        self.externally_scaled
            .iter()
            .any(|target| target.matches(&gvk.group, &gvk.version, &gvk.kind, &name, &namespace))
    }
}

fn controller_of(workload: &Workload) -> Option<&OwnerReference> {
    workload
        .owner_references()
        .iter()
        .find(|owner| owner.controller == Some(true))
}

impl FilterRules {
    /// Returns the workloads that are in scope, in their original order.
    pub fn apply(&self, workloads: Vec<Workload>) -> Vec<Workload> {
        let excluded: Vec<Option<&'static str>> = {
            let pass = Pass::new(&workloads);
            workloads.iter().map(|workload| self.exclusion(workload, &pass)).collect()
        };

        workloads
            .into_iter()
            .zip(excluded)
            .filter_map(|(workload, reason)| match reason {
                Some(reason) => {
                    debug!(target: "filter", "excluding {workload}: {reason}");
                    None
                }
                None => Some(workload),
            })
            .collect()
    }

    fn exclusion<'a>(&self, workload: &'a Workload, pass: &Pass<'a>) -> Option<&'static str> {
        if !self.matches_labels(workload) {
            return Some("no matching label");
        }
        if self.exclude_namespaces.matches_any(&workload.namespace()) {
            return Some("namespace is excluded");
        }
        if self.exclude_workloads.matches_any(&workload.name()) {
            return Some("name is excluded");
        }
        let owner_kinds = pass.owner_kinds(workload);
        if !owner_kinds.is_empty() && owner_kinds.iter().all(|kind| !self.included_kinds.contains(*kind)) {
            return Some("all owners are excluded kinds");
        }
        if pass.is_externally_scaled(workload) {
            return Some("scaled by a ScaledObject");
        }
        None
    }

    fn matches_labels(&self, workload: &Workload) -> bool {
        self.include_labels.is_empty()
            || workload
                .labels()
                .iter()
                .any(|(key, value)| self.include_labels.matches_any(&format!("{key}={value}")))
    }
}
