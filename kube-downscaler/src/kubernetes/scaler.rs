//! Scale-down and scale-up for both strategies. Nothing here talks to the
//! cluster; callers commit the result with [`Workload::update`].

use log::debug;

use super::ledger::{original_replicas, set_original_replicas};
use super::models::Scaling;
use super::workload::{ReplicaScaled, SuspendScaled, Workload};
use crate::error::Result;

impl SuspendScaled {
    pub fn scale_down(&mut self) -> Result<()> {
        self.set_suspend(true)
    }

    pub fn scale_up(&mut self) -> Result<()> {
        self.set_suspend(false)
    }
}

impl ReplicaScaled {
    /// Scales to `target` replicas and records the current count so a later
    /// [`ReplicaScaled::scale_up`] can restore it.
    pub fn scale_down(&mut self, target: i32) -> Result<()> {
        let replicas = self.replicas()?;
        if replicas == target {
            debug!(target: "scaler", "{} is already at {} replicas", self.reference(), target);
            return Ok(());
        }

        self.set_replicas(target)?;
        set_original_replicas(self.annotations_mut(), Some(replicas));
        Ok(())
    }

    /// Restores the recorded replica count and forgets it.
    pub fn scale_up(&mut self) -> Result<()> {
        let Some(replicas) = original_replicas(self.annotations(), || self.reference())? else {
            debug!(target: "scaler", "{} was not scaled down", self.reference());
            return Ok(());
        };

        self.set_replicas(replicas)?;
        set_original_replicas(self.annotations_mut(), None);
        Ok(())
    }
}

impl Workload {
    /// Suspend-scaled workloads ignore `replicas`.
    pub fn scale_down(&mut self, replicas: i32) -> Result<()> {
        match self {
            Workload::SuspendScaled(suspend) => suspend.scale_down(),
            Workload::ReplicaScaled(replica) => replica.scale_down(replicas),
        }
    }

    pub fn scale_up(&mut self) -> Result<()> {
        match self {
            Workload::SuspendScaled(suspend) => suspend.scale_up(),
            Workload::ReplicaScaled(replica) => replica.scale_up(),
        }
    }

    pub fn apply(&mut self, scaling: Scaling, replicas: i32) -> Result<()> {
        match scaling {
            Scaling::Down => self.scale_down(replicas),
            Scaling::Up => self.scale_up(),
            Scaling::Ignore => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::kubernetes::models::{ANNOTATION_KEDA_PAUSED_REPLICAS, ANNOTATION_ORIGINAL_REPLICAS};
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::api::batch::v1::CronJob;
    use serde_json::{Value, json};

    fn workload(raw: Value) -> Workload {
        let deployment: Deployment = serde_json::from_value(raw).unwrap();
        deployment.into()
    }

    fn deployment(replicas: i32) -> Workload {
        workload(json!({
            "metadata": { "name": "api", "namespace": "prod" },
            "spec": { "replicas": replicas, "selector": {}, "template": {} }
        }))
    }

    fn replicas(workload: &Workload) -> i32 {
        match workload {
            Workload::ReplicaScaled(replica) => replica.replicas().unwrap(),
            Workload::SuspendScaled(_) => panic!("not replica scaled"),
        }
    }

    fn marker(workload: &Workload) -> Option<&str> {
        workload.annotations().get(ANNOTATION_ORIGINAL_REPLICAS).map(String::as_str)
    }

    #[test]
    fn scale_down_records_original_replicas() {
        let mut workload = deployment(3);
        workload.scale_down(0).unwrap();
        assert_eq!(replicas(&workload), 0);
        assert_eq!(marker(&workload), Some("3"));
    }

    #[test]
    fn scale_down_is_idempotent() {
        let mut workload = deployment(3);
        workload.scale_down(0).unwrap();
        let once = workload.clone();
        workload.scale_down(0).unwrap();
        assert!(once.compare(&workload).unwrap().0.is_empty());
        assert_eq!(marker(&workload), Some("3"));
    }

    #[test]
    fn scale_down_to_current_replicas_leaves_no_marker() {
        let mut workload = deployment(0);
        workload.scale_down(0).unwrap();
        assert_eq!(marker(&workload), None);
    }

    #[test]
    fn scale_up_restores_and_removes_marker() {
        let mut workload = deployment(5);
        workload.scale_down(1).unwrap();
        workload.scale_up().unwrap();
        assert_eq!(replicas(&workload), 5);
        assert_eq!(marker(&workload), None);
    }

    #[test]
    fn scale_up_without_marker_is_a_noop() {
        let original = deployment(2);
        let mut workload = original.clone();
        workload.scale_up().unwrap();
        assert!(original.compare(&workload).unwrap().0.is_empty());
    }

    #[test]
    fn scale_up_with_malformed_marker_fails() {
        let mut workload = workload(json!({
            "metadata": {
                "name": "api",
                "namespace": "prod",
                "annotations": { ANNOTATION_ORIGINAL_REPLICAS: "three" }
            },
            "spec": { "replicas": 0, "selector": {}, "template": {} }
        }));
        let err = workload.scale_up().unwrap_err();
        assert!(matches!(err, Error::MalformedAnnotation { .. }));
        assert_eq!(replicas(&workload), 0);
    }

    #[test]
    fn scale_down_without_replicas_fails() {
        let mut workload = workload(json!({
            "metadata": { "name": "api", "namespace": "prod" },
            "spec": { "selector": {}, "template": {} }
        }));
        assert!(matches!(workload.scale_down(0).unwrap_err(), Error::NoReplicas { .. }));
        assert_eq!(marker(&workload), None);
    }

    #[test]
    fn unpaused_scaled_object_round_trips() {
        let scaled_object: crate::kubernetes::crds::ScaledObject = serde_json::from_value(json!({
            "apiVersion": "keda.sh/v1alpha1",
            "kind": "ScaledObject",
            "metadata": { "name": "api", "namespace": "prod" },
            "spec": { "scaleTargetRef": { "name": "api" } }
        }))
        .unwrap();
        let mut workload: Workload = scaled_object.into();

        workload.scale_down(0).unwrap();
        assert_eq!(marker(&workload), Some("-1"));
        assert_eq!(
            workload.annotations().get(ANNOTATION_KEDA_PAUSED_REPLICAS).map(String::as_str),
            Some("0")
        );

        workload.scale_up().unwrap();
        assert!(workload.annotations().is_empty());
    }

    #[test]
    fn cronjob_is_suspended_and_resumed() {
        let cronjob: CronJob = serde_json::from_value(json!({
            "metadata": { "name": "report", "namespace": "ops" },
            "spec": { "schedule": "0 * * * *", "jobTemplate": {} }
        }))
        .unwrap();
        let mut workload: Workload = cronjob.into();
        let suspended = |workload: &Workload| match workload {
            Workload::SuspendScaled(SuspendScaled::CronJob(cronjob)) => cronjob.spec.as_ref().unwrap().suspend,
            _ => panic!("not a cronjob"),
        };

        workload.apply(Scaling::Down, 0).unwrap();
        assert_eq!(suspended(&workload), Some(true));
        workload.apply(Scaling::Up, 0).unwrap();
        assert_eq!(suspended(&workload), Some(false));
        assert!(workload.annotations().is_empty());
    }

    #[test]
    fn ignore_changes_nothing() {
        let original = deployment(3);
        let mut workload = original.clone();
        workload.apply(Scaling::Ignore, 0).unwrap();
        assert!(original.compare(&workload).unwrap().0.is_empty());
    }
}
