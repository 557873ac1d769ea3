//! Child workload construction
//!
//! A ClusterScan is materialized as exactly one child: a Job for one-off scans or a
//! CronJob for recurring ones. Child names are derived from the scan name only, so
//! re-deriving a name always gives the same answer.

use crate::{
    crds::{ClusterScan, ScanMode},
    resources::labels,
};
use k8s_openapi::{
    api::{
        batch::v1::{CronJob, CronJobSpec, Job, JobSpec, JobTemplateSpec},
        core::v1::{Container, PodSpec, PodTemplateSpec},
    },
    apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference},
};
use kube::{Resource, ResourceExt};
use std::fmt;

const CONTAINER_NAME: &str = "scan";
const RESTART_POLICY: &str = "OnFailure";
const SINGLE_RUN_MESSAGE: &str = "echo Scan completed";
const SCHEDULED_MESSAGE: &str = "echo Recurring scan completed";

/// The two kinds of object a scan can be materialized as
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChildKind {
    Job,
    CronJob,
}

impl ChildKind {
    pub fn for_mode(mode: ScanMode<'_>) -> Self {
        match mode {
            ScanMode::SingleRun => ChildKind::Job,
            ScanMode::Scheduled { .. } => ChildKind::CronJob,
        }
    }

    /// The kind a scan would have been materialized as in the other mode
    pub fn other(self) -> Self {
        match self {
            ChildKind::Job => ChildKind::CronJob,
            ChildKind::CronJob => ChildKind::Job,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChildKind::Job => "Job",
            ChildKind::CronJob => "CronJob",
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            ChildKind::Job => "job",
            ChildKind::CronJob => "cronjob",
        }
    }

    pub fn child_name(self, scan_name: &str) -> String {
        format!("{}-{}", scan_name, self.suffix())
    }
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings shared by every child pod
#[derive(Clone, Debug)]
pub struct WorkloadTemplate {
    pub image: String,
}

/// Desired child object for a scan
#[derive(Clone, Debug)]
pub enum ChildWorkload {
    SingleRun(Job),
    Scheduled(CronJob),
}

impl ChildWorkload {
    /// Build the desired child for `scan`.
    ///
    /// `owner` is embedded as the only owner reference so that deleting the scan
    /// garbage-collects the child. The schedule is copied verbatim; the API server
    /// validates it.
    pub fn build(scan: &ClusterScan, owner: OwnerReference, template: &WorkloadTemplate) -> Self {
        let scan_name = scan.name_any();
        let kind = ChildKind::for_mode(scan.spec.mode());
        let metadata = ObjectMeta {
            name: Some(kind.child_name(&scan_name)),
            namespace: scan.namespace(),
            labels: Some(labels::scan_labels(&scan_name)),
            owner_references: Some(vec![owner]),
            ..Default::default()
        };

        match scan.spec.mode() {
            ScanMode::SingleRun => ChildWorkload::SingleRun(Job {
                metadata,
                spec: Some(job_spec(&scan_name, template, SINGLE_RUN_MESSAGE)),
                ..Default::default()
            }),
            ScanMode::Scheduled { schedule } => ChildWorkload::Scheduled(CronJob {
                metadata,
                spec: Some(CronJobSpec {
                    schedule: schedule.to_string(),
                    job_template: JobTemplateSpec {
                        metadata: Some(ObjectMeta {
                            labels: Some(labels::scan_labels(&scan_name)),
                            ..Default::default()
                        }),
                        spec: Some(job_spec(&scan_name, template, SCHEDULED_MESSAGE)),
                    },
                    ..Default::default()
                }),
                ..Default::default()
            }),
        }
    }

    pub fn kind(&self) -> ChildKind {
        match self {
            ChildWorkload::SingleRun(_) => ChildKind::Job,
            ChildWorkload::Scheduled(_) => ChildKind::CronJob,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ChildWorkload::SingleRun(job) => &job.metadata,
            ChildWorkload::Scheduled(cron_job) => &cron_job.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.metadata().namespace.as_deref().unwrap_or_default()
    }
}

fn job_spec(scan_name: &str, template: &WorkloadTemplate, message: &str) -> JobSpec {
    JobSpec {
        template: PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(labels::scan_labels(scan_name)),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: CONTAINER_NAME.to_string(),
                    image: Some(template.image.clone()),
                    command: Some(vec![
                        "sh".to_string(),
                        "-c".to_string(),
                        message.to_string(),
                    ]),
                    ..Default::default()
                }],
                restart_policy: Some(RESTART_POLICY.to_string()),
                ..Default::default()
            }),
        },
        ..Default::default()
    }
}

/// Identity of the ClusterScan that controls an object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanOwner {
    pub name: String,
    pub uid: String,
}

/// Reverse lookup from a child to its controlling ClusterScan
pub fn owning_scan(meta: &ObjectMeta) -> Option<ScanOwner> {
    let api_version = ClusterScan::api_version(&());
    let kind = ClusterScan::kind(&());
    meta.owner_references
        .as_ref()?
        .iter()
        .find(|o| o.controller == Some(true) && o.kind == kind && o.api_version == api_version)
        .map(|o| ScanOwner {
            name: o.name.clone(),
            uid: o.uid.clone(),
        })
}
