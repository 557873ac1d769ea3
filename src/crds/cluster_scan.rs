use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// ClusterScan asks the controller to run a scan once or on a schedule.
/// The controller materializes it as a Job (`oneOff: true`) or a CronJob.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "scans.mydomain.com",
    version = "v1",
    kind = "ClusterScan",
    plural = "clusterscans",
    singular = "clusterscan",
    shortname = "cscan",
    namespaced,
    status = "ClusterScanStatus",
    printcolumn = r#"{"name":"OneOff", "type":"boolean", "jsonPath":".spec.oneOff"}"#,
    printcolumn = r#"{"name":"Schedule", "type":"string", "jsonPath":".spec.schedule"}"#,
    printcolumn = r#"{"name":"Child", "type":"string", "jsonPath":".status.childName"}"#,
    printcolumn = r#"{"name":"LastRun", "type":"date", "jsonPath":".status.lastRunTime"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterScanSpec {
    /// Cron expression for recurring scans, ignored when `oneOff` is set.
    /// Passed to the CronJob as is.
    #[serde(default)]
    pub schedule: String,

    /// Run the scan exactly once instead of on a schedule
    #[serde(default)]
    pub one_off: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterScanStatus {
    /// When the controller last started a one-off run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_time: Option<Time>,

    /// Name of the Job or CronJob currently backing this scan
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_name: Option<String>,
}

/// How a scan is run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanMode<'a> {
    SingleRun,
    Scheduled { schedule: &'a str },
}

impl ClusterScanSpec {
    pub fn mode(&self) -> ScanMode<'_> {
        if self.one_off {
            ScanMode::SingleRun
        } else {
            ScanMode::Scheduled {
                schedule: &self.schedule,
            }
        }
    }
}
