use crate::{
    crds::{ClusterScan, ClusterScanStatus},
    error::Result,
    store::ScanStore,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

/// Helper to update status.
///
/// Starts from the status `scan` was fetched with, so the write is rejected by the
/// store if the scan changed in between.
pub async fn update_status<S, F>(store: &S, scan: &ClusterScan, mutate: F) -> Result<()>
where
    S: ScanStore + ?Sized,
    F: FnOnce(&mut ClusterScanStatus),
{
    let mut status = scan.status.clone().unwrap_or_default();
    mutate(&mut status);
    store.write_status(scan, &status).await
}

/// Record the child currently backing `scan`.
///
/// `child_name` always replaces the previous value. `last_run_time` is only
/// written when given, so a recurring scan keeps the stamp of an earlier one-off run.
pub async fn record_child<S>(
    store: &S,
    scan: &ClusterScan,
    child_name: &str,
    last_run_time: Option<Time>,
) -> Result<()>
where
    S: ScanStore + ?Sized,
{
    update_status(store, scan, |status| {
        status.child_name = Some(child_name.to_string());
        if let Some(last_run_time) = last_run_time {
            status.last_run_time = Some(last_run_time);
        }
    })
    .await
}
