//! Access to ClusterScans and their children
//!
//! The reconciler only talks to the cluster through [`ScanStore`], which keeps the
//! convergence logic testable without an API server.

use crate::{
    crds::{ClusterScan, ClusterScanStatus},
    error::{Error, Result},
    resources::{ChildKind, ChildWorkload},
};
use async_trait::async_trait;
use k8s_openapi::{
    api::batch::v1::{CronJob, Job},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::{
    api::{Api, DeleteParams, Patch, PatchParams, PostParams},
    Client, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

#[cfg(test)]
pub mod memory;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Fetch a ClusterScan, `None` if it does not exist
    async fn get_scan(&self, namespace: &str, name: &str) -> Result<Option<ClusterScan>>;

    /// Fetch the metadata of a child, `None` if it does not exist
    async fn get_child(
        &self,
        namespace: &str,
        kind: ChildKind,
        name: &str,
    ) -> Result<Option<ObjectMeta>>;

    /// Create a child. Fails with [`Error::AlreadyExists`] if the name is taken.
    async fn create_child(&self, child: &ChildWorkload) -> Result<()>;

    /// Delete a child and its pods. Deleting a missing child succeeds.
    async fn delete_child(&self, namespace: &str, kind: ChildKind, name: &str) -> Result<()>;

    /// Replace the status of `scan`, failing with [`Error::StatusConflict`] if the
    /// stored object is newer than `scan`
    async fn write_status(&self, scan: &ClusterScan, status: &ClusterScanStatus) -> Result<()>;
}

/// [`ScanStore`] backed by the Kubernetes API server
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ScanStore for KubeStore {
    async fn get_scan(&self, namespace: &str, name: &str) -> Result<Option<ClusterScan>> {
        let api: Api<ClusterScan> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(scan) => Ok(Some(scan)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_child(
        &self,
        namespace: &str,
        kind: ChildKind,
        name: &str,
    ) -> Result<Option<ObjectMeta>> {
        match kind {
            ChildKind::Job => {
                get_metadata(Api::<Job>::namespaced(self.client.clone(), namespace), name).await
            }
            ChildKind::CronJob => {
                get_metadata(Api::<CronJob>::namespaced(self.client.clone(), namespace), name)
                    .await
            }
        }
    }

    async fn create_child(&self, child: &ChildWorkload) -> Result<()> {
        let namespace = child.namespace();
        match child {
            ChildWorkload::SingleRun(job) => {
                create(Api::namespaced(self.client.clone(), namespace), ChildKind::Job, job).await
            }
            ChildWorkload::Scheduled(cron_job) => {
                create(
                    Api::namespaced(self.client.clone(), namespace),
                    ChildKind::CronJob,
                    cron_job,
                )
                .await
            }
        }
    }

    async fn delete_child(&self, namespace: &str, kind: ChildKind, name: &str) -> Result<()> {
        match kind {
            ChildKind::Job => {
                delete(Api::<Job>::namespaced(self.client.clone(), namespace), kind, name).await
            }
            ChildKind::CronJob => {
                delete(Api::<CronJob>::namespaced(self.client.clone(), namespace), kind, name)
                    .await
            }
        }
    }

    async fn write_status(&self, scan: &ClusterScan, status: &ClusterScanStatus) -> Result<()> {
        let name = scan.name_any();
        let namespace = scan
            .namespace()
            .ok_or_else(|| Error::MissingNamespace(name.clone()))?;
        let api: Api<ClusterScan> = Api::namespaced(self.client.clone(), &namespace);

        // resourceVersion in a merge patch acts as a precondition on the write
        let patch = match scan.resource_version() {
            Some(resource_version) => serde_json::json!({
                "metadata": { "resourceVersion": resource_version },
                "status": status
            }),
            None => serde_json::json!({ "status": status }),
        };

        match api
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                Err(Error::StatusConflict { namespace, name })
            }
            Err(e) => Err(e.into()),
        }
    }
}

async fn get_metadata<K>(api: Api<K>, name: &str) -> Result<Option<ObjectMeta>>
where
    K: kube::Resource + Clone + DeserializeOwned + Debug,
{
    match api.get(name).await {
        Ok(obj) => Ok(Some(obj.meta().clone())),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn create<K>(api: Api<K>, kind: ChildKind, obj: &K) -> Result<()>
where
    K: kube::Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    let name = obj.meta().name.clone().unwrap_or_default();
    match api.create(&PostParams::default(), obj).await {
        Ok(_) => {
            debug!("Created {} {}", kind, name);
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 409 => Err(Error::AlreadyExists {
            kind: kind.as_str(),
            name,
        }),
        Err(e) => Err(e.into()),
    }
}

async fn delete<K>(api: Api<K>, kind: ChildKind, name: &str) -> Result<()>
where
    K: kube::Resource + Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::background()).await {
        Ok(_) => {
            debug!("Deleted {} {}", kind, name);
            Ok(())
        }
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            debug!("{} {} already deleted", kind, name);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
