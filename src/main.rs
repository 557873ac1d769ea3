use clusterscan_operator::{
    config::ControllerConfig,
    crds::ClusterScan,
    reconciler::{self, Context},
    store::KubeStore,
    telemetry::{self, Metrics},
};
use futures::StreamExt;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use kube::{
    runtime::{
        controller::Controller, predicates, reflector, watcher, watcher::Config as WatcherConfig,
        WatchStreamExt,
    },
    Api, Client, Resource,
};
use serde::de::DeserializeOwned;
use std::{fmt::Debug, sync::Arc};
use tracing::{debug, info};

/// Cluster-wide API, or one namespace when the controller is restricted
fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();
    let metrics = Arc::new(Metrics::default());

    info!("Starting ClusterScan controller");
    let config = Arc::new(ControllerConfig::load()?);
    info!("Configuration loaded: {:?}", config);
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let namespace = config.watch_namespace.as_deref();
    let scans = scoped_api::<ClusterScan>(&client, namespace);
    // children are watched so that an externally deleted Job or CronJob is recreated
    let jobs = scoped_api::<Job>(&client, namespace);
    let cron_jobs = scoped_api::<CronJob>(&client, namespace);

    let ctx = Arc::new(Context::new(
        KubeStore::new(client.clone()),
        config.clone(),
        metrics,
    ));

    // status writes leave the generation alone, so the controller's own status
    // updates do not trigger another reconcile; the resync requeue still runs
    let (reader, writer) = reflector::store();
    let scan_changes = watcher(scans, WatcherConfig::default())
        .default_backoff()
        .reflect(writer)
        .applied_objects()
        .predicate_filter(predicates::generation);

    info!("Starting controller loop");
    Controller::for_stream(scan_changes, reader)
        .owns(jobs, WatcherConfig::default())
        .owns(cron_jobs, WatcherConfig::default())
        .shutdown_on_signal()
        .run(
            reconciler::reconcile::<KubeStore>,
            reconciler::error_policy::<KubeStore>,
            ctx,
        )
        .for_each(|res| async move {
            match res {
                Ok(o) => debug!("Reconciled: {:?}", o),
                // if the object cannot be found it was likely deleted. we can ignore this.
                Err(kube::runtime::controller::Error::ObjectNotFound(_)) => {}
                Err(e) => tracing::warn!("[!] Reconciliation error: {:?}", e),
            }
        })
        .await;

    info!("Controller stopped");
    Ok(())
}
