use crate::{
    config::ControllerConfig,
    crds::ClusterScan,
    error::{Error, ErrorKind, Result},
    resources::{owning_scan, ChildWorkload, WorkloadTemplate},
    store::ScanStore,
    telemetry::Metrics,
};
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{runtime::controller::Action, Resource, ResourceExt};
use std::{fmt, sync::Arc, time::Duration};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
pub mod queue;
pub mod status;

pub struct Context<S> {
    pub store: S,
    pub config: Arc<ControllerConfig>,
    pub metrics: Arc<Metrics>,
}

impl<S: ScanStore> Context<S> {
    pub fn new(store: S, config: Arc<ControllerConfig>, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            config,
            metrics,
        }
    }

    fn template(&self) -> WorkloadTemplate {
        WorkloadTemplate {
            image: self.config.scan_image.clone(),
        }
    }
}

/// Namespace and name of a ClusterScan
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScanKey {
    pub namespace: String,
    pub name: String,
}

impl ScanKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn from_scan(scan: &ClusterScan) -> Result<Self> {
        let name = scan.name_any();
        let namespace = scan
            .namespace()
            .ok_or_else(|| Error::MissingNamespace(name.clone()))?;
        Ok(Self { namespace, name })
    }
}

impl fmt::Display for ScanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Controller entry point.
///
/// The watched object only names the scan; its contents may already be stale, so the
/// scan is fetched again before anything is decided.
pub async fn reconcile<S: ScanStore>(scan: Arc<ClusterScan>, ctx: Arc<Context<S>>) -> Result<Action> {
    let key = ScanKey::from_scan(&scan)?;
    reconcile_key(&key, &ctx).await
}

/// Converge the children of one ClusterScan, bounded by the configured deadline
#[instrument(skip_all, fields(scan = %key))]
pub async fn reconcile_key<S: ScanStore>(key: &ScanKey, ctx: &Context<S>) -> Result<Action> {
    ctx.metrics.record_reconcile();

    let timeout = ctx.config.reconcile_timeout();
    match tokio::time::timeout(timeout, converge(key, ctx)).await {
        Ok(result) => result,
        Err(_) => Err(Error::DeadlineExceeded {
            key: key.to_string(),
            timeout,
        }),
    }
}

async fn converge<S: ScanStore>(key: &ScanKey, ctx: &Context<S>) -> Result<Action> {
    // deletion is left to owner reference garbage collection
    let Some(scan) = ctx.store.get_scan(&key.namespace, &key.name).await? else {
        debug!("ClusterScan {} not found, nothing to do", key);
        return Ok(Action::await_change());
    };

    let owner = scan
        .controller_owner_ref(&())
        .ok_or_else(|| Error::OwnerReference(key.to_string()))?;
    let desired = ChildWorkload::build(&scan, owner, &ctx.template());

    remove_other_mode_child(&scan, &desired, ctx).await?;
    ensure_child(&desired, ctx).await?;

    // a CronJob's run times belong to the CronJob controller
    let last_run_time = match desired {
        ChildWorkload::SingleRun(_) => Some(Time(Utc::now())),
        ChildWorkload::Scheduled(_) => None,
    };
    if let Err(e) = status::record_child(&ctx.store, &scan, desired.name(), last_run_time).await {
        if e.kind() == ErrorKind::Conflict {
            ctx.metrics.record_status_conflict();
        }
        return Err(e);
    }

    info!("ClusterScan {} converged on {} {}", key, desired.kind(), desired.name());
    Ok(Action::requeue(ctx.config.resync_interval()))
}

/// Create the desired child unless a child with its name is already present
async fn ensure_child<S: ScanStore>(desired: &ChildWorkload, ctx: &Context<S>) -> Result<()> {
    let existing = ctx
        .store
        .get_child(desired.namespace(), desired.kind(), desired.name())
        .await?;
    if existing.is_some() {
        // TODO: compare the existing child against the desired one and patch drift
        debug!("{} {} already exists", desired.kind(), desired.name());
        return Ok(());
    }

    match ctx.store.create_child(desired).await {
        Ok(()) => {
            info!("Created {} {}", desired.kind(), desired.name());
            ctx.metrics.record_child_created();
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            info!("{} {} was created concurrently", desired.kind(), desired.name());
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Delete the child a scan had before its mode changed.
///
/// Only a child controlled by this very scan (same uid) is removed; anything else
/// that happens to carry the name is left alone.
async fn remove_other_mode_child<S: ScanStore>(
    scan: &ClusterScan,
    desired: &ChildWorkload,
    ctx: &Context<S>,
) -> Result<()> {
    let kind = desired.kind().other();
    let name = kind.child_name(&scan.name_any());
    let namespace = desired.namespace();

    let Some(meta) = ctx.store.get_child(namespace, kind, &name).await? else {
        return Ok(());
    };

    match owning_scan(&meta) {
        Some(owner) if scan.metadata.uid.as_deref() == Some(owner.uid.as_str()) => {}
        Some(owner) => {
            warn!(
                "{} {} is controlled by ClusterScan {} (uid {}), leaving it",
                kind, name, owner.name, owner.uid
            );
            return Ok(());
        }
        None => {
            warn!("{} {} is not controlled by a ClusterScan, leaving it", kind, name);
            return Ok(());
        }
    }

    match ctx.store.delete_child(namespace, kind, &name).await {
        Ok(()) => {
            info!("Removed {} {} after mode change", kind, name);
            ctx.metrics.record_child_removed();
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Requeue delay after a failed reconcile
pub fn requeue_delay(error: &Error, config: &ControllerConfig) -> Duration {
    match error.kind() {
        ErrorKind::Conflict | ErrorKind::Transient => config.retry_interval(),
        ErrorKind::Invalid | ErrorKind::Fatal => config.invalid_interval(),
        // both are absorbed inside reconcile, retry quickly if one ever escapes
        ErrorKind::NotFound | ErrorKind::AlreadyExists => config.retry_interval(),
    }
}

/// Error handling for reconciliation
pub fn error_policy<S: ScanStore>(scan: Arc<ClusterScan>, error: &Error, ctx: Arc<Context<S>>) -> Action {
    ctx.metrics.record_error();

    let kind = error.kind();
    if error.is_retryable() {
        warn!("[*] Reconciliation of {} failed ({}): {}", scan.name_any(), kind, error);
    } else {
        error!("[*] Reconciliation of {} failed ({}): {:?}", scan.name_any(), kind, error);
    }

    Action::requeue(requeue_delay(error, &ctx.config))
}
