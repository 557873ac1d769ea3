use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "clusterscan_operator=info,kube=info";

#[derive(Debug, Default)]
pub struct Metrics {
    pub reconcile_count: AtomicU64,
    pub reconcile_errors: AtomicU64,
    pub children_created: AtomicU64,
    pub children_removed: AtomicU64,
    pub status_conflicts: AtomicU64,
}

impl Metrics {
    pub fn record_reconcile(&self) {
        self.reconcile_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.reconcile_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_child_created(&self) {
        self.children_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_child_removed(&self) {
        self.children_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_status_conflict(&self) {
        self.status_conflicts.fetch_add(1, Ordering::Relaxed);
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(not(debug_assertions))]
pub fn init() {
    tracing_subscriber::fmt().with_env_filter(env_filter()).json().init();
}

#[cfg(debug_assertions)]
pub fn init() {
    tracing_subscriber::fmt()
        .pretty()
        .without_time()
        .with_file(false)
        .with_line_number(false)
        .with_env_filter(env_filter())
        .init();
}
