//! In-memory [`ScanStore`] for tests
//!
//! Mirrors the API server behaviour the reconciler relies on: create fails on an
//! existing name, status writes are guarded by resourceVersion and never move the
//! generation, and deleting a scan garbage-collects the children it controls. Every operation yields to the runtime
//! first so that concurrent reconciles interleave.

use super::ScanStore;
use crate::{
    crds::{ClusterScan, ClusterScanSpec, ClusterScanStatus},
    error::{Error, Result},
    resources::{owning_scan, ChildKind, ChildWorkload},
};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::{collections::HashMap, sync::Mutex, time::Duration};

type ScanId = (String, String);
type ChildId = (ChildKind, String, String);

#[derive(Default)]
struct State {
    scans: HashMap<ScanId, ClusterScan>,
    children: HashMap<ChildId, ChildWorkload>,
    next_version: u64,
    next_uid: u64,
    mutations: u64,
}

impl State {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every operation, used to exercise reconcile deadlines
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Insert a scan as an external actor would, assigning uid and resourceVersion
    pub fn apply_scan(&self, namespace: &str, name: &str, spec: ClusterScanSpec) -> ClusterScan {
        let mut state = self.state.lock().unwrap();
        let id = (namespace.to_string(), name.to_string());
        let version = state.bump_version();
        let scan = match state.scans.remove(&id) {
            Some(mut existing) => {
                // generation only moves with the spec
                if existing.spec != spec {
                    existing.spec = spec;
                    existing.metadata.generation =
                        Some(existing.metadata.generation.unwrap_or(0) + 1);
                }
                existing.metadata.resource_version = Some(version);
                existing
            }
            None => {
                state.next_uid += 1;
                let mut scan = ClusterScan::new(name, spec);
                scan.metadata.namespace = Some(namespace.to_string());
                scan.metadata.uid = Some(format!("uid-{}", state.next_uid));
                scan.metadata.generation = Some(1);
                scan.metadata.resource_version = Some(version);
                scan
            }
        };
        state.scans.insert(id, scan.clone());
        scan
    }

    /// Store a scan exactly as given, without assigning identity
    pub fn insert_raw_scan(&self, scan: ClusterScan) {
        let mut state = self.state.lock().unwrap();
        let id = (scan.namespace().unwrap_or_default(), scan.name_any());
        state.scans.insert(id, scan);
    }

    /// Delete a scan and cascade to every child it controls
    pub fn delete_scan(&self, namespace: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        let Some(scan) = state.scans.remove(&(namespace.to_string(), name.to_string())) else {
            return;
        };
        let Some(uid) = scan.metadata.uid else {
            return;
        };
        state
            .children
            .retain(|_, child| owning_scan(child.metadata()).map_or(true, |owner| owner.uid != uid));
    }

    /// Put a child in place directly, bypassing create semantics
    pub fn insert_child(&self, child: ChildWorkload) {
        let mut state = self.state.lock().unwrap();
        let id = (
            child.kind(),
            child.namespace().to_string(),
            child.name().to_string(),
        );
        state.children.insert(id, child);
    }

    pub fn scan(&self, namespace: &str, name: &str) -> Option<ClusterScan> {
        let state = self.state.lock().unwrap();
        state
            .scans
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn child(&self, namespace: &str, kind: ChildKind, name: &str) -> Option<ChildWorkload> {
        let state = self.state.lock().unwrap();
        state
            .children
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Names of all children in a namespace, sorted
    pub fn child_names(&self, namespace: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state
            .children
            .keys()
            .filter(|(_, ns, _)| ns == namespace)
            .map(|(_, _, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Number of writes performed through the [`ScanStore`] interface
    pub fn mutations(&self) -> u64 {
        self.state.lock().unwrap().mutations
    }

    async fn pause(&self) {
        match self.latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }
    }
}

#[async_trait]
impl ScanStore for MemoryStore {
    async fn get_scan(&self, namespace: &str, name: &str) -> Result<Option<ClusterScan>> {
        self.pause().await;
        Ok(self.scan(namespace, name))
    }

    async fn get_child(
        &self,
        namespace: &str,
        kind: ChildKind,
        name: &str,
    ) -> Result<Option<ObjectMeta>> {
        self.pause().await;
        Ok(self
            .child(namespace, kind, name)
            .map(|child| child.metadata().clone()))
    }

    async fn create_child(&self, child: &ChildWorkload) -> Result<()> {
        self.pause().await;
        let mut state = self.state.lock().unwrap();
        let id = (
            child.kind(),
            child.namespace().to_string(),
            child.name().to_string(),
        );
        if state.children.contains_key(&id) {
            return Err(Error::AlreadyExists {
                kind: child.kind().as_str(),
                name: child.name().to_string(),
            });
        }
        state.children.insert(id, child.clone());
        state.mutations += 1;
        Ok(())
    }

    async fn delete_child(&self, namespace: &str, kind: ChildKind, name: &str) -> Result<()> {
        self.pause().await;
        let mut state = self.state.lock().unwrap();
        if state
            .children
            .remove(&(kind, namespace.to_string(), name.to_string()))
            .is_some()
        {
            state.mutations += 1;
        }
        Ok(())
    }

    async fn write_status(&self, scan: &ClusterScan, status: &ClusterScanStatus) -> Result<()> {
        self.pause().await;
        let mut state = self.state.lock().unwrap();
        let id = (scan.namespace().unwrap_or_default(), scan.name_any());
        let Some(stored) = state.scans.get(&id) else {
            return Err(Error::StoreUnavailable(format!(
                "ClusterScan {}/{} vanished",
                id.0, id.1
            )));
        };
        if stored.metadata.resource_version != scan.metadata.resource_version {
            let (namespace, name) = id;
            return Err(Error::StatusConflict { namespace, name });
        }
        // an identical write is accepted without producing a new version
        if stored.status.as_ref() == Some(status) {
            return Ok(());
        }

        let version = state.bump_version();
        if let Some(stored) = state.scans.get_mut(&id) {
            // status never moves the generation
            stored.status = Some(status.clone());
            stored.metadata.resource_version = Some(version);
        }
        state.mutations += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_off() -> ClusterScanSpec {
        ClusterScanSpec {
            schedule: String::new(),
            one_off: true,
        }
    }

    fn status(child_name: &str) -> ClusterScanStatus {
        ClusterScanStatus {
            last_run_time: None,
            child_name: Some(child_name.to_string()),
        }
    }

    #[tokio::test]
    async fn test_identical_status_write_keeps_version() {
        let store = MemoryStore::new();
        let scan = store.apply_scan("default", "nightly", one_off());
        store.write_status(&scan, &status("nightly-job")).await.unwrap();
        let written = store.scan("default", "nightly").unwrap();
        assert_ne!(written.metadata.resource_version, scan.metadata.resource_version);

        store.write_status(&written, &status("nightly-job")).await.unwrap();

        let again = store.scan("default", "nightly").unwrap();
        assert_eq!(again.metadata.resource_version, written.metadata.resource_version);
        assert_eq!(store.mutations(), 1);
    }

    #[tokio::test]
    async fn test_rejected_status_write_keeps_version() {
        let store = MemoryStore::new();
        let stale = store.apply_scan("default", "nightly", one_off());
        let current = store.apply_scan("default", "nightly", one_off());

        assert!(store.write_status(&stale, &status("nightly-job")).await.is_err());

        let stored = store.scan("default", "nightly").unwrap();
        assert_eq!(stored.metadata.resource_version, current.metadata.resource_version);
        store.write_status(&stored, &status("nightly-job")).await.unwrap();
    }

    #[tokio::test]
    async fn test_generation_follows_spec_only() {
        let store = MemoryStore::new();
        let scan = store.apply_scan("default", "nightly", one_off());
        assert_eq!(scan.metadata.generation, Some(1));

        store.write_status(&scan, &status("nightly-job")).await.unwrap();
        let scan = store.apply_scan("default", "nightly", one_off());
        assert_eq!(scan.metadata.generation, Some(1));

        let scan = store.apply_scan(
            "default",
            "nightly",
            ClusterScanSpec {
                schedule: "0 * * * *".to_string(),
                one_off: false,
            },
        );
        assert_eq!(scan.metadata.generation, Some(2));
        assert_eq!(scan.status.unwrap().child_name.as_deref(), Some("nightly-job"));
    }
}
