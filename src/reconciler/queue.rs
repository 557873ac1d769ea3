//! At-least-once event delivery for driving the reconciler in tests.
//!
//! Events are `(key, cause)` pairs. Nothing is ordered between keys, duplicates are
//! allowed, and a failed invocation puts its key back at the end of the queue the way
//! the controller runtime requeues on error.

use super::{reconcile_key, Context, ScanKey};
use crate::{
    crds::ClusterScan,
    error::Result,
    resources::ChildKind,
    store::{memory::MemoryStore, ScanStore},
};
use kube::runtime::controller::Action;
use std::collections::{HashMap, VecDeque};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cause {
    ScanChanged,
    ChildChanged(ChildKind),
    Requeue,
}

#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<(ScanKey, Cause)>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: &ScanKey, cause: Cause) {
        self.events.push_back((key.clone(), cause));
    }

    /// Deliver the same event `times` times
    pub fn push_duplicated(&mut self, key: &ScanKey, cause: Cause, times: usize) {
        for _ in 0..times {
            self.push(key, cause);
        }
    }

    /// Reverse delivery order, so later events overtake earlier ones
    pub fn reverse(&mut self) {
        self.events.make_contiguous().reverse();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Deliver events until the queue is empty or `max_invocations` is reached.
    /// Retryable failures are redelivered.
    pub async fn drain<S: ScanStore>(
        &mut self,
        ctx: &Context<S>,
        max_invocations: usize,
    ) -> Vec<(ScanKey, Result<Action>)> {
        let mut results = Vec::new();
        while results.len() < max_invocations {
            let Some((key, _cause)) = self.events.pop_front() else {
                break;
            };
            let result = self.deliver(&key, ctx).await;
            results.push((key, result));
        }
        results
    }

    /// Like [`EventQueue::drain`], but also feeds back the writes the reconciler makes
    /// to the scan itself, the way the controller's watch stream would.
    ///
    /// `predicate` plays the role of the watch filter: a `ScanChanged` event is pushed
    /// whenever its value for the stored scan differs from the one last delivered.
    pub async fn drain_watched<P>(
        &mut self,
        ctx: &Context<MemoryStore>,
        max_invocations: usize,
        predicate: P,
    ) -> Vec<(ScanKey, Result<Action>)>
    where
        P: Fn(&ClusterScan) -> Option<u64>,
    {
        let observe = |key: &ScanKey| {
            ctx.store
                .scan(&key.namespace, &key.name)
                .map(|scan| predicate(&scan))
        };

        let mut seen = HashMap::new();
        let mut results = Vec::new();
        while results.len() < max_invocations {
            let Some((key, _cause)) = self.events.pop_front() else {
                break;
            };
            seen.entry(key.clone()).or_insert_with(|| observe(&key));
            let result = self.deliver(&key, ctx).await;

            let observed = observe(&key);
            if seen.get(&key) != Some(&observed) {
                self.push(&key, Cause::ScanChanged);
                seen.insert(key.clone(), observed);
            }
            results.push((key, result));
        }
        results
    }

    async fn deliver<S: ScanStore>(&mut self, key: &ScanKey, ctx: &Context<S>) -> Result<Action> {
        let result = reconcile_key(key, ctx).await;
        if matches!(&result, Err(e) if e.is_retryable()) {
            self.push(key, Cause::Requeue);
        }
        result
    }
}
