//! # Compiled-Artifact Cache Module
//!
//! Concurrent storage for workflow definitions and their compiled forms.
//! The definition store is authoritative: replacing or removing a workflow
//! evicts every compiled variant keyed under it. Compiled entries are
//! immutable once inserted and never expire implicitly.
//!
//! A removal sweeping compiled variants can race a concurrent insert of a
//! fresh variant for the same workflow; the freshly inserted entry may
//! survive until the next explicit removal. That staleness is tolerated by
//! design since subsequent compiles always read the definition store.

use crate::engine::compiler::CompiledWorkflow;
use crate::engine::workflow::Workflow;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Concurrent store of workflow definitions and compiled artifacts.
#[derive(Default)]
pub(crate) struct RulesCache {
    workflows: DashMap<String, Arc<Workflow>>,
    compiled: DashMap<String, Arc<CompiledWorkflow>>,
}

impl RulesCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Cache key for a workflow compiled against one input signature.
    pub(crate) fn compiled_key(workflow_name: &str, signature: &str) -> String {
        format!("{workflow_name}::{signature}")
    }

    /// Insert or replace a workflow definition, evicting its compiled
    /// variants.
    pub(crate) fn put_workflow(&self, workflow: Workflow) {
        let name = workflow.workflow_name.clone();
        self.workflows.insert(name.clone(), Arc::new(workflow));
        self.evict_compiled(&name);
    }

    pub(crate) fn get_workflow(&self, name: &str) -> Option<Arc<Workflow>> {
        self.workflows.get(name).map(|entry| Arc::clone(&entry))
    }

    pub(crate) fn contains_workflow(&self, name: &str) -> bool {
        self.workflows.contains_key(name)
    }

    pub(crate) fn workflow_names(&self) -> Vec<String> {
        self.workflows
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Remove a workflow definition and its compiled variants. Returns
    /// whether a definition was present.
    pub(crate) fn remove_workflow(&self, name: &str) -> bool {
        let removed = self.workflows.remove(name).is_some();
        self.evict_compiled(name);
        removed
    }

    pub(crate) fn clear(&self) {
        self.workflows.clear();
        self.compiled.clear();
    }

    pub(crate) fn get_compiled(&self, key: &str) -> Option<Arc<CompiledWorkflow>> {
        self.compiled.get(key).map(|entry| Arc::clone(&entry))
    }

    pub(crate) fn insert_compiled(&self, key: String, compiled: Arc<CompiledWorkflow>) {
        self.compiled.insert(key, compiled);
    }

    /// Evict every compiled entry keyed under `workflow_name`.
    fn evict_compiled(&self, workflow_name: &str) {
        let prefix = format!("{workflow_name}::");
        self.compiled.retain(|key, _| !key.starts_with(&prefix));
    }
}

struct MemCacheInner<T> {
    entries: HashMap<String, (T, DateTime<Utc>)>,
    /// Insertion order for oldest-first eviction.
    order: VecDeque<String>,
}

/// Bounded memoization cache with per-entry TTL and oldest-inserted-first
/// eviction beyond the size limit.
pub(crate) struct MemCache<T> {
    inner: Mutex<MemCacheInner<T>>,
    size_limit: usize,
    ttl: Duration,
}

impl<T: Clone> MemCache<T> {
    pub(crate) fn new(size_limit: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(MemCacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            size_limit,
            ttl,
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<T> {
        let mut inner = self.inner.lock();
        let expired = match inner.entries.get(key) {
            None => return None,
            Some((_, inserted_at)) => {
                let age = Utc::now().signed_duration_since(*inserted_at);
                age.to_std().map(|age| age > self.ttl).unwrap_or(false)
            }
        };
        if expired {
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            return None;
        }
        inner.entries.get(key).map(|(value, _)| value.clone())
    }

    pub(crate) fn insert(&self, key: String, value: T) {
        let mut inner = self.inner.lock();
        if inner.entries.insert(key.clone(), (value, Utc::now())).is_none() {
            inner.order.push_back(key);
        }
        while inner.entries.len() > self.size_limit {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    /// Drop every entry whose key starts with `prefix`; used when a
    /// workflow is replaced or removed so the memo cannot serve a compiled
    /// rule for a stale definition.
    pub(crate) fn remove_prefix(&self, prefix: &str) {
        let mut inner = self.inner.lock();
        inner.entries.retain(|key, _| !key.starts_with(prefix));
        inner.order.retain(|key| !key.starts_with(prefix));
    }

    pub(crate) fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }
}
