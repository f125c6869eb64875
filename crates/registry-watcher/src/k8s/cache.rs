//! Snapshot cache of the last observed state of every watched pod.
//!
//! Records are stored behind an [`Arc`] and replaced wholesale, so a reader
//! always sees either the previous or the next snapshot of a pod.

use std::sync::Arc;

use dashmap::DashMap;

use crate::k8s::pod::PodRecord;

/// Concurrency-safe map from pod name to its last observed record.
#[derive(Debug, Default)]
pub struct PodCache {
    pods: DashMap<String, Arc<PodRecord>>,
}

impl PodCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<PodRecord>> {
        self.pods.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Replace the cached record for `name`.
    pub fn set(&self, name: impl Into<String>, record: PodRecord) {
        self.pods.insert(name.into(), Arc::new(record));
    }

    pub fn delete(&self, name: &str) -> Option<Arc<PodRecord>> {
        self.pods.remove(name).map(|(_, record)| record)
    }

    /// Seed the cache from a full listing. Records without metadata have no
    /// identity and are skipped.
    pub fn seed_all(&self, records: impl IntoIterator<Item = PodRecord>) {
        for record in records {
            if let Some(name) = record.name().map(str::to_string) {
                self.set(name, record);
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pods.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }

    /// Names of all cached pods, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pods.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
