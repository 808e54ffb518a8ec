//! In-memory assignment store using `DashMap`.
//!
//! This is the default backend for tests and single-process use - data is
//! lost on process restart. For persistence, use `SqliteAssignmentStore`.

use super::{Assignment, AssignmentStore, ConversionEvent, ConversionStore, Insertion};
use crate::Result;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;

/// In-memory assignment store using lock-free concurrent hashmap.
///
/// `create_assignment_if_absent` uses the `DashMap` entry API, which holds
/// the key's shard lock across the check and the insert.
///
/// # Example
///
/// ```rust
/// use splitbench::store::{AssignmentStore, MemoryAssignmentStore};
///
/// # async fn example() -> splitbench::Result<()> {
/// let store = MemoryAssignmentStore::new();
/// store.create_assignment_if_absent("exp-1", "user-1", "control").await?;
/// assert!(store.get_assignment("exp-1", "user-1").await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryAssignmentStore {
    assignments: DashMap<(String, String), Assignment>,
    conversions: RwLock<Vec<ConversionEvent>>,
}

impl MemoryAssignmentStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-allocated assignment capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            assignments: DashMap::with_capacity(capacity),
            conversions: RwLock::new(Vec::new()),
        }
    }

    /// Number of stored assignments across all experiments.
    #[must_use]
    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }

    /// Number of stored conversion events across all experiments.
    #[must_use]
    pub fn conversion_count(&self) -> usize {
        self.conversions.read().len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty() && self.conversions.read().is_empty()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.assignments.clear();
        self.conversions.write().clear();
    }
}

impl AssignmentStore for MemoryAssignmentStore {
    async fn get_assignment(&self, experiment_id: &str, actor_key: &str) -> Result<Option<Assignment>> {
        let key = (experiment_id.to_string(), actor_key.to_string());
        Ok(self.assignments.get(&key).map(|a| a.value().clone()))
    }

    async fn create_assignment_if_absent(
        &self,
        experiment_id: &str,
        actor_key: &str,
        variant_id: &str,
    ) -> Result<Insertion> {
        let key = (experiment_id.to_string(), actor_key.to_string());
        let insertion = match self.assignments.entry(key) {
            Entry::Occupied(existing) => Insertion::Existing(existing.get().clone()),
            Entry::Vacant(slot) => {
                let assignment = Assignment::new(experiment_id, actor_key, variant_id);
                slot.insert(assignment.clone());
                Insertion::Created(assignment)
            }
        };
        Ok(insertion)
    }

    async fn list_assignments(&self, experiment_id: &str) -> Result<Vec<Assignment>> {
        let mut assignments: Vec<Assignment> = self
            .assignments
            .iter()
            .filter(|a| a.key().0 == experiment_id)
            .map(|a| a.value().clone())
            .collect();
        assignments.sort_by(|a, b| {
            a.assigned_at()
                .cmp(&b.assigned_at())
                .then_with(|| a.actor_key().cmp(b.actor_key()))
        });
        Ok(assignments)
    }
}

impl ConversionStore for MemoryAssignmentStore {
    async fn record_conversion(&self, event: ConversionEvent) -> Result<()> {
        self.conversions.write().push(event);
        Ok(())
    }

    async fn list_conversions(&self, experiment_id: &str) -> Result<Vec<ConversionEvent>> {
        Ok(self
            .conversions
            .read()
            .iter()
            .filter(|e| e.experiment_id() == experiment_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_get_missing_assignment() {
        let store = MemoryAssignmentStore::new();
        assert_eq!(store.get_assignment("exp-1", "nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_if_absent_never_overwrites() {
        let store = MemoryAssignmentStore::new();

        let first = store
            .create_assignment_if_absent("exp-1", "u1", "green")
            .await
            .unwrap();
        let second = store
            .create_assignment_if_absent("exp-1", "u1", "control")
            .await
            .unwrap();

        assert!(first.is_created());
        assert!(!second.is_created());
        assert_eq!(second.assignment().variant_id(), "green");
        assert_eq!(store.assignment_count(), 1);
    }

    #[tokio::test]
    async fn test_assignments_are_scoped_per_experiment() {
        let store = MemoryAssignmentStore::new();
        store.create_assignment_if_absent("exp-1", "u1", "a").await.unwrap();
        store.create_assignment_if_absent("exp-2", "u1", "b").await.unwrap();
        store.create_assignment_if_absent("exp-1", "u2", "a").await.unwrap();

        assert_eq!(store.list_assignments("exp-1").await.unwrap().len(), 2);
        assert_eq!(store.list_assignments("exp-2").await.unwrap().len(), 1);
        assert!(store.list_assignments("exp-3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_agree() {
        let store = Arc::new(MemoryAssignmentStore::new());
        let mut handles = vec![];

        // 50 racing writers proposing different variants for one actor
        for i in 0..50 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let proposal = format!("variant-{i}");
                store
                    .create_assignment_if_absent("exp-1", "u1", &proposal)
                    .await
                    .unwrap()
            }));
        }

        let mut created = 0;
        let mut variants = std::collections::HashSet::new();
        for handle in handles {
            let insertion = handle.await.unwrap();
            if insertion.is_created() {
                created += 1;
            }
            variants.insert(insertion.assignment().variant_id().to_string());
        }

        assert_eq!(created, 1);
        assert_eq!(variants.len(), 1);
    }

    #[tokio::test]
    async fn test_conversions_filtered_by_experiment() {
        let store = MemoryAssignmentStore::new();
        let a1 = Assignment::new("exp-1", "u1", "green");
        let a2 = Assignment::new("exp-2", "u1", "blue");
        store
            .record_conversion(ConversionEvent::from_assignment(&a1, "download", None))
            .await
            .unwrap();
        store
            .record_conversion(ConversionEvent::from_assignment(&a2, "download", None))
            .await
            .unwrap();

        let events = store.list_conversions("exp-1").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].variant_id(), "green");
        assert_eq!(store.conversion_count(), 2);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = MemoryAssignmentStore::with_capacity(16);
        store.create_assignment_if_absent("exp-1", "u1", "a").await.unwrap();
        assert!(!store.is_empty());
        store.clear();
        assert!(store.is_empty());
    }
}
