//! Storage trait definitions

use crate::error::StorageResult;
use async_trait::async_trait;
use dcr_types::{EventDefinition, EventKey, EventState, EventSummary, Relation, RelationKind, RelationSet};
use std::collections::BTreeSet;

/// Combined storage trait
#[async_trait]
pub trait Storage: StateStorage + RelationStorage + LockStorage + EventCatalog + Send + Sync {}

impl<T> Storage for T where T: StateStorage + RelationStorage + LockStorage + EventCatalog + Send + Sync {}

/// Storage for state flags and static node attributes.
///
/// Every getter fails with `StorageError::NotFound` for an unknown node.
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// Check whether the node is hosted here
    async fn exists(&self, key: &EventKey) -> StorageResult<bool>;

    /// Read all three flags at once
    async fn get_state(&self, key: &EventKey) -> StorageResult<EventState>;

    async fn get_name(&self, key: &EventKey) -> StorageResult<String>;

    /// Roles allowed to execute the node
    async fn get_roles(&self, key: &EventKey) -> StorageResult<Vec<String>>;

    async fn set_included(&self, key: &EventKey, value: bool) -> StorageResult<()>;

    async fn set_executed(&self, key: &EventKey, value: bool) -> StorageResult<()>;

    async fn set_pending(&self, key: &EventKey, value: bool) -> StorageResult<()>;

    async fn get_included(&self, key: &EventKey) -> StorageResult<bool> {
        Ok(self.get_state(key).await?.included)
    }

    async fn get_executed(&self, key: &EventKey) -> StorageResult<bool> {
        Ok(self.get_state(key).await?.executed)
    }

    async fn get_pending(&self, key: &EventKey) -> StorageResult<bool> {
        Ok(self.get_state(key).await?.pending)
    }
}

/// Storage for the outgoing relation sets
#[async_trait]
pub trait RelationStorage: Send + Sync {
    /// All four relation sets of a node
    async fn get_relation_set(&self, key: &EventKey) -> StorageResult<RelationSet>;

    async fn get_relations(&self, key: &EventKey, kind: RelationKind) -> StorageResult<BTreeSet<Relation>> {
        Ok(self.get_relation_set(key).await?.get(kind).clone())
    }

    async fn get_conditions(&self, key: &EventKey) -> StorageResult<BTreeSet<Relation>> {
        self.get_relations(key, RelationKind::Condition).await
    }

    async fn get_responses(&self, key: &EventKey) -> StorageResult<BTreeSet<Relation>> {
        self.get_relations(key, RelationKind::Response).await
    }

    async fn get_inclusions(&self, key: &EventKey) -> StorageResult<BTreeSet<Relation>> {
        self.get_relations(key, RelationKind::Inclusion).await
    }

    async fn get_exclusions(&self, key: &EventKey) -> StorageResult<BTreeSet<Relation>> {
        self.get_relations(key, RelationKind::Exclusion).await
    }
}

/// Storage for the lock marker
#[async_trait]
pub trait LockStorage: Send + Sync {
    /// Current lock owner, `None` when unlocked
    async fn get_lock_owner(&self, key: &EventKey) -> StorageResult<Option<String>>;

    async fn set_lock_owner(&self, key: &EventKey, owner: &str) -> StorageResult<()>;

    async fn clear_lock(&self, key: &EventKey) -> StorageResult<()>;
}

/// Node instantiation and administration
#[async_trait]
pub trait EventCatalog: Send + Sync {
    /// Create a node from its definition; `Conflict` if it already exists
    async fn create_event(&self, definition: EventDefinition) -> StorageResult<()>;

    /// Remove a node; returns whether it existed
    async fn delete_event(&self, key: &EventKey) -> StorageResult<bool>;

    /// Restore the initial state flags of a node. The lock is left alone.
    async fn reset_state(&self, key: &EventKey) -> StorageResult<()>;

    /// All nodes of a workflow hosted here
    async fn list_events(&self, workflow_id: &str) -> StorageResult<Vec<EventSummary>>;
}
