//! In-memory storage implementation

use super::traits::*;
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use dcr_types::{EventDefinition, EventKey, EventState, EventSummary, RelationSet};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct EventRecord {
    definition: EventDefinition,
    state: EventState,
    lock_owner: Option<String>,
}

impl EventRecord {
    fn summary(&self) -> EventSummary {
        EventSummary {
            workflow_id: self.definition.workflow_id.clone(),
            event_id: self.definition.event_id.clone(),
            name: self.definition.name.clone(),
            state: self.state,
            lock_owner: self.lock_owner.clone(),
        }
    }
}

/// In-memory storage for development and testing
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    events: Arc<RwLock<HashMap<EventKey, EventRecord>>>,
}

impl InMemoryStorage {
    /// Create a new in-memory storage
    pub fn new() -> Self {
        Self::default()
    }

    async fn read<T>(&self, key: &EventKey, f: impl FnOnce(&EventRecord) -> T) -> StorageResult<T> {
        let events = self.events.read().await;
        events.get(key).map(f).ok_or_else(|| not_found(key))
    }

    async fn write(&self, key: &EventKey, f: impl FnOnce(&mut EventRecord)) -> StorageResult<()> {
        let mut events = self.events.write().await;
        let record = events.get_mut(key).ok_or_else(|| not_found(key))?;
        f(record);
        Ok(())
    }
}

fn not_found(key: &EventKey) -> StorageError {
    StorageError::NotFound(format!("Event {} not found", key))
}

#[async_trait]
impl StateStorage for InMemoryStorage {
    async fn exists(&self, key: &EventKey) -> StorageResult<bool> {
        Ok(self.events.read().await.contains_key(key))
    }

    async fn get_state(&self, key: &EventKey) -> StorageResult<EventState> {
        self.read(key, |r| r.state).await
    }

    async fn get_name(&self, key: &EventKey) -> StorageResult<String> {
        self.read(key, |r| r.definition.name.clone()).await
    }

    async fn get_roles(&self, key: &EventKey) -> StorageResult<Vec<String>> {
        self.read(key, |r| r.definition.roles.clone()).await
    }

    async fn set_included(&self, key: &EventKey, value: bool) -> StorageResult<()> {
        self.write(key, |r| r.state.included = value).await
    }

    async fn set_executed(&self, key: &EventKey, value: bool) -> StorageResult<()> {
        self.write(key, |r| r.state.executed = value).await
    }

    async fn set_pending(&self, key: &EventKey, value: bool) -> StorageResult<()> {
        self.write(key, |r| r.state.pending = value).await
    }
}

#[async_trait]
impl RelationStorage for InMemoryStorage {
    async fn get_relation_set(&self, key: &EventKey) -> StorageResult<RelationSet> {
        self.read(key, |r| r.definition.relations.clone()).await
    }
}

#[async_trait]
impl LockStorage for InMemoryStorage {
    async fn get_lock_owner(&self, key: &EventKey) -> StorageResult<Option<String>> {
        self.read(key, |r| r.lock_owner.clone()).await
    }

    async fn set_lock_owner(&self, key: &EventKey, owner: &str) -> StorageResult<()> {
        self.write(key, |r| r.lock_owner = Some(owner.to_string())).await
    }

    async fn clear_lock(&self, key: &EventKey) -> StorageResult<()> {
        self.write(key, |r| r.lock_owner = None).await
    }
}

#[async_trait]
impl EventCatalog for InMemoryStorage {
    async fn create_event(&self, definition: EventDefinition) -> StorageResult<()> {
        let key = definition.key();
        let mut events = self.events.write().await;
        if events.contains_key(&key) {
            return Err(StorageError::Conflict(format!("Event {} already exists", key)));
        }
        events.insert(
            key,
            EventRecord {
                state: definition.initial_state,
                definition,
                lock_owner: None,
            },
        );
        Ok(())
    }

    async fn delete_event(&self, key: &EventKey) -> StorageResult<bool> {
        Ok(self.events.write().await.remove(key).is_some())
    }

    async fn reset_state(&self, key: &EventKey) -> StorageResult<()> {
        self.write(key, |r| r.state = r.definition.initial_state).await
    }

    async fn list_events(&self, workflow_id: &str) -> StorageResult<Vec<EventSummary>> {
        let events = self.events.read().await;
        let mut summaries: Vec<_> = events
            .values()
            .filter(|r| r.definition.workflow_id == workflow_id)
            .map(EventRecord::summary)
            .collect();
        summaries.sort_by(|a, b| a.event_id.cmp(&b.event_id));
        Ok(summaries)
    }
}
