//! PostgreSQL storage implementation

use super::traits::*;
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use dcr_types::{EventDefinition, EventKey, EventState, EventSummary, Relation, RelationKind, RelationSet};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::time::Duration;

/// PostgreSQL-backed storage
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect to PostgreSQL and initialize schema
    pub async fn new(url: &str, max_connections: u32, connect_timeout_secs: u64) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let storage = Self { pool };
        storage.initialize_schema().await?;
        Ok(storage)
    }

    async fn initialize_schema(&self) -> StorageResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS dcr_events (
                workflow_id TEXT NOT NULL,
                event_id TEXT NOT NULL,
                name TEXT NOT NULL,
                roles JSONB NOT NULL,
                executed BOOLEAN NOT NULL,
                included BOOLEAN NOT NULL,
                pending BOOLEAN NOT NULL,
                initial_executed BOOLEAN NOT NULL,
                initial_included BOOLEAN NOT NULL,
                initial_pending BOOLEAN NOT NULL,
                lock_owner TEXT,
                PRIMARY KEY (workflow_id, event_id)
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS dcr_relations (
                workflow_id TEXT NOT NULL,
                event_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                target_workflow_id TEXT NOT NULL,
                target_event_id TEXT NOT NULL,
                target_uri TEXT NOT NULL,
                PRIMARY KEY (workflow_id, event_id, kind, target_workflow_id, target_event_id, target_uri),
                FOREIGN KEY (workflow_id, event_id)
                    REFERENCES dcr_events (workflow_id, event_id) ON DELETE CASCADE
            );
            "#,
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(query_error)?;
        }

        Ok(())
    }

    async fn fetch_event_row(&self, key: &EventKey, columns: &str) -> StorageResult<sqlx::postgres::PgRow> {
        let sql = format!(
            "SELECT {} FROM dcr_events WHERE workflow_id = $1 AND event_id = $2",
            columns
        );
        sqlx::query(&sql)
            .bind(&key.workflow_id)
            .bind(&key.event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?
            .ok_or_else(|| not_found(key))
    }

    /// Update one column; fails with `NotFound` if no row matched
    async fn update_event(&self, key: &EventKey, assignment: &str, value: Option<&str>, flag: Option<bool>) -> StorageResult<()> {
        let sql = format!(
            "UPDATE dcr_events SET {} WHERE workflow_id = $1 AND event_id = $2",
            assignment
        );
        let mut query = sqlx::query(&sql).bind(&key.workflow_id).bind(&key.event_id);
        if let Some(flag) = flag {
            query = query.bind(flag);
        }
        if let Some(value) = value {
            query = query.bind(value);
        }
        let result = query.execute(&self.pool).await.map_err(query_error)?;
        if result.rows_affected() == 0 {
            return Err(not_found(key));
        }
        Ok(())
    }

    fn to_json<T: serde::Serialize>(value: &T) -> StorageResult<Value> {
        serde_json::to_value(value)
            .map_err(|e| StorageError::InvalidData(format!("json serialize error: {}", e)))
    }

    fn from_json<T: serde::de::DeserializeOwned>(value: Value) -> StorageResult<T> {
        serde_json::from_value(value)
            .map_err(|e| StorageError::InvalidData(format!("json deserialize error: {}", e)))
    }
}

fn query_error(err: sqlx::Error) -> StorageError {
    StorageError::Query(err.to_string())
}

fn not_found(key: &EventKey) -> StorageError {
    StorageError::NotFound(format!("Event {} not found", key))
}

fn parse_kind(kind: &str) -> StorageResult<RelationKind> {
    RelationKind::ALL
        .into_iter()
        .find(|k| k.as_str() == kind)
        .ok_or_else(|| StorageError::InvalidData(format!("unknown relation kind: {}", kind)))
}

#[async_trait]
impl StateStorage for PostgresStorage {
    async fn exists(&self, key: &EventKey) -> StorageResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM dcr_events WHERE workflow_id = $1 AND event_id = $2)",
        )
        .bind(&key.workflow_id)
        .bind(&key.event_id)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;
        row.try_get::<bool, _>(0).map_err(query_error)
    }

    async fn get_state(&self, key: &EventKey) -> StorageResult<EventState> {
        let row = self
            .fetch_event_row(key, "executed, included, pending")
            .await?;
        Ok(EventState::new(
            row.try_get("executed").map_err(query_error)?,
            row.try_get("included").map_err(query_error)?,
            row.try_get("pending").map_err(query_error)?,
        ))
    }

    async fn get_name(&self, key: &EventKey) -> StorageResult<String> {
        let row = self.fetch_event_row(key, "name").await?;
        row.try_get("name").map_err(query_error)
    }

    async fn get_roles(&self, key: &EventKey) -> StorageResult<Vec<String>> {
        let row = self.fetch_event_row(key, "roles").await?;
        Self::from_json(row.try_get("roles").map_err(query_error)?)
    }

    async fn set_included(&self, key: &EventKey, value: bool) -> StorageResult<()> {
        self.update_event(key, "included = $3", None, Some(value)).await
    }

    async fn set_executed(&self, key: &EventKey, value: bool) -> StorageResult<()> {
        self.update_event(key, "executed = $3", None, Some(value)).await
    }

    async fn set_pending(&self, key: &EventKey, value: bool) -> StorageResult<()> {
        self.update_event(key, "pending = $3", None, Some(value)).await
    }
}

#[async_trait]
impl RelationStorage for PostgresStorage {
    async fn get_relation_set(&self, key: &EventKey) -> StorageResult<RelationSet> {
        if !self.exists(key).await? {
            return Err(not_found(key));
        }

        let rows = sqlx::query(
            "SELECT kind, target_workflow_id, target_event_id, target_uri FROM dcr_relations \
             WHERE workflow_id = $1 AND event_id = $2",
        )
        .bind(&key.workflow_id)
        .bind(&key.event_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        let mut relations = RelationSet::default();
        for row in rows {
            let kind: String = row.try_get("kind").map_err(query_error)?;
            relations.insert(
                parse_kind(&kind)?,
                Relation::new(
                    row.try_get::<String, _>("target_workflow_id").map_err(query_error)?,
                    row.try_get::<String, _>("target_event_id").map_err(query_error)?,
                    row.try_get::<String, _>("target_uri").map_err(query_error)?,
                ),
            );
        }
        Ok(relations)
    }
}

#[async_trait]
impl LockStorage for PostgresStorage {
    async fn get_lock_owner(&self, key: &EventKey) -> StorageResult<Option<String>> {
        let row = self.fetch_event_row(key, "lock_owner").await?;
        row.try_get("lock_owner").map_err(query_error)
    }

    async fn set_lock_owner(&self, key: &EventKey, owner: &str) -> StorageResult<()> {
        self.update_event(key, "lock_owner = $3", Some(owner), None).await
    }

    async fn clear_lock(&self, key: &EventKey) -> StorageResult<()> {
        self.update_event(key, "lock_owner = NULL", None, None).await
    }
}

#[async_trait]
impl EventCatalog for PostgresStorage {
    async fn create_event(&self, definition: EventDefinition) -> StorageResult<()> {
        let key = definition.key();
        let roles = Self::to_json(&definition.roles)?;
        let initial = definition.initial_state;

        let mut tx = self.pool.begin().await.map_err(query_error)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO dcr_events (
                workflow_id, event_id, name, roles,
                executed, included, pending,
                initial_executed, initial_included, initial_pending, lock_owner
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $5, $6, $7, NULL)
            ON CONFLICT (workflow_id, event_id) DO NOTHING
            "#,
        )
        .bind(&key.workflow_id)
        .bind(&key.event_id)
        .bind(&definition.name)
        .bind(roles)
        .bind(initial.executed)
        .bind(initial.included)
        .bind(initial.pending)
        .execute(&mut *tx)
        .await
        .map_err(query_error)?;

        if inserted.rows_affected() == 0 {
            return Err(StorageError::Conflict(format!("Event {} already exists", key)));
        }

        for (kind, relation) in definition.relations.iter() {
            sqlx::query(
                r#"
                INSERT INTO dcr_relations (
                    workflow_id, event_id, kind, target_workflow_id, target_event_id, target_uri
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(&key.workflow_id)
            .bind(&key.event_id)
            .bind(kind.as_str())
            .bind(&relation.target_workflow_id)
            .bind(&relation.target_event_id)
            .bind(&relation.target_uri)
            .execute(&mut *tx)
            .await
            .map_err(query_error)?;
        }

        tx.commit().await.map_err(query_error)?;
        Ok(())
    }

    async fn delete_event(&self, key: &EventKey) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM dcr_events WHERE workflow_id = $1 AND event_id = $2")
            .bind(&key.workflow_id)
            .bind(&key.event_id)
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn reset_state(&self, key: &EventKey) -> StorageResult<()> {
        self.update_event(
            key,
            "executed = initial_executed, included = initial_included, pending = initial_pending",
            None,
            None,
        )
        .await
    }

    async fn list_events(&self, workflow_id: &str) -> StorageResult<Vec<EventSummary>> {
        let rows = sqlx::query(
            "SELECT event_id, name, executed, included, pending, lock_owner FROM dcr_events \
             WHERE workflow_id = $1 ORDER BY event_id",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(EventSummary {
                    workflow_id: workflow_id.to_string(),
                    event_id: row.try_get("event_id").map_err(query_error)?,
                    name: row.try_get("name").map_err(query_error)?,
                    state: EventState::new(
                        row.try_get("executed").map_err(query_error)?,
                        row.try_get("included").map_err(query_error)?,
                        row.try_get("pending").map_err(query_error)?,
                    ),
                    lock_owner: row.try_get("lock_owner").map_err(query_error)?,
                })
            })
            .collect()
    }
}
