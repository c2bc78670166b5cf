//! Role-based authorization for execution

use crate::error::{EventError, EventResult};
use crate::storage::Storage;
use dcr_types::{EventKey, RoleDto};
use std::sync::Arc;
use tracing::debug;

/// Grants execution when the caller's roles intersect the event's roles
pub struct RoleAuthorizer {
    storage: Arc<dyn Storage>,
}

impl RoleAuthorizer {
    /// Authorizer reading required roles from `storage`
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Fails with `Argument` if no roles were presented and with
    /// `NotFound` if the event is unknown.
    pub async fn is_authorized(&self, key: &EventKey, caller_roles: Option<&RoleDto>) -> EventResult<bool> {
        let caller_roles = caller_roles
            .ok_or_else(|| EventError::Argument("caller roles are required".to_string()))?;

        let required = self.storage.get_roles(key).await?;
        let authorized = required
            .iter()
            .any(|role| caller_roles.roles.iter().any(|r| r == role));

        debug!(event = %key, authorized, "Role check");
        Ok(authorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{EventCatalog, InMemoryStorage};
    use dcr_types::{EventDefinition, EventState, RelationSet};

    async fn authorizer() -> RoleAuthorizer {
        let storage = Arc::new(InMemoryStorage::new());
        storage
            .create_event(EventDefinition {
                workflow_id: "w1".to_string(),
                event_id: "e1".to_string(),
                name: "Grade".to_string(),
                roles: vec!["Teacher".to_string(), "Admin".to_string()],
                initial_state: EventState::default(),
                relations: RelationSet::default(),
            })
            .await
            .unwrap();
        RoleAuthorizer::new(storage)
    }

    #[tokio::test]
    async fn test_intersecting_roles_authorized() {
        let auth = authorizer().await;
        let key = EventKey::new("w1", "e1");
        let roles = RoleDto::new(["Student", "Admin"]);
        assert!(auth.is_authorized(&key, Some(&roles)).await.unwrap());
    }

    #[tokio::test]
    async fn test_disjoint_roles_rejected() {
        let auth = authorizer().await;
        let key = EventKey::new("w1", "e1");
        let roles = RoleDto::new(["Student"]);
        assert!(!auth.is_authorized(&key, Some(&roles)).await.unwrap());
        assert!(!auth
            .is_authorized(&key, Some(&RoleDto::default()))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_missing_roles_is_argument_error() {
        let auth = authorizer().await;
        let key = EventKey::new("w1", "e1");
        assert!(matches!(
            auth.is_authorized(&key, None).await,
            Err(EventError::Argument(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_event_is_not_found() {
        let auth = authorizer().await;
        let key = EventKey::new("w1", "e404");
        let roles = RoleDto::new(["Teacher"]);
        assert!(matches!(
            auth.is_authorized(&key, Some(&roles)).await,
            Err(EventError::NotFound(_))
        ));
    }
}
