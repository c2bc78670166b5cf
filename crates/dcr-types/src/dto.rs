//! JSON bodies exchanged between event nodes

use serde::{Deserialize, Serialize};

/// Full state view returned by `GET .../state/{senderId}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStateDto {
    pub id: String,
    pub name: String,
    pub executed: bool,
    pub included: bool,
    pub pending: bool,
    pub executable: bool,
}

/// Body of `POST .../lock`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockDto {
    pub lock_owner: String,
    #[serde(default)]
    pub workflow_id: String,
    #[serde(default)]
    pub event_id: String,
}

impl LockDto {
    pub fn new(
        lock_owner: impl Into<String>,
        workflow_id: impl Into<String>,
        event_id: impl Into<String>,
    ) -> Self {
        Self {
            lock_owner: lock_owner.into(),
            workflow_id: workflow_id.into(),
            event_id: event_id.into(),
        }
    }
}

/// Body of `PUT .../executed`: the roles the caller acts under
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDto {
    pub roles: Vec<String>,
}

impl RoleDto {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

/// Address of the calling node, sent as the body of the pending and
/// included pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAddressDto {
    pub workflow_id: String,
    pub id: String,
    pub uri: String,
}

impl EventAddressDto {
    pub fn new(
        workflow_id: impl Into<String>,
        id: impl Into<String>,
        uri: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            id: id.into(),
            uri: uri.into(),
        }
    }

    /// Lock owner id of the calling node
    pub fn owner_id(&self) -> String {
        crate::event::owner_id(&self.workflow_id, &self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_owner_id() {
        let caller = EventAddressDto::new("w1", "e4", "http://node-a:8080");
        assert_eq!(caller.owner_id(), "w1/e4");
    }

    #[test]
    fn test_lock_dto_wire_names() {
        let json = serde_json::to_value(LockDto::new("e1", "w1", "e2")).unwrap();
        assert_eq!(json["lockOwner"], "e1");
        assert_eq!(json["workflowId"], "w1");
        assert_eq!(json["eventId"], "e2");
    }

    #[test]
    fn test_lock_dto_owner_only() {
        let dto: LockDto = serde_json::from_str(r#"{"lockOwner":"e9"}"#).unwrap();
        assert_eq!(dto.lock_owner, "e9");
        assert!(dto.workflow_id.is_empty());
    }

    #[test]
    fn test_state_dto_wire_names() {
        let dto = EventStateDto {
            id: "e1".into(),
            name: "Register".into(),
            executed: true,
            included: true,
            pending: false,
            executable: false,
        };
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["executable"], false);
        assert_eq!(json["id"], "e1");
    }
}
