//! Event node identity, state flags and definitions

use crate::relation::RelationSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an event node: the workflow it belongs to and its id
/// within that workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventKey {
    pub workflow_id: String,
    pub event_id: String,
}

impl EventKey {
    /// Key of `event_id` within `workflow_id`
    pub fn new(workflow_id: impl Into<String>, event_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            event_id: event_id.into(),
        }
    }

    /// True if either component is empty or whitespace only
    pub fn is_blank(&self) -> bool {
        self.workflow_id.trim().is_empty() || self.event_id.trim().is_empty()
    }

    /// Id this node locks its dependents with and sends as `senderId`
    pub fn owner_id(&self) -> String {
        owner_id(&self.workflow_id, &self.event_id)
    }
}

/// `workflowId/eventId`, so equal event ids of different workflows never
/// share lock ownership
pub fn owner_id(workflow_id: &str, event_id: &str) -> String {
    format!("{}/{}", workflow_id, event_id)
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workflow_id, self.event_id)
    }
}

/// The three independent state flags of an event node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventState {
    pub executed: bool,
    pub included: bool,
    pub pending: bool,
}

impl EventState {
    pub fn new(executed: bool, included: bool, pending: bool) -> Self {
        Self {
            executed,
            included,
            pending,
        }
    }

    /// State after a successful local execution
    pub fn after_execution(self) -> Self {
        Self {
            executed: true,
            pending: false,
            ..self
        }
    }
}

/// Everything needed to instantiate an event node on a host.
///
/// `initial_state` is kept alongside the live state so an administrative
/// reset can restore it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDefinition {
    pub workflow_id: String,
    pub event_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub initial_state: EventState,
    #[serde(default)]
    pub relations: RelationSet,
}

impl EventDefinition {
    pub fn key(&self) -> EventKey {
        EventKey::new(self.workflow_id.clone(), self.event_id.clone())
    }

    /// Check that the definition can be stored
    pub fn validate(&self) -> Result<(), InvalidDefinition> {
        if self.key().is_blank() {
            return Err(InvalidDefinition::MissingId);
        }
        if let Some(relation) = self.relations.iter().find(|(_, r)| r.is_blank()) {
            return Err(InvalidDefinition::IncompleteRelation {
                kind: relation.0.to_string(),
                target: relation.1.target_key().to_string(),
            });
        }
        Ok(())
    }
}

/// Validation failures for [`EventDefinition`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidDefinition {
    #[error("workflow id and event id must be non-empty")]
    MissingId,

    #[error("{kind} relation to {target} is missing a workflow id, event id or uri")]
    IncompleteRelation { kind: String, target: String },
}

/// Read-only overview of a hosted node, used by the listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub workflow_id: String,
    pub event_id: String,
    pub name: String,
    pub state: EventState,
    pub lock_owner: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::{Relation, RelationKind};

    #[test]
    fn test_after_execution_clears_pending() {
        let state = EventState::new(false, true, true).after_execution();
        assert!(state.executed);
        assert!(state.included);
        assert!(!state.pending);
    }

    #[test]
    fn test_blank_key() {
        assert!(EventKey::new("", "e1").is_blank());
        assert!(EventKey::new("w1", "  ").is_blank());
        assert!(!EventKey::new("w1", "e1").is_blank());
    }

    #[test]
    fn test_owner_id_is_workflow_qualified() {
        assert_eq!(EventKey::new("w1", "e1").owner_id(), "w1/e1");
        assert_ne!(
            EventKey::new("w1", "e1").owner_id(),
            EventKey::new("w2", "e1").owner_id()
        );
    }

    #[test]
    fn test_definition_validation() {
        let mut definition = EventDefinition {
            workflow_id: "w1".into(),
            event_id: "e1".into(),
            name: "Register".into(),
            roles: vec!["Teacher".into()],
            initial_state: EventState::new(false, true, false),
            relations: RelationSet::default(),
        };
        assert!(definition.validate().is_ok());

        definition
            .relations
            .insert(RelationKind::Response, Relation::new("w1", "e2", ""));
        assert!(matches!(
            definition.validate(),
            Err(InvalidDefinition::IncompleteRelation { .. })
        ));

        definition.event_id = String::new();
        assert_eq!(definition.validate(), Err(InvalidDefinition::MissingId));
    }

    #[test]
    fn test_definition_defaults_from_json() {
        let json = r#"{"workflowId":"w1","eventId":"e1"}"#;
        let definition: EventDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(definition.initial_state, EventState::default());
        assert!(definition.relations.is_empty());
        assert!(definition.roles.is_empty());
    }
}
