//! Outgoing DCR relations
//!
//! Each node stores only its *outgoing* relations: whom it must query
//! (Condition) and whom it must notify after executing (Response,
//! Inclusion, Exclusion).

use crate::event::EventKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The four DCR relation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    /// Target must be executed or excluded before the source can execute
    Condition,
    /// Target becomes pending when the source executes
    Response,
    /// Target becomes included when the source executes
    Inclusion,
    /// Target becomes excluded when the source executes
    Exclusion,
}

impl RelationKind {
    pub const ALL: [RelationKind; 4] = [
        RelationKind::Condition,
        RelationKind::Response,
        RelationKind::Inclusion,
        RelationKind::Exclusion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Condition => "condition",
            RelationKind::Response => "response",
            RelationKind::Inclusion => "inclusion",
            RelationKind::Exclusion => "exclusion",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outgoing edge to a (possibly remote) event node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub target_workflow_id: String,
    pub target_event_id: String,
    /// Base URI of the host serving the target node
    pub target_uri: String,
}

impl Relation {
    pub fn new(
        target_workflow_id: impl Into<String>,
        target_event_id: impl Into<String>,
        target_uri: impl Into<String>,
    ) -> Self {
        Self {
            target_workflow_id: target_workflow_id.into(),
            target_event_id: target_event_id.into(),
            target_uri: target_uri.into(),
        }
    }

    pub fn target_key(&self) -> EventKey {
        EventKey::new(self.target_workflow_id.clone(), self.target_event_id.clone())
    }

    /// True if the relation points at `key`, regardless of host
    pub fn targets(&self, key: &EventKey) -> bool {
        self.target_workflow_id == key.workflow_id && self.target_event_id == key.event_id
    }

    pub fn is_blank(&self) -> bool {
        self.target_workflow_id.trim().is_empty()
            || self.target_event_id.trim().is_empty()
            || self.target_uri.trim().is_empty()
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}",
            self.target_workflow_id, self.target_event_id, self.target_uri
        )
    }
}

/// The four outgoing relation sets of one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationSet {
    #[serde(default)]
    pub conditions: BTreeSet<Relation>,
    #[serde(default)]
    pub responses: BTreeSet<Relation>,
    #[serde(default)]
    pub inclusions: BTreeSet<Relation>,
    #[serde(default)]
    pub exclusions: BTreeSet<Relation>,
}

impl RelationSet {
    pub fn get(&self, kind: RelationKind) -> &BTreeSet<Relation> {
        match kind {
            RelationKind::Condition => &self.conditions,
            RelationKind::Response => &self.responses,
            RelationKind::Inclusion => &self.inclusions,
            RelationKind::Exclusion => &self.exclusions,
        }
    }

    pub fn insert(&mut self, kind: RelationKind, relation: Relation) -> bool {
        let set = match kind {
            RelationKind::Condition => &mut self.conditions,
            RelationKind::Response => &mut self.responses,
            RelationKind::Inclusion => &mut self.inclusions,
            RelationKind::Exclusion => &mut self.exclusions,
        };
        set.insert(relation)
    }

    pub fn with(mut self, kind: RelationKind, relation: Relation) -> Self {
        self.insert(kind, relation);
        self
    }

    /// Every relation paired with its kind
    pub fn iter(&self) -> impl Iterator<Item = (RelationKind, &Relation)> {
        RelationKind::ALL
            .into_iter()
            .flat_map(move |kind| self.get(kind).iter().map(move |r| (kind, r)))
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
            && self.responses.is_empty()
            && self.inclusions.is_empty()
            && self.exclusions.is_empty()
    }

    /// Response ∪ Inclusion ∪ Exclusion, deduplicated by target.
    ///
    /// These are the nodes an execution mutates and therefore must lock.
    pub fn dependents(&self) -> BTreeSet<Relation> {
        self.responses
            .iter()
            .chain(self.inclusions.iter())
            .chain(self.exclusions.iter())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependents_deduplicate_targets() {
        let e2 = Relation::new("w1", "e2", "http://host-b");
        let e3 = Relation::new("w1", "e3", "http://host-c");
        let relations = RelationSet::default()
            .with(RelationKind::Response, e2.clone())
            .with(RelationKind::Exclusion, e2.clone())
            .with(RelationKind::Inclusion, e3.clone())
            .with(RelationKind::Condition, Relation::new("w1", "e4", "http://host-d"));

        let dependents = relations.dependents();
        assert_eq!(dependents.len(), 2);
        assert!(dependents.contains(&e2));
        assert!(dependents.contains(&e3));
    }

    #[test]
    fn test_iter_reports_kinds() {
        let relations = RelationSet::default()
            .with(RelationKind::Condition, Relation::new("w1", "e2", "http://a"))
            .with(RelationKind::Exclusion, Relation::new("w1", "e3", "http://a"));

        let kinds: Vec<_> = relations.iter().map(|(kind, _)| kind).collect();
        assert_eq!(kinds, vec![RelationKind::Condition, RelationKind::Exclusion]);
    }

    #[test]
    fn test_targets_ignores_host() {
        let relation = Relation::new("w1", "e2", "http://a");
        assert!(relation.targets(&EventKey::new("w1", "e2")));
        assert!(!relation.targets(&EventKey::new("w2", "e2")));
    }
}
