//! DCR Types - Core types for distributed DCR-graph event nodes
//!
//! A workflow is a graph of autonomous *event nodes*. Each node owns its
//! Executed/Included/Pending flags and the outgoing relation sets
//! (Condition, Response, Inclusion, Exclusion) pointing at nodes that may
//! live on other hosts. There is no global graph object: the graph is the
//! union of every node's outgoing relations.
//!
//! ## Key Concepts
//!
//! - **EventKey**: `(workflowId, eventId)` identity of a node
//! - **EventState**: the three independent state flags
//! - **Relation**: an outgoing edge to a (possibly remote) node
//! - **DTOs**: the JSON bodies exchanged between nodes over HTTP

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod dto;
pub mod event;
pub mod relation;

pub use dto::{EventAddressDto, EventStateDto, LockDto, RoleDto};
pub use event::{owner_id, EventDefinition, EventKey, EventState, EventSummary, InvalidDefinition};
pub use relation::{Relation, RelationKind, RelationSet};
