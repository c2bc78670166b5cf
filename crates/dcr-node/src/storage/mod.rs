//! Persistent state store for hosted event nodes
//!
//! One record per `(workflowId, eventId)`: the state flags, the four
//! outgoing relation sets, the role set and the lock owner.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod traits;

pub use memory::InMemoryStorage;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStorage;
pub use traits::{EventCatalog, LockStorage, RelationStorage, StateStorage, Storage};
