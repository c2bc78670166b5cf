//! DCR Node - core of an autonomous DCR event node
//!
//! An event node enforces the graph invariants itself by calling its
//! neighbors; there is no central coordinator. This crate provides:
//!
//! - [`LockManager`]: the best-effort distributed lock with compensation
//! - [`RoleAuthorizer`]: the role-set intersection gate for execution
//! - [`EventService`]: read accessors, neighbor pushes and the `execute`
//!   transition
//! - [`Storage`]: the per-node persistent state store (in-memory, and
//!   PostgreSQL behind the `postgres` feature)
//! - [`EventGateway`]: the RPC contract towards remote nodes, with the
//!   reqwest-backed [`HttpEventGateway`]

#![deny(unsafe_code)]

pub mod auth;
pub mod error;
pub mod gateway;
pub mod lock;
pub mod service;
pub mod settings;
pub mod storage;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use auth::RoleAuthorizer;
pub use error::{EventError, EventResult, GatewayError, GatewayResult, StorageError, StorageResult};
pub use gateway::{EventGateway, HttpEventGateway, HttpGatewayConfig};
pub use lock::LockManager;
pub use service::EventService;
pub use settings::NodeSettings;
pub use storage::{InMemoryStorage, Storage};

#[cfg(feature = "postgres")]
pub use storage::PostgresStorage;
