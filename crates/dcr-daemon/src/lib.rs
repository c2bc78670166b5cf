//! DCR event node daemon library
//!
//! This module provides the components of `eventd`:
//! - REST API handlers for the node protocol and administration
//! - Configuration loading
//! - Server lifecycle management

pub mod api;
pub mod config;
pub mod error;
pub mod server;

pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError};
pub use server::Server;
