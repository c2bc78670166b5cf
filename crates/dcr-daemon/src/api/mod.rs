//! HTTP API of the event node

pub mod rest;

pub use rest::router::create_router;
