//! API request handlers

mod admin;
mod events;
mod health;

pub use admin::*;
pub use events::*;
pub use health::*;
