//! Remote node gateway
//!
//! The RPC contract used to query and mutate event nodes on other hosts.

mod http;
mod traits;

pub use http::{HttpEventGateway, HttpGatewayConfig};
pub use traits::EventGateway;
