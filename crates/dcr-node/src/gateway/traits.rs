//! Gateway trait definition

use crate::error::GatewayResult;
use async_trait::async_trait;
use dcr_types::{EventAddressDto, LockDto, Relation};

/// Calls against a remote event node.
///
/// Each call maps onto one request against the target's HTTP surface.
/// `target` carries the target's workflow id, event id and host URI.
#[async_trait]
pub trait EventGateway: Send + Sync {
    /// `GET .../executed/{senderId}`
    async fn is_executed(&self, target: &Relation, caller_id: &str) -> GatewayResult<bool>;

    /// `GET .../included/{senderId}`
    async fn is_included(&self, target: &Relation, caller_id: &str) -> GatewayResult<bool>;

    /// `POST .../lock`
    async fn lock(&self, target: &Relation, lock: &LockDto) -> GatewayResult<()>;

    /// `DELETE .../lock/{senderId}`
    async fn unlock(&self, target: &Relation, caller_id: &str) -> GatewayResult<()>;

    /// `PUT .../pending/true`
    async fn send_pending(&self, target: &Relation, caller: &EventAddressDto) -> GatewayResult<()>;

    /// `PUT .../included/{value}`
    async fn send_included(
        &self,
        target: &Relation,
        caller: &EventAddressDto,
        value: bool,
    ) -> GatewayResult<()>;
}
