//! Node-to-node protocol handlers

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, State},
    Json,
};
use dcr_types::{EventAddressDto, EventKey, EventStateDto, LockDto, RoleDto};

/// `{workflowId}/{eventId}/{param}` path segments
type EventParam = Path<(String, String, String)>;

fn parse_flag(value: &str) -> ApiResult<bool> {
    value
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("expected true or false, got '{}'", value)))
}

/// Whether the event has been executed
pub async fn get_executed(
    State(state): State<AppState>,
    Path((workflow_id, event_id, sender_id)): EventParam,
) -> ApiResult<Json<bool>> {
    let key = EventKey::new(workflow_id, event_id);
    Ok(Json(state.service.is_executed(&key, &sender_id).await?))
}

/// Whether the event is included
pub async fn get_included(
    State(state): State<AppState>,
    Path((workflow_id, event_id, sender_id)): EventParam,
) -> ApiResult<Json<bool>> {
    let key = EventKey::new(workflow_id, event_id);
    Ok(Json(state.service.is_included(&key, &sender_id).await?))
}

/// Full state view
pub async fn get_state(
    State(state): State<AppState>,
    Path((workflow_id, event_id, sender_id)): EventParam,
) -> ApiResult<Json<EventStateDto>> {
    let key = EventKey::new(workflow_id, event_id);
    Ok(Json(state.service.get_state(&key, &sender_id).await?))
}

/// Include or exclude the event on behalf of the caller in the body
pub async fn put_included(
    State(state): State<AppState>,
    Path((workflow_id, event_id, value)): EventParam,
    Json(caller): Json<EventAddressDto>,
) -> ApiResult<()> {
    let value = parse_flag(&value)?;
    let key = EventKey::new(workflow_id, event_id);
    state.service.set_included(&key, &caller.owner_id(), value).await?;
    Ok(())
}

/// Set the pending flag on behalf of the caller in the body
pub async fn put_pending(
    State(state): State<AppState>,
    Path((workflow_id, event_id, value)): EventParam,
    Json(caller): Json<EventAddressDto>,
) -> ApiResult<()> {
    let value = parse_flag(&value)?;
    let key = EventKey::new(workflow_id, event_id);
    state.service.set_pending(&key, &caller.owner_id(), value).await?;
    Ok(())
}

/// Execute the event.
///
/// The protocol runs on its own task so that a dropped connection cannot
/// abandon it between locking and unlocking the related events.
pub async fn execute(
    State(state): State<AppState>,
    Path((workflow_id, event_id)): Path<(String, String)>,
    body: Option<Json<RoleDto>>,
) -> ApiResult<Json<bool>> {
    let key = EventKey::new(workflow_id, event_id);
    let roles = body.map(|Json(roles)| roles);
    let service = state.service.clone();

    let executed = tokio::spawn(async move { service.execute(&key, roles.as_ref()).await })
        .await
        .map_err(|e| ApiError::Internal(format!("execution task failed: {}", e)))??;

    Ok(Json(executed))
}

/// Lock the event to `lockOwner`
pub async fn lock(
    State(state): State<AppState>,
    Path((workflow_id, event_id)): Path<(String, String)>,
    Json(lock): Json<LockDto>,
) -> ApiResult<()> {
    let key = EventKey::new(workflow_id, event_id);
    state.service.locks().lock_self(&key, &lock.lock_owner).await?;
    Ok(())
}

/// Release the lock held by `senderId`
pub async fn unlock(
    State(state): State<AppState>,
    Path((workflow_id, event_id, sender_id)): EventParam,
) -> ApiResult<()> {
    let key = EventKey::new(workflow_id, event_id);
    state.service.locks().unlock_self(&key, &sender_id).await?;
    Ok(())
}
