//! Node administration handlers

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use dcr_types::{EventDefinition, EventKey, EventSummary};

/// Instantiate an event node on this host
pub async fn create_event(
    State(state): State<AppState>,
    Json(definition): Json<EventDefinition>,
) -> ApiResult<StatusCode> {
    state.service.create_event(definition).await?;
    Ok(StatusCode::CREATED)
}

/// List the nodes of a workflow hosted here
pub async fn list_events(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> ApiResult<Json<Vec<EventSummary>>> {
    Ok(Json(state.service.list_events(&workflow_id).await?))
}

/// Remove an event node
pub async fn delete_event(
    State(state): State<AppState>,
    Path((workflow_id, event_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state
        .service
        .delete_event(&EventKey::new(workflow_id, event_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Restore initial state and break any lock
pub async fn reset_event(
    State(state): State<AppState>,
    Path((workflow_id, event_id)): Path<(String, String)>,
) -> ApiResult<()> {
    state
        .service
        .reset_event(&EventKey::new(workflow_id, event_id))
        .await?;
    Ok(())
}
