//! Spec.md §6's three non-streaming contracts: submission, status
//! query, and log query, plus cancellation. Account CRUD, flow CRUD,
//! and authentication middleware are out of scope (§1) — every
//! handler here trusts the `account_id` path segment verbatim, the
//! way a unit-tested core would when the auth layer in front of it is
//! somebody else's concern.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::Json;
use flowrunner_core::{AccountId, ExecutionId, FlowId};
use flowrunner_workflow::FlowDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::state::AppState;

/// Body of a submission request. `flow` is taken inline rather than
/// looked up by `flow_id` from a flow store — the pluggable flow CRUD
/// surface is out of scope for this crate (spec.md §1); a deployment
/// that has one resolves `flow_id` to a `FlowDescriptor` in front of
/// this handler and calls straight through.
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub flow_id: FlowId,
    pub flow: FlowDescriptor,
    #[serde(default)]
    pub input: Value,
    /// Optional execution-level deadline, per spec.md §5 "Timeouts".
    pub deadline_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub execution_id: ExecutionId,
}

pub async fn submit(
    State(state): State<AppState>,
    Path(account_id): Path<AccountId>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let deadline = request.deadline_ms.map(Duration::from_millis);
    let execution_id = state
        .manager
        .start(account_id, request.flow_id, request.flow, request.input, deadline)
        .await?;
    Ok(Json(SubmitResponse { execution_id }))
}

pub async fn status(
    State(state): State<AppState>,
    Path(execution_id): Path<ExecutionId>,
) -> Result<Json<flowrunner_execution::ExecutionRecord>, ApiError> {
    state
        .manager
        .status(execution_id)
        .await
        .map(Json)
        .ok_or(ApiError::Manager(flowrunner_manager::ManagerError::NotFound(execution_id)))
}

pub async fn logs(
    State(state): State<AppState>,
    Path(execution_id): Path<ExecutionId>,
) -> Json<Vec<flowrunner_execution::LogEntry>> {
    Json(state.manager.logs(execution_id).await)
}

pub async fn cancel(State(state): State<AppState>, Path(execution_id): Path<ExecutionId>) -> Result<(), ApiError> {
    state.manager.cancel(execution_id)?;
    Ok(())
}
