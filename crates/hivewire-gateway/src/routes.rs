use crate::server::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use hivewire_core::{HitlVerdict, HivewireError, TenantKeyspace};
use hivewire_pipeline::fleet_summary;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Map pipeline errors onto operator-facing status codes.
fn error_response(err: HivewireError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &err {
        HivewireError::Conflict { .. } | HivewireError::Invariant(_) => StatusCode::CONFLICT,
        HivewireError::Budget(_) => StatusCode::UNPROCESSABLE_ENTITY,
        HivewireError::PlannerUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        HivewireError::Store(msg) if msg.starts_with("no ") => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({"error": err.to_string()})))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok", "service": "hivewire"}))
}

#[derive(Deserialize)]
pub struct HitlListQuery {
    pub tenant: String,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn list_hitl(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HitlListQuery>,
) -> impl IntoResponse {
    let ks = TenantKeyspace::new(&query.tenant);
    match state
        .gate
        .pending(&ks, query.offset, query.limit.min(200))
        .await
    {
        Ok(items) => (StatusCode::OK, Json(json!({"items": items}))),
        Err(err) => error_response(err),
    }
}

#[derive(Deserialize)]
pub struct TenantQuery {
    pub tenant: String,
}

pub async fn decide_hitl(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    Query(query): Query<TenantQuery>,
    Json(verdict): Json<HitlVerdict>,
) -> impl IntoResponse {
    let ks = TenantKeyspace::new(&query.tenant);
    info!(tenant = %query.tenant, task = %task_id, "operator decision received");
    match state.gate.decide(&ks, &task_id, verdict).await {
        Ok(status) => (
            StatusCode::OK,
            Json(json!({"task_id": task_id, "status": status})),
        ),
        Err(err) => error_response(err),
    }
}

#[derive(Deserialize)]
pub struct FleetQuery {
    /// Comma-separated agent ids to report budget burn for.
    #[serde(default)]
    pub agents: String,
}

pub async fn fleet(
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    Query(query): Query<FleetQuery>,
) -> impl IntoResponse {
    let ks = TenantKeyspace::new(&tenant);
    let agent_ids: Vec<String> = query
        .agents
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    match fleet_summary(&state.store, &state.ledger, &ks, &agent_ids).await {
        Ok(summary) => (StatusCode::OK, Json(serde_json::to_value(summary).unwrap_or_default())),
        Err(err) => error_response(err),
    }
}

#[derive(Deserialize)]
pub struct InjectGoalsRequest {
    pub tenant: String,
    pub goals: Vec<String>,
    #[serde(default = "default_budget")]
    pub initial_budget_usdc: f64,
}

fn default_budget() -> f64 {
    50.0
}

pub async fn inject_goals(
    State(state): State<Arc<AppState>>,
    Path(campaign): Path<String>,
    Json(request): Json<InjectGoalsRequest>,
) -> impl IntoResponse {
    if request.goals.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "goals must not be empty"})),
        );
    }
    let ks = TenantKeyspace::new(&request.tenant);
    match state
        .planner
        .inject_goals(&ks, &campaign, request.goals, request.initial_budget_usdc)
        .await
    {
        Ok(tasks) => {
            info!(
                tenant = %request.tenant,
                %campaign,
                task_count = tasks.len(),
                "goals injected"
            );
            (
                StatusCode::ACCEPTED,
                Json(json!({
                    "campaign": campaign,
                    "planned_tasks": tasks.iter().map(|t| json!({
                        "task_id": t.task_id,
                        "task_type": t.task_type,
                        "priority": t.priority,
                    })).collect::<Vec<_>>(),
                })),
            )
        }
        Err(err) => error_response(err),
    }
}
