use crate::routes;
use axum::routing::{get, post};
use axum::Router;
use hivewire_core::Config;
use hivewire_pipeline::{HitlGate, Planner};
use hivewire_store::{BudgetLedger, Store};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub planner: Planner,
    pub gate: HitlGate,
    pub ledger: Arc<BudgetLedger>,
    pub config: Config,
}

pub struct GatewayServer;

impl GatewayServer {
    /// Build the operator router.
    pub fn build(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/health", get(routes::health))
            .route("/hitl", get(routes::list_hitl))
            .route("/hitl/:task_id/decision", post(routes::decide_hitl))
            .route("/fleet/:tenant", get(routes::fleet))
            .route("/planner/:campaign/goals", post(routes::inject_goals))
            .with_state(state)
    }
}
