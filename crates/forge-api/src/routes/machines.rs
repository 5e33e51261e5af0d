//! # State Machine Introspection
//!
//! `GET /state-machines` lists every governed entity type with its states
//! and legal edges under the active transition policy.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use forge_state::{EntityType, LifecycleState, MachineDescription};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::AppState;

/// One legal edge.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EdgeView {
    pub from: String,
    pub to: String,
}

/// State machine of one entity type.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MachineView {
    pub entity_type: String,
    pub initial_state: String,
    pub states: Vec<String>,
    pub terminal_states: Vec<String>,
    pub transitions: Vec<EdgeView>,
}

impl From<MachineDescription> for MachineView {
    fn from(d: MachineDescription) -> Self {
        Self {
            entity_type: d.entity_type.to_string(),
            initial_state: d.initial_state.name().to_string(),
            states: names(&d.states),
            terminal_states: names(&d.terminal_states),
            transitions: d
                .transitions
                .iter()
                .map(|e| EdgeView {
                    from: e.from.name().to_string(),
                    to: e.to.name().to_string(),
                })
                .collect(),
        }
    }
}

fn names(states: &[LifecycleState]) -> Vec<String> {
    states.iter().map(|s| s.name().to_string()).collect()
}

/// Every state machine under the active policy.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StateMachinesResponse {
    /// `staged` or `direct`.
    pub transaction_settlement: String,
    pub machines: Vec<MachineView>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/state-machines", get(list_state_machines))
}

/// GET /state-machines: Describe every entity lifecycle.
#[utoipa::path(
    get,
    path = "/state-machines",
    responses(
        (status = 200, description = "State machines under the active policy", body = StateMachinesResponse),
    ),
    tag = "state-machines"
)]
pub(crate) async fn list_state_machines(State(state): State<AppState>) -> Json<StateMachinesResponse> {
    let table = state.lifecycle.table();
    Json(StateMachinesResponse {
        transaction_settlement: table.policy().transaction_settlement.as_str().to_string(),
        machines: EntityType::ALL
            .iter()
            .map(|t| MachineView::from(table.describe(*t)))
            .collect(),
    })
}
