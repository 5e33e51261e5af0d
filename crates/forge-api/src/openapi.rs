//! # OpenAPI Specification Assembly
//!
//! Assembles the utoipa-documented routes into a single OpenAPI document
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "InnoCap Forge Entity Lifecycle API",
        version = "0.1.0",
        description = "State transitions, audit history and side-effect dispatch for users, projects, milestones, escrow accounts and transactions.",
        license(name = "BUSL-1.1")
    ),
    paths(
        // Transitions
        crate::routes::transitions::request_transition,
        crate::routes::transitions::batch_request_transition,
        crate::routes::transitions::get_history,
        crate::routes::transitions::verify_history,
        // Entities
        crate::routes::entities::register_entity,
        crate::routes::entities::get_entity,
        // State machines
        crate::routes::machines::list_state_machines,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::transitions::TransitionPayload,
        crate::routes::transitions::TransitionRecordView,
        crate::routes::transitions::BatchItemResult,
        crate::routes::transitions::HistoryVerificationView,
        crate::routes::entities::RegisterEntityRequest,
        crate::routes::entities::EntityView,
        crate::routes::machines::EdgeView,
        crate::routes::machines::MachineView,
        crate::routes::machines::StateMachinesResponse,
    )),
    tags(
        (name = "transitions", description = "Transition requests and audit history"),
        (name = "entities", description = "Governed entity registration"),
        (name = "state-machines", description = "Lifecycle introspection"),
    )
)]
pub struct ApiDoc;

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json: Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
