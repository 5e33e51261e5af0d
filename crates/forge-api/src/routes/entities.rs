//! # Governed Entities API
//!
//! Registration and lookup of the entities whose lifecycle this service
//! governs. Registration takes an optional import state so that entities
//! already partway through their lifecycle elsewhere can be brought under
//! management.
//!
//! ## Endpoints
//!
//! - `POST /entities`: register an entity (admin)
//! - `GET /entities/:entity_type/:entity_id`: current snapshot

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use forge_core::EntityId;
use forge_lifecycle::{EntityKey, GovernedEntity, NewEntity};
use forge_state::{EntityType, LifecycleState};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{require_role, CallerIdentity, Role};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;

// ── Request/Response DTOs ───────────────────────────────────────────

/// Request to register a governed entity.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterEntityRequest {
    pub entity_id: String,
    pub entity_type: String,
    /// Import state. Defaults to the type's initial state.
    #[serde(default)]
    pub state: Option<String>,
    /// Escrow account released when this milestone is approved.
    #[serde(default)]
    pub linked_escrow_id: Option<String>,
}

impl Validate for RegisterEntityRequest {
    fn validate(&self) -> Result<(), String> {
        if self.entity_id.trim().is_empty() {
            return Err("entity_id must not be empty".to_string());
        }
        if self.entity_type.trim().is_empty() {
            return Err("entity_type must not be empty".to_string());
        }
        Ok(())
    }
}

impl RegisterEntityRequest {
    fn into_new_entity(self) -> Result<NewEntity, AppError> {
        let entity_type: EntityType = self.entity_type.parse()?;
        let mut new = NewEntity::new(entity_type, EntityId::new(self.entity_id)?);
        if let Some(state) = self.state {
            new = new.in_state(LifecycleState::parse(entity_type, &state)?);
        }
        if let Some(escrow_id) = self.linked_escrow_id {
            new = new.linked_to_escrow(EntityId::new(escrow_id)?);
        }
        Ok(new)
    }
}

/// A governed entity and the states it may move to next.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EntityView {
    pub entity_id: String,
    pub entity_type: String,
    pub current_state: String,
    pub registered_state: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_escrow_id: Option<String>,
    pub legal_next_states: Vec<String>,
}

impl EntityView {
    fn new(entity: GovernedEntity, state: &AppState) -> Self {
        let legal_next_states = state
            .lifecycle
            .legal_next_states(entity.current_state)
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        Self {
            entity_id: entity.entity_id.to_string(),
            entity_type: entity.entity_type.to_string(),
            current_state: entity.current_state.name().to_string(),
            registered_state: entity.registered_state.name().to_string(),
            created_at: entity.created_at.to_rfc3339(),
            linked_escrow_id: entity.linked_escrow_id.map(|id| id.to_string()),
            legal_next_states,
        }
    }
}

// ── Router ──────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/entities", post(register_entity))
        .route("/entities/:entity_type/:entity_id", get(get_entity))
}

// ── Handlers ────────────────────────────────────────────────────────

/// POST /entities: Register a governed entity.
#[utoipa::path(
    post,
    path = "/entities",
    request_body = RegisterEntityRequest,
    responses(
        (status = 201, description = "Entity registered", body = EntityView),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 409, description = "Entity already registered", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "entities"
)]
pub(crate) async fn register_entity(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<RegisterEntityRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EntityView>), AppError> {
    require_role(&caller, Role::Admin)?;
    let new = extract_validated_json(body)?.into_new_entity()?;

    let entity = state.entities.register(new)?;
    tracing::info!(
        entity_type = %entity.entity_type,
        entity_id = %entity.entity_id,
        state = %entity.current_state,
        "entity registered"
    );
    Ok((StatusCode::CREATED, Json(EntityView::new(entity, &state))))
}

/// GET /entities/:entity_type/:entity_id: Current snapshot of an entity.
#[utoipa::path(
    get,
    path = "/entities/{entity_type}/{entity_id}",
    params(
        ("entity_type" = String, Path, description = "Entity type"),
        ("entity_id" = String, Path, description = "Entity ID"),
    ),
    responses(
        (status = 200, description = "Entity found", body = EntityView),
        (status = 404, description = "Entity not found", body = crate::error::ErrorBody),
        (status = 422, description = "Unknown entity type", body = crate::error::ErrorBody),
    ),
    tag = "entities"
)]
pub(crate) async fn get_entity(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> Result<Json<EntityView>, AppError> {
    let key = EntityKey::new(entity_type.parse()?, EntityId::new(entity_id)?);
    let entity = state
        .lifecycle
        .entity(&key)
        .ok_or_else(|| AppError::EntityNotFound(format!("entity {key} not found")))?;
    Ok(Json(EntityView::new(entity, &state)))
}
