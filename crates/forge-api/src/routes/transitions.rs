//! # Transitions API
//!
//! The write path of the lifecycle manager and its audit trail.
//!
//! ## Endpoints
//!
//! - `POST /transitions`: request one transition
//! - `POST /transitions/batch`: request several independent transitions
//! - `GET /transitions?entity_id=&entity_type=`: audit history, oldest first
//! - `GET /transitions/verify?entity_id=&entity_type=`: re-check history integrity

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use forge_core::EntityId;
use forge_lifecycle::{EntityKey, HistoryVerification, StateTransitionRecord, TransitionRequest};
use forge_state::EntityType;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{authorize_transition, CallerIdentity};
use crate::error::{AppError, ErrorDetail};
use crate::extractors::{extract_json, extract_query, extract_validated_json, Validate};
use crate::state::AppState;

/// Upper bound on items in one batch request.
pub const MAX_BATCH_SIZE: usize = 100;

// ── Request/Response DTOs ───────────────────────────────────────────

/// Request to move one entity from its current state to another.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TransitionPayload {
    pub entity_id: String,
    /// One of `User`, `Project`, `Milestone`, `EscrowAccount`, `Transaction`.
    pub entity_type: String,
    /// State the caller believes the entity is in.
    pub expected_from_state: String,
    pub to_state: String,
    pub performed_by: String,
    /// Required when `to_state` is `Rejected`, `rejected` or `Refunded`.
    #[serde(default)]
    pub reason: Option<String>,
}

impl From<TransitionPayload> for TransitionRequest {
    fn from(p: TransitionPayload) -> Self {
        Self {
            entity_id: p.entity_id,
            entity_type: p.entity_type,
            expected_from_state: p.expected_from_state,
            to_state: p.to_state,
            performed_by: p.performed_by,
            reason: p.reason,
        }
    }
}

/// Batch of independent transition requests.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct BatchPayload(pub Vec<TransitionPayload>);

impl Validate for BatchPayload {
    fn validate(&self) -> Result<(), String> {
        if self.0.len() > MAX_BATCH_SIZE {
            return Err(format!(
                "batch holds {} requests, at most {MAX_BATCH_SIZE} allowed",
                self.0.len()
            ));
        }
        Ok(())
    }
}

/// An applied transition as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransitionRecordView {
    pub transition_id: String,
    pub entity_id: String,
    pub entity_type: String,
    pub from_state: String,
    pub to_state: String,
    pub performed_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// RFC 3339, millisecond precision, UTC.
    pub timestamp: String,
    /// 1-based position in the entity's history.
    pub sequence: u64,
    pub previous_digest: String,
    pub digest: String,
}

impl From<&StateTransitionRecord> for TransitionRecordView {
    fn from(r: &StateTransitionRecord) -> Self {
        Self {
            transition_id: r.transition_id.to_string(),
            entity_id: r.entity_id.to_string(),
            entity_type: r.entity_type.to_string(),
            from_state: r.from_state.name().to_string(),
            to_state: r.to_state.name().to_string(),
            performed_by: r.performed_by.to_string(),
            reason: r.reason.clone(),
            timestamp: r.timestamp.to_rfc3339(),
            sequence: r.sequence,
            previous_digest: r.previous_digest.clone(),
            digest: r.digest.clone(),
        }
    }
}

/// Outcome of one batch item, in input order.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchItemResult {
    Success { record: TransitionRecordView },
    Failure { error: ErrorDetail },
}

/// Identifies one governed entity in a query string.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EntityQuery {
    pub entity_id: String,
    pub entity_type: String,
}

impl EntityQuery {
    fn key(&self) -> Result<EntityKey, AppError> {
        let entity_type: EntityType = self.entity_type.parse()?;
        let entity_id = EntityId::new(self.entity_id.as_str())?;
        Ok(EntityKey::new(entity_type, entity_id))
    }
}

/// Integrity report for one entity's history.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HistoryVerificationView {
    pub entity_id: String,
    pub entity_type: String,
    pub records: usize,
    pub chain_valid: bool,
    pub walk_valid: bool,
    /// Sequence number of the first record failing either check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<u64>,
}

impl From<HistoryVerification> for HistoryVerificationView {
    fn from(v: HistoryVerification) -> Self {
        Self {
            entity_id: v.entity_id.to_string(),
            entity_type: v.entity_type.to_string(),
            records: v.records,
            chain_valid: v.chain_valid,
            walk_valid: v.walk_valid,
            broken_at: v.broken_at,
        }
    }
}

// ── Router ──────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/transitions", post(request_transition).get(get_history))
        .route("/transitions/batch", post(batch_request_transition))
        .route("/transitions/verify", get(verify_history))
}

// ── Handlers ────────────────────────────────────────────────────────

/// POST /transitions: Request a single transition.
#[utoipa::path(
    post,
    path = "/transitions",
    request_body = TransitionPayload,
    responses(
        (status = 201, description = "Transition applied", body = TransitionRecordView),
        (status = 400, description = "Malformed JSON", body = crate::error::ErrorBody),
        (status = 403, description = "Caller may not perform this transition", body = crate::error::ErrorBody),
        (status = 404, description = "Entity not found", body = crate::error::ErrorBody),
        (status = 409, description = "Entity is no longer in the expected state", body = crate::error::ErrorBody),
        (status = 422, description = "Illegal transition or invalid request", body = crate::error::ErrorBody),
    ),
    tag = "transitions"
)]
pub(crate) async fn request_transition(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<TransitionPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<TransitionRecordView>), AppError> {
    let payload = extract_json(body)?;
    authorize_transition(&caller, &payload.entity_type, &payload.performed_by)?;

    let record = state.lifecycle.request_transition(&payload.into())?;
    Ok((StatusCode::CREATED, Json(TransitionRecordView::from(&record))))
}

/// POST /transitions/batch: Request several independent transitions.
///
/// Items are evaluated in input order. A failing item never blocks or rolls
/// back the others, including items the caller is not authorized for.
#[utoipa::path(
    post,
    path = "/transitions/batch",
    request_body = Vec<TransitionPayload>,
    responses(
        (status = 200, description = "Per-item results in input order", body = Vec<BatchItemResult>),
        (status = 400, description = "Malformed JSON", body = crate::error::ErrorBody),
        (status = 422, description = "Batch too large", body = crate::error::ErrorBody),
    ),
    tag = "transitions"
)]
pub(crate) async fn batch_request_transition(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<BatchPayload>, JsonRejection>,
) -> Result<Json<Vec<BatchItemResult>>, AppError> {
    let BatchPayload(items) = extract_validated_json(body)?;

    let mut denied: Vec<Option<AppError>> = Vec::with_capacity(items.len());
    let mut authorized: Vec<TransitionRequest> = Vec::with_capacity(items.len());
    for item in items {
        match authorize_transition(&caller, &item.entity_type, &item.performed_by) {
            Ok(()) => {
                denied.push(None);
                authorized.push(item.into());
            }
            Err(err) => denied.push(Some(err)),
        }
    }

    let mut outcomes = state
        .lifecycle
        .batch_request_transition(&authorized)
        .into_iter();
    let mut results = Vec::with_capacity(denied.len());
    for slot in denied {
        let result = match slot {
            Some(err) => failure(err),
            None => match outcomes.next() {
                Some(Ok(record)) => BatchItemResult::Success {
                    record: TransitionRecordView::from(&record),
                },
                Some(Err(err)) => failure(AppError::from(err)),
                None => failure(AppError::Internal("batch outcome missing".into())),
            },
        };
        results.push(result);
    }

    tracing::debug!(items = results.len(), "batch processed");
    Ok(Json(results))
}

fn failure(err: AppError) -> BatchItemResult {
    err.log_if_internal();
    BatchItemResult::Failure {
        error: err.to_detail(),
    }
}

/// GET /transitions: Audit history of one entity, oldest first.
#[utoipa::path(
    get,
    path = "/transitions",
    params(EntityQuery),
    responses(
        (status = 200, description = "Ordered history; empty if the entity never transitioned", body = Vec<TransitionRecordView>),
        (status = 400, description = "Missing query parameters", body = crate::error::ErrorBody),
        (status = 422, description = "Unknown entity type or invalid id", body = crate::error::ErrorBody),
    ),
    tag = "transitions"
)]
pub(crate) async fn get_history(
    State(state): State<AppState>,
    query: Result<Query<EntityQuery>, QueryRejection>,
) -> Result<Json<Vec<TransitionRecordView>>, AppError> {
    let key = extract_query(query)?.key()?;
    let history = state.lifecycle.history(&key);
    Ok(Json(history.iter().map(TransitionRecordView::from).collect()))
}

/// GET /transitions/verify: Recompute the hash chain and state walk.
#[utoipa::path(
    get,
    path = "/transitions/verify",
    params(EntityQuery),
    responses(
        (status = 200, description = "Verification report", body = HistoryVerificationView),
        (status = 400, description = "Missing query parameters", body = crate::error::ErrorBody),
        (status = 422, description = "Unknown entity type or invalid id", body = crate::error::ErrorBody),
    ),
    tag = "transitions"
)]
pub(crate) async fn verify_history(
    State(state): State<AppState>,
    query: Result<Query<EntityQuery>, QueryRejection>,
) -> Result<Json<HistoryVerificationView>, AppError> {
    let key = extract_query(query)?.key()?;
    let report = state.lifecycle.verify_history(&key);
    if !(report.chain_valid && report.walk_valid) {
        tracing::error!(
            entity = %key,
            broken_at = ?report.broken_at,
            "audit history failed verification"
        );
    }
    Ok(Json(report.into()))
}
