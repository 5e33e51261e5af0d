//! # Authentication & Authorization Middleware
//!
//! Bearer token middleware with role-based access control.
//!
//! ## Token Format
//!
//! ```text
//! Bearer {role}:{principal_id}:{secret}
//! ```
//!
//! `principal_id` may be empty for service callers. When it is present, the
//! caller may only record transitions performed by that principal.
//!
//! ## CallerIdentity
//!
//! Every authenticated request gets a [`CallerIdentity`] injected into the
//! request extensions. Handlers extract it via the `FromRequestParts` impl.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use forge_core::PrincipalId;
use forge_state::EntityType;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::ToSchema;

use crate::error::{AppError, ErrorBody, ErrorDetail};

// ── Role ────────────────────────────────────────────────────────────────────

/// Platform roles, ordered by privilege level.
///
/// The `Ord` derivation respects variant declaration order:
/// `Investor < Innovator < EscrowManager < Admin`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Investor,
    Innovator,
    /// Operates escrow accounts: may release and refund.
    EscrowManager,
    /// Full access, including approvals of every entity type.
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Investor => "investor",
            Self::Innovator => "innovator",
            Self::EscrowManager => "escrow_manager",
            Self::Admin => "admin",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "investor" => Some(Self::Investor),
            "innovator" => Some(Self::Innovator),
            "escrow_manager" => Some(Self::EscrowManager),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub role: Role,
    /// Principal bound to the token, if any.
    pub principal: Option<PrincipalId>,
}

impl CallerIdentity {
    /// Identity used when authentication is disabled.
    pub fn unrestricted() -> Self {
        Self {
            role: Role::Admin,
            principal: None,
        }
    }

    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }
}

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Check that the caller has at least the required role.
pub fn require_role(caller: &CallerIdentity, minimum: Role) -> Result<(), AppError> {
    if caller.has_role(minimum) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            minimum.as_str(),
            caller.role.as_str()
        )))
    }
}

/// Minimum role allowed to transition entities of a type.
///
/// Unknown type names fall back to `Admin`; the lifecycle manager reports
/// them as validation errors once authorization passes.
pub fn transition_role(entity_type: &str) -> Role {
    match entity_type.parse::<EntityType>() {
        Ok(EntityType::EscrowAccount) => Role::EscrowManager,
        _ => Role::Admin,
    }
}

/// Authorize a transition request: role by entity type, plus principal binding.
pub fn authorize_transition(
    caller: &CallerIdentity,
    entity_type: &str,
    performed_by: &str,
) -> Result<(), AppError> {
    require_role(caller, transition_role(entity_type))?;
    match &caller.principal {
        Some(principal) if principal.as_str() != performed_by => Err(AppError::Forbidden(format!(
            "token is bound to principal '{principal}', cannot act as '{performed_by}'"
        ))),
        _ => Ok(()),
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer token secrets.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse a bearer token of the form `{role}:{principal_id}:{secret}`.
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();
    let [role_str, principal_str, secret] = parts.as_slice() else {
        return Err("invalid token format, expected {role}:{principal_id}:{secret}".into());
    };

    if !constant_time_token_eq(secret, expected_secret) {
        return Err("invalid bearer token".into());
    }

    let role = Role::parse(role_str).ok_or_else(|| format!("unknown role: {role_str}"))?;
    let principal = if principal_str.is_empty() {
        None
    } else {
        Some(PrincipalId::new(*principal_str).map_err(|e| format!("invalid principal: {e}"))?)
    };

    Ok(CallerIdentity { role, principal })
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Validate the Bearer token and inject the caller's [`CallerIdentity`].
///
/// When `AuthConfig.token` is `None`, every request gets an unrestricted
/// `Admin` identity with no principal binding.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected_token = request.extensions().get::<AuthConfig>().cloned();

    match expected_token {
        Some(AuthConfig {
            token: Some(ref expected),
        }) => {
            let auth_header = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());

            match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
                Some(provided) => match parse_bearer_token(provided, expected) {
                    Ok(identity) => {
                        request.extensions_mut().insert(identity);
                        next.run(request).await
                    }
                    Err(msg) => {
                        tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
                        unauthorized_response(&msg)
                    }
                },
                None if auth_header.is_some() => {
                    tracing::warn!("authentication failed: non-Bearer authorization scheme");
                    unauthorized_response("authorization header must use Bearer scheme")
                }
                None => {
                    tracing::warn!("authentication failed: missing authorization header");
                    unauthorized_response("missing authorization header")
                }
            }
        }
        _ => {
            request
                .extensions_mut()
                .insert(CallerIdentity::unrestricted());
            next.run(request).await
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    /// Build a minimal router that echoes the caller's role.
    fn test_app(token: Option<String>) -> Router {
        let auth_config = AuthConfig { token };
        Router::new()
            .route(
                "/whoami",
                get(|caller: CallerIdentity| async move { caller.role.as_str() }),
            )
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(auth_config))
    }

    async fn call(app: Router, authorization: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/whoami");
        if let Some(value) = authorization {
            builder = builder.header("Authorization", value);
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn valid_token_injects_identity() {
        let app = test_app(Some("s3cret".into()));
        let (status, body) = call(app, Some("Bearer escrow_manager:esc_ops:s3cret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "escrow_manager");
    }

    #[tokio::test]
    async fn missing_authorization_header_rejected() {
        let app = test_app(Some("s3cret".into()));
        let (status, body) = call(app, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let err: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(err["error"]["code"], "UNAUTHORIZED");
        assert!(err["error"]["message"].as_str().unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn wrong_secret_rejected() {
        let app = test_app(Some("s3cret".into()));
        let (status, body) = call(app, Some("Bearer admin:admin_1:guess")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("invalid bearer token"));
    }

    #[tokio::test]
    async fn bare_secret_rejected() {
        let app = test_app(Some("s3cret".into()));
        let (status, body) = call(app, Some("Bearer s3cret")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("invalid token format"));
    }

    #[tokio::test]
    async fn non_bearer_scheme_rejected() {
        let app = test_app(Some("s3cret".into()));
        let (status, body) = call(app, Some("Basic dXNlcjpwYXNz")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Bearer scheme"));
    }

    #[tokio::test]
    async fn auth_disabled_grants_admin() {
        let app = test_app(None);
        let (status, body) = call(app, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "admin");
    }

    #[test]
    fn parse_token_with_empty_principal() {
        let identity = parse_bearer_token("admin::s3cret", "s3cret").unwrap();
        assert_eq!(identity.role, Role::Admin);
        assert_eq!(identity.principal, None);
    }

    #[test]
    fn parse_token_rejects_unknown_role() {
        let err = parse_bearer_token("root:x:s3cret", "s3cret").unwrap_err();
        assert!(err.contains("unknown role"));
    }

    #[test]
    fn roles_are_ordered() {
        assert!(Role::Admin > Role::EscrowManager);
        assert!(Role::EscrowManager > Role::Innovator);
        assert!(Role::Innovator > Role::Investor);
    }

    #[test]
    fn escrow_manager_may_only_transition_escrow() {
        let caller = CallerIdentity {
            role: Role::EscrowManager,
            principal: None,
        };
        assert!(authorize_transition(&caller, "EscrowAccount", "ops_1").is_ok());
        assert!(matches!(
            authorize_transition(&caller, "Milestone", "ops_1"),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn bound_principal_must_match_performed_by() {
        let caller = CallerIdentity {
            role: Role::Admin,
            principal: Some(PrincipalId::new("admin_1").unwrap()),
        };
        assert!(authorize_transition(&caller, "User", "admin_1").is_ok());
        assert!(matches!(
            authorize_transition(&caller, "User", "admin_2"),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn auth_config_debug_redacts_token() {
        let config = AuthConfig {
            token: Some("super-secret".into()),
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }
}
