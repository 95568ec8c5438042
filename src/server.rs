//!
//! classhub HTTP server
//! --------------------
//! Axum surface over the identity reconciliation core.
//!
//! Responsibilities:
//! - Session verification endpoint called by the frontend after a provider
//!   login (`POST /auth/verify`).
//! - Bearer-token request guards expressed as extractors: `Authed` runs
//!   reconciliation once per request and yields the canonical identity
//!   record; `RequireTeacher` layers the role check on top. Routes consume
//!   the extracted value; nothing is stashed in ambient request state.
//! - Teacher-gated roster listing (`GET /auth/identities`).
//!

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::ReconcileError;
use crate::identity::{IdentityRecord, IdentityResolver, Role};

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<IdentityResolver>,
}

/// Mount all routes against the given state. Split from `run_with_port` so
/// tests can drive the router directly.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/auth/verify", post(verify_session))
        .route("/auth/me", get(me))
        .route("/auth/identities", get(identities))
        .with_state(state)
}

/// Start the classhub HTTP server bound to the given port.
pub async fn run_with_port(port: u16, resolver: Arc<IdentityResolver>) -> anyhow::Result<()> {
    let state = AppState { resolver };
    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", addr))?;
    info!(target: "startup", "classhub listening on {}", addr);
    axum::serve(listener, app).await.context("HTTP server terminated")?;
    Ok(())
}

fn user_json(rec: &IdentityRecord) -> serde_json::Value {
    json!({
        "local_id": rec.local_id,
        "external_id": rec.external_id,
        "email": rec.email,
        "display_name": rec.display_name,
        "role": rec.role,
        "provisioned": rec.provisioned,
    })
}

fn error_response(err: ReconcileError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    // The serialized error carries the machine-readable `kind` tag; the
    // message is the human-readable rendering.
    let body = json!({ "status": "error", "message": err.to_string(), "error": err });
    (status, Json(body)).into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let v = headers.get("authorization").or_else(|| headers.get("Authorization"))?;
    let s = v.to_str().ok()?;
    let rest = s.strip_prefix("Bearer ").or_else(|| s.strip_prefix("bearer "))?;
    let t = rest.trim();
    if t.is_empty() { None } else { Some(t.to_string()) }
}

/// Request guard: reconciles the Bearer token once and yields the caller's
/// canonical identity record. Rejection is the mapped reconcile error.
pub struct Authed(pub IdentityRecord);

impl FromRequestParts<AppState> for Authed {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).unwrap_or_default();
        let record = state.resolver.reconcile(&token).await.map_err(error_response)?;
        Ok(Authed(record))
    }
}

/// Request guard for teacher-only routes.
pub struct RequireTeacher(pub IdentityRecord);

impl FromRequestParts<AppState> for RequireTeacher {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Authed(record) = Authed::from_request_parts(parts, state).await?;
        if record.role != Role::Teacher {
            let body = json!({ "status": "error", "message": "Teacher access required.", "error": { "kind": "teacher_required" } });
            return Err((StatusCode::FORBIDDEN, Json(body)).into_response());
        }
        Ok(RequireTeacher(record))
    }
}

#[derive(Debug, Deserialize)]
struct VerifyPayload {
    #[serde(default)]
    token: Option<String>,
}

/// Called by the frontend after a successful provider login. Verifies the
/// token, creates or updates the local identity record, and returns it for
/// the session payload.
async fn verify_session(State(state): State<AppState>, Json(payload): Json<VerifyPayload>) -> Response {
    let token = payload.token.unwrap_or_default();
    match state.resolver.reconcile(&token).await {
        Ok(rec) => (StatusCode::OK, Json(json!({ "status": "ok", "user": user_json(&rec) }))).into_response(),
        Err(err) => error_response(err),
    }
}

/// Identity echo for an authenticated caller.
async fn me(Authed(rec): Authed) -> Response {
    (StatusCode::OK, Json(json!({ "status": "ok", "user": user_json(&rec) }))).into_response()
}

/// Roster of known identities. Teacher only.
async fn identities(State(state): State<AppState>, RequireTeacher(_): RequireTeacher) -> Response {
    match state.resolver.gateway().list().await {
        Ok(records) => {
            let users: Vec<_> = records.iter().map(user_json).collect();
            (StatusCode::OK, Json(json!({ "status": "ok", "identities": users }))).into_response()
        }
        Err(e) => error_response(ReconcileError::from(e)),
    }
}
