//! Producer submissions and reviewer decisions over [`RequestRegistry`].
//!
//! Producers get exactly two negative signals: `409 {"status":"not_accepted"}` on submit and
//! `{"relevant": false}` on a relevance check. Neither carries a cause.

use crate::AppState;
use axum::extract::{Json, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use oversight_core::{NewRequest, RegistryError, RequestRegistry, Role, Screening};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Header carrying the caller role. Missing or unrecognized values mean producer.
pub(crate) const ROLE_HEADER: &str = "x-oversight-role";

pub(crate) fn caller_role(headers: &HeaderMap) -> Role {
    headers
        .get(ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(Role::parse)
        .unwrap_or(Role::Producer)
}

pub(crate) fn forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        axum::Json(serde_json::json!({ "error": "reviewer role required" })),
    )
        .into_response()
}

fn not_accepted() -> Response {
    (
        StatusCode::CONFLICT,
        axum::Json(serde_json::json!({ "status": "not_accepted" })),
    )
        .into_response()
}

/// HTTP rendering of [`RegistryError`].
pub(crate) struct ApiError(RegistryError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RegistryError::DuplicateContent => return not_accepted(),
            RegistryError::NotFound => StatusCode::NOT_FOUND,
            RegistryError::InvalidState(_) => StatusCode::CONFLICT,
            RegistryError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RegistryError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RegistryError::Storage(e) => {
                tracing::error!(target: "oversight::gateway", error = %e, "Request store failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, axum::Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Runs a blocking registry call off the async runtime.
async fn blocking<T, F>(registry: &Arc<RequestRegistry>, f: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce(&RequestRegistry) -> T + Send + 'static,
{
    let registry = Arc::clone(registry);
    tokio::task::spawn_blocking(move || f(&registry)).await.map_err(|e| {
        tracing::error!(target: "oversight::gateway", error = %e, "Registry task failed");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })
}

/// POST /api/v1/requests – queue a proposal for review.
pub(crate) async fn submit(State(state): State<AppState>, Json(proposal): Json<NewRequest>) -> Response {
    if state.config.policy_screening {
        if let Screening::Fail { reason } = state.policy.screen(&proposal) {
            tracing::info!(
                target: "oversight::gateway",
                title = %proposal.title,
                reason = %reason,
                "Proposal rejected by policy screen"
            );
            return not_accepted();
        }
    }
    match blocking(&state.registry, move |r| r.submit(proposal)).await {
        Ok(Ok(id)) => (StatusCode::CREATED, axum::Json(serde_json::json!({ "id": id }))).into_response(),
        Ok(Err(e)) => ApiError(e).into_response(),
        Err(resp) => resp,
    }
}

/// Runs a registry call off the runtime and renders its result as JSON.
async fn respond<T, F>(state: &AppState, f: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce(&RequestRegistry) -> Result<T, RegistryError> + Send + 'static,
{
    match blocking(&state.registry, f).await {
        Ok(Ok(body)) => axum::Json(body).into_response(),
        Ok(Err(e)) => ApiError(e).into_response(),
        Err(resp) => resp,
    }
}

/// GET /api/v1/requests/pending – review queue (empty for producers).
pub(crate) async fn list_pending(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let role = caller_role(&headers);
    respond(&state, move |r| r.list_pending(role)).await
}

/// GET /api/v1/requests/:id
pub(crate) async fn get_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Response {
    let role = caller_role(&headers);
    respond(&state, move |r| r.get_request(id, role)?.ok_or(RegistryError::NotFound)).await
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApproveBody {
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DenyBody {
    #[serde(default)]
    pub reason: String,
}

/// Status of a request after a reviewer decision, for the response body.
fn decided(registry: &RequestRegistry, id: Uuid) -> Result<serde_json::Value, RegistryError> {
    let request = registry
        .get_request(id, Role::Reviewer)?
        .ok_or(RegistryError::NotFound)?;
    Ok(serde_json::json!({ "id": id, "status": request.status }))
}

/// POST /api/v1/requests/:id/approve
pub(crate) async fn approve(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Option<Json<ApproveBody>>,
) -> Response {
    if !caller_role(&headers).is_reviewer() {
        return forbidden();
    }
    let notes = body.map(|Json(b)| b.notes).unwrap_or_default();
    respond(&state, move |r| r.approve(id, &notes).and_then(|()| decided(r, id))).await
}

/// POST /api/v1/requests/:id/deny
pub(crate) async fn deny(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    body: Option<Json<DenyBody>>,
) -> Response {
    if !caller_role(&headers).is_reviewer() {
        return forbidden();
    }
    let reason = body.map(|Json(b)| b.reason).unwrap_or_default();
    respond(&state, move |r| r.deny(id, &reason).and_then(|()| decided(r, id))).await
}

/// POST /api/v1/requests/:id/integrate – retry the knowledge store hand-off of an APPROVED request.
pub(crate) async fn retry_integration(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Response {
    if !caller_role(&headers).is_reviewer() {
        return forbidden();
    }
    respond(&state, move |r| r.retry_integration(id).and_then(|()| decided(r, id))).await
}

#[derive(Debug, Deserialize)]
pub(crate) struct RelevanceBody {
    pub content: String,
}

/// POST /api/v1/relevance
pub(crate) async fn relevance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RelevanceBody>,
) -> Response {
    let role = caller_role(&headers);
    match blocking(&state.registry, move |r| r.check_relevance(&body.content, role)).await {
        Ok(relevant) => axum::Json(serde_json::json!({ "relevant": relevant })).into_response(),
        Err(resp) => resp,
    }
}

/// GET /api/v1/vault
pub(crate) async fn vault(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let role = caller_role(&headers);
    if !role.is_reviewer() {
        return forbidden();
    }
    respond(&state, move |r| r.list_vault(role)).await
}

/// GET /api/v1/stats
pub(crate) async fn stats(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let role = caller_role(&headers);
    if !role.is_reviewer() {
        return forbidden();
    }
    respond(&state, move |r| r.statistics(role)).await
}
