//! HTTP API over the planner.
//!
//! Every route resolves the caller from the session cookie (or a bearer
//! token) before touching the store.
//!
//! - `POST   /api/enrollments`
//! - `PATCH  /api/enrollments/:course_id/metrics`
//! - `PATCH  /api/enrollments/:course_id/grade`
//! - `DELETE /api/enrollments/:course_id`
//! - `DELETE /api/planned-courses`
//! - `GET    /api/schedule`
//! - `GET    /api/context`
//! - `GET    /api/health`

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{
        header::{AUTHORIZATION, COOKIE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::error;
use uuid::Uuid;

use crate::context::StudentContext;
use crate::error::PlannerError;
use crate::models::{EnrollmentSubmission, Identity, MetricsUpdate, Schedule};
use crate::service::Planner;
use crate::store::{EnrollmentStore, IdentityResolver};

pub struct AppState<S> {
    pub planner: Planner<S>,
    pub session_cookie: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub deleted: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Default, Deserialize)]
pub struct GradeUpdate {
    #[serde(default)]
    pub grade: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    Planner(PlannerError),
    BadRequest(String),
}

impl From<PlannerError> for ApiError {
    fn from(err: PlannerError) -> Self {
        ApiError::Planner(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Planner(err) => match err {
                PlannerError::Unauthorized => (StatusCode::UNAUTHORIZED, err.to_string()),
                PlannerError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                PlannerError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
                PlannerError::Database(db_err) => {
                    error!(error = %db_err, "store failure");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal error".to_string(),
                    )
                }
            },
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

pub fn create_router<S>(state: AppState<S>) -> Router
where
    S: EnrollmentStore + IdentityResolver + 'static,
{
    let api_routes = Router::new()
        .route("/health", get(handle_health))
        .route("/enrollments", post(handle_submit::<S>))
        .route("/enrollments/:course_id", delete(handle_delete::<S>))
        .route("/enrollments/:course_id/metrics", patch(handle_metrics::<S>))
        .route("/enrollments/:course_id/grade", patch(handle_grade::<S>))
        .route("/planned-courses", delete(handle_clear_planned::<S>))
        .route("/schedule", get(handle_schedule::<S>))
        .route("/context", get(handle_context::<S>));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Bearer token first, then the named cookie.
fn session_token<'a>(headers: &'a HeaderMap, cookie_name: &str) -> Option<&'a str> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    bearer
        .or_else(|| {
            headers
                .get_all(COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .flat_map(|value| value.split(';'))
                .filter_map(|pair| pair.trim().split_once('='))
                .find(|(name, _)| *name == cookie_name)
                .map(|(_, value)| value.trim())
        })
        .filter(|token| !token.is_empty())
}

async fn identify<S>(state: &AppState<S>, headers: &HeaderMap) -> Result<Option<Identity>, ApiError>
where
    S: EnrollmentStore + IdentityResolver,
{
    let token = session_token(headers, &state.session_cookie);
    Ok(state.planner.authenticate(token).await?)
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn handle_submit<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Result<Json<EnrollmentSubmission>, JsonRejection>,
) -> Result<StatusCode, ApiError>
where
    S: EnrollmentStore + IdentityResolver + 'static,
{
    let identity = identify(&state, &headers).await?;
    let Json(submission) = body?;
    state
        .planner
        .submit_enrollment(identity.as_ref(), &submission)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_metrics<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(course_id): Path<Uuid>,
    body: Result<Json<MetricsUpdate>, JsonRejection>,
) -> Result<StatusCode, ApiError>
where
    S: EnrollmentStore + IdentityResolver + 'static,
{
    let identity = identify(&state, &headers).await?;
    let Json(update) = body?;
    state
        .planner
        .update_metrics(identity.as_ref(), Some(course_id), &update)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_grade<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(course_id): Path<Uuid>,
    body: Result<Json<GradeUpdate>, JsonRejection>,
) -> Result<StatusCode, ApiError>
where
    S: EnrollmentStore + IdentityResolver + 'static,
{
    let identity = identify(&state, &headers).await?;
    let Json(update) = body?;
    state
        .planner
        .update_grade(identity.as_ref(), Some(course_id), update.grade.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_delete<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(course_id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
    S: EnrollmentStore + IdentityResolver + 'static,
{
    let identity = identify(&state, &headers).await?;
    state
        .planner
        .delete_enrollment(identity.as_ref(), course_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_clear_planned<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Result<Json<DeletedResponse>, ApiError>
where
    S: EnrollmentStore + IdentityResolver + 'static,
{
    let identity = identify(&state, &headers).await?;
    let deleted = state.planner.clear_planned(identity.as_ref()).await?;
    Ok(Json(DeletedResponse { deleted }))
}

async fn handle_schedule<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Result<Json<Option<Schedule>>, ApiError>
where
    S: EnrollmentStore + IdentityResolver + 'static,
{
    let identity = identify(&state, &headers).await?;
    let schedule = state.planner.project_schedule(identity.as_ref()).await?;
    Ok(Json(schedule))
}

async fn handle_context<S>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Result<Json<StudentContext>, ApiError>
where
    S: EnrollmentStore + IdentityResolver + 'static,
{
    let identity = identify(&state, &headers).await?;
    let context = state.planner.student_context(identity.as_ref()).await?;
    Ok(Json(context))
}
