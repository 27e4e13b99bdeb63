//! HTTP endpoint handlers. These are thin wrappers that forward to `AppState`.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;

use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
  Json,
};
use tracing::{info, instrument};

use crate::codec::Document;
use crate::domain::{EvaluationResult, LessonKey, SessionSummary};
use crate::error::{FetchError, SessionError};
use crate::protocol::*;
use crate::session::{MatchingDraft, SequenceState};
use crate::state::{AppState, LOAD_WAIT};

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

fn session_error(e: SessionError) -> (StatusCode, String) {
  let status = match e {
    SessionError::UnknownSession(_) => StatusCode::NOT_FOUND,
    _ => StatusCode::CONFLICT,
  };
  (status, e.to_string())
}

fn fetch_error(e: FetchError) -> (StatusCode, String) {
  (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, sessions: state.live_sessions().await })
}

#[instrument(level = "info", skip(state, q), fields(%course_id, %lesson_id))]
pub async fn http_get_lesson_tasks(
  State(state): State<Arc<AppState>>,
  Path((course_id, lesson_id)): Path<(String, String)>,
  Query(q): Query<LessonTasksQuery>,
) -> ApiResult<Vec<Document>> {
  let key = LessonKey::new(course_id, lesson_id);
  let docs = state.lesson_documents(&key, q.course_type).await.map_err(fetch_error)?;
  info!(target: "lesson_tasks", lesson = %key, count = docs.len(), "HTTP lesson tasks served");
  Ok(Json(docs))
}

#[instrument(level = "info", skip(state, body), fields(course_id = %body.course_id, lesson_id = %body.lesson_id))]
pub async fn http_start_session(
  State(state): State<Arc<AppState>>,
  Json(body): Json<StartSessionIn>,
) -> impl IntoResponse {
  let key = LessonKey::new(body.course_id, body.lesson_id);
  let (session_id, loaded) = state.start_session_and_wait(key, body.course_type, LOAD_WAIT).await;
  info!(target: "session", %session_id, state = loaded.name(), "HTTP session started");
  (StatusCode::CREATED, Json(SessionOut { session_id, state: loaded }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<SessionOut> {
  let s = state.session_state(&id).await.map_err(session_error)?;
  Ok(Json(SessionOut { session_id: id, state: s }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_reload_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<SessionOut> {
  let s = state.reload_session(&id).await.map_err(session_error)?;
  Ok(Json(SessionOut { session_id: id, state: s }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_current_task(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<CurrentTaskOut> {
  let current = state.current_task(&id).await.map_err(session_error)?;
  Ok(Json(to_current_out(&current)))
}

#[instrument(level = "info", skip(state, body), fields(answered = body.answer.is_some()))]
pub async fn http_submit_answer(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<AnswerIn>,
) -> ApiResult<EvaluationResult> {
  let result = state.submit_answer(&id, body.answer).await.map_err(session_error)?;
  info!(target: "session", %id, correct = result.is_correct, "HTTP answer evaluated");
  Ok(Json(result))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_select_key(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<KeyIn>,
) -> ApiResult<MatchingDraft> {
  Ok(Json(state.select_key(&id, &body.key).await.map_err(session_error)?))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_match_value(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<ValueIn>,
) -> ApiResult<MatchingDraft> {
  Ok(Json(state.match_value(&id, &body.value).await.map_err(session_error)?))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_unmatch(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<KeyIn>,
) -> ApiResult<MatchingDraft> {
  Ok(Json(state.unmatch(&id, &body.key).await.map_err(session_error)?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_submit_matching(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> ApiResult<EvaluationResult> {
  let result = state.submit_matching(&id).await.map_err(session_error)?;
  info!(target: "session", %id, correct = result.is_correct, "HTTP matching evaluated");
  Ok(Json(result))
}

#[instrument(level = "info", skip(state))]
pub async fn http_advance(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<SequenceState> {
  Ok(Json(state.advance(&id).await.map_err(session_error)?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_skip(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<SequenceState> {
  Ok(Json(state.skip(&id).await.map_err(session_error)?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_summary(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<SessionSummary> {
  Ok(Json(state.summary(&id).await.map_err(session_error)?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_abandon(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
  state.abandon(&id).await.map_err(session_error)?;
  Ok(StatusCode::NO_CONTENT)
}
