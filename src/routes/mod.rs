//! Router assembly: HTTP endpoints, WebSocket upgrade, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
  routing::{get, post},
  Router,
};
use tower_http::{
  cors::{Any, CorsLayer},
  trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - CORS (allow any origin/method/headers); tighten for production
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
  Router::new()
    // WebSocket
    .route("/ws", get(ws::ws_upgrade))
    // HTTP API
    .route("/api/v1/health", get(http::http_health))
    .route("/api/v1/lessons/:course_id/:lesson_id/tasks", get(http::http_get_lesson_tasks))
    .route("/api/v1/sessions", post(http::http_start_session))
    .route("/api/v1/sessions/:id", get(http::http_get_session).delete(http::http_abandon))
    .route("/api/v1/sessions/:id/reload", post(http::http_reload_session))
    .route("/api/v1/sessions/:id/task", get(http::http_current_task))
    .route("/api/v1/sessions/:id/answer", post(http::http_submit_answer))
    .route("/api/v1/sessions/:id/matching/select", post(http::http_select_key))
    .route("/api/v1/sessions/:id/matching/match", post(http::http_match_value))
    .route("/api/v1/sessions/:id/matching/unmatch", post(http::http_unmatch))
    .route("/api/v1/sessions/:id/matching/submit", post(http::http_submit_matching))
    .route("/api/v1/sessions/:id/advance", post(http::http_advance))
    .route("/api/v1/sessions/:id/skip", post(http::http_skip))
    .route("/api/v1/sessions/:id/summary", get(http::http_summary))
    // State + CORS + HTTP tracing
    .with_state(state)
    .layer(
      CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any),
    )
    .layer(
      TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use serde_json::{json, Value};
  use tower::ServiceExt;

  use crate::config::FeedbackCopy;
  use crate::repository::tests::DownStore;
  use crate::seeds::seed_lessons;
  use crate::store::InMemoryStore;

  fn app() -> Router {
    let state = AppState::with_store(Arc::new(InMemoryStore::with_lessons(seed_lessons())), FeedbackCopy::default());
    build_router(Arc::new(state))
  }

  async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
      Some(v) => builder
        .header("content-type", "application/json")
        .body(Body::from(v.to_string()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
  }

  #[tokio::test]
  async fn health_is_ok() {
    let (status, body) = call(&app(), "GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true, "sessions": 0}));
  }

  #[tokio::test]
  async fn session_round_trip_over_http() {
    let app = app();
    let (status, started) = call(
      &app,
      "POST",
      "/api/v1/sessions",
      Some(json!({"courseId": "demo-science", "lessonId": "basics"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = started["sessionId"].as_str().unwrap().to_string();

    let (_, res) = call(&app, "POST", &format!("/api/v1/sessions/{id}/answer"), Some(json!({"answer": {"choice": "Paris"}}))).await;
    assert_eq!(res["isCorrect"], true);

    for _ in 0..2 {
      call(&app, "POST", &format!("/api/v1/sessions/{id}/advance"), None).await;
    }
    let (_, task) = call(&app, "GET", &format!("/api/v1/sessions/{id}/task"), None).await;
    assert_eq!(task["task"]["task"]["type"], "MATCHING");

    for (path, body) in [
      ("select", json!({"key": "CO2"})),
      ("match", json!({"value": "Carbon Dioxide"})),
      ("select", json!({"key": "H2O"})),
      ("match", json!({"value": "Water"})),
    ] {
      let (status, _) = call(&app, "POST", &format!("/api/v1/sessions/{id}/matching/{path}"), Some(body)).await;
      assert_eq!(status, StatusCode::OK);
    }
    let (_, res) = call(&app, "POST", &format!("/api/v1/sessions/{id}/matching/submit"), None).await;
    assert_eq!(res["isCorrect"], true);

    let (_, summary) = call(&app, "GET", &format!("/api/v1/sessions/{id}/summary"), None).await;
    assert_eq!(summary, json!({"totalTasks": 5, "correctCount": 2}));

    for _ in 0..2 {
      call(&app, "POST", &format!("/api/v1/sessions/{id}/skip"), None).await;
    }
    let (_, last) = call(&app, "POST", &format!("/api/v1/sessions/{id}/skip"), None).await;
    assert_eq!(last, json!({"state": "completed", "summary": {"totalTasks": 5, "correctCount": 2}}));

    // Completed sessions are released; the summary arrived with the final state.
    let (status, _) = call(&app, "GET", &format!("/api/v1/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, health) = call(&app, "GET", "/api/v1/health", None).await;
    assert_eq!(health["sessions"], 0);
  }

  #[tokio::test]
  async fn abandoned_sessions_are_gone() {
    let app = app();
    let (_, started) = call(
      &app,
      "POST",
      "/api/v1/sessions",
      Some(json!({"courseId": "demo-science", "lessonId": "basics"})),
    )
    .await;
    let id = started["sessionId"].as_str().unwrap();

    let (status, _) = call(&app, "DELETE", &format!("/api/v1/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "GET", &format!("/api/v1/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn reloading_a_loaded_session_conflicts() {
    let app = app();
    let (_, started) = call(
      &app,
      "POST",
      "/api/v1/sessions",
      Some(json!({"courseId": "demo-science", "lessonId": "basics"})),
    )
    .await;
    let id = started["sessionId"].as_str().unwrap();
    let (status, _) = call(&app, "POST", &format!("/api/v1/sessions/{id}/reload"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
  }

  #[tokio::test]
  async fn answering_before_load_or_after_completion_conflicts() {
    let app = app();
    let (_, started) = call(&app, "POST", "/api/v1/sessions", Some(json!({"courseId": "x", "lessonId": "y"}))).await;
    assert_eq!(started["state"]["state"], "no_exercises");
    let id = started["sessionId"].as_str().unwrap();
    let (status, _) = call(&app, "POST", &format!("/api/v1/sessions/{id}/answer"), Some(json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
  }

  #[tokio::test]
  async fn lesson_tasks_endpoint_reports_store_failure() {
    let (status, docs) = call(&app(), "GET", "/api/v1/lessons/demo-generated/intro/tasks?courseType=generated", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(docs.as_array().unwrap().len(), 2);

    let down = build_router(Arc::new(AppState::with_store(Arc::new(DownStore), FeedbackCopy::default())));
    let (status, _) = call(&down, "GET", "/api/v1/lessons/c/l/tasks", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
  }
}
