//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to `AppState`. We reply with a single JSON message per request.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::domain::LessonKey;
use crate::error::SessionError;
use crate::protocol::{to_current_out, ClientWsMessage, ServerWsMessage};
use crate::state::{AppState, LOAD_WAIT};
use crate::util::trunc_for_log;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "lesson_tasks", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Sessions started over one connection; they do not outlive it.
#[derive(Debug, Default)]
struct ConnectionSessions {
  ids: Vec<String>,
}

impl ConnectionSessions {
  /// Remember the session a `start_session` reply names.
  fn track(&mut self, reply: &ServerWsMessage) {
    if let ServerWsMessage::Session { session_id, .. } = reply {
      if !self.ids.contains(session_id) {
        self.ids.push(session_id.clone());
      }
    }
  }

  /// Abandon the tracked sessions still live; returns how many were.
  async fn release(self, state: &AppState) -> usize {
    let mut released = 0;
    for id in &self.ids {
      if state.abandon(id).await.is_ok() {
        released += 1;
      }
    }
    released
  }
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "lesson_tasks", "WebSocket connected");
  let mut owned = ConnectionSessions::default();
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        // Parse, dispatch, serialize response.
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "lesson_tasks", text = %trunc_for_log(&txt, 200), "WS received");
            let starts = matches!(incoming, ClientWsMessage::StartSession { .. });
            let reply = handle_client_ws(incoming, &state).await;
            if starts {
              owned.track(&reply);
            }
            reply
          }
          Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "lesson_tasks", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => {
        let _ = socket.send(Message::Pong(payload)).await;
      }
      Message::Close(_) => break,
      _ => {}
    }
  }
  let released = owned.release(&state).await;
  info!(target: "lesson_tasks", released, "WebSocket disconnected");
}

fn err(e: SessionError) -> ServerWsMessage {
  ServerWsMessage::Error { message: e.to_string() }
}

#[instrument(level = "info", skip(state))]
pub(crate) async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::StartSession { course_id, lesson_id, course_type } => {
      let key = LessonKey::new(course_id, lesson_id);
      let (session_id, loaded) = state.start_session_and_wait(key, course_type, LOAD_WAIT).await;
      info!(target: "session", %session_id, state = loaded.name(), "WS session started");
      ServerWsMessage::Session { session_id, state: loaded }
    }

    ClientWsMessage::CurrentTask { session_id } => match state.current_task(&session_id).await {
      Ok(current) => {
        let out = to_current_out(&current);
        ServerWsMessage::Task { session_id, state: out.state, task: out.task, draft: out.draft }
      }
      Err(e) => err(e),
    },

    ClientWsMessage::SubmitAnswer { session_id, answer } => match state.submit_answer(&session_id, answer).await {
      Ok(result) => {
        info!(target: "session", id = %session_id, correct = result.is_correct, "WS answer evaluated");
        ServerWsMessage::AnswerResult { session_id, result }
      }
      Err(e) => err(e),
    },

    ClientWsMessage::SelectKey { session_id, key } => match state.select_key(&session_id, &key).await {
      Ok(draft) => ServerWsMessage::Draft { session_id, draft },
      Err(e) => err(e),
    },

    ClientWsMessage::MatchValue { session_id, value } => match state.match_value(&session_id, &value).await {
      Ok(draft) => ServerWsMessage::Draft { session_id, draft },
      Err(e) => err(e),
    },

    ClientWsMessage::Unmatch { session_id, key } => match state.unmatch(&session_id, &key).await {
      Ok(draft) => ServerWsMessage::Draft { session_id, draft },
      Err(e) => err(e),
    },

    ClientWsMessage::SubmitMatching { session_id } => match state.submit_matching(&session_id).await {
      Ok(result) => ServerWsMessage::AnswerResult { session_id, result },
      Err(e) => err(e),
    },

    ClientWsMessage::Advance { session_id } => match state.advance(&session_id).await {
      Ok(s) => ServerWsMessage::Session { session_id, state: s },
      Err(e) => err(e),
    },

    ClientWsMessage::Skip { session_id } => match state.skip(&session_id).await {
      Ok(s) => ServerWsMessage::Session { session_id, state: s },
      Err(e) => err(e),
    },

    ClientWsMessage::Summary { session_id } => match state.summary(&session_id).await {
      Ok(summary) => ServerWsMessage::Summary { session_id, summary },
      Err(e) => err(e),
    },

    ClientWsMessage::Abandon { session_id } => match state.abandon(&session_id).await {
      Ok(()) => ServerWsMessage::Abandoned { session_id },
      Err(e) => err(e),
    },
  }
}
