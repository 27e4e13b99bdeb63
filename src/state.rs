//! Application state: the document store, live sessions and feedback copy.
//!
//! This module owns:
//!   - the store the lesson fetches go to (seeds + optional TOML bank)
//!   - the registry of live exercise sessions, keyed by session id
//!   - the feedback templates (from TOML or defaults)
//!
//! Fetches run on spawned tasks. Their results reach a session only through
//! `finish_load`, which drops results for sessions that were abandoned or
//! reloaded in the meantime.
//!
//! Sessions leave the registry when they complete (the `Completed` state
//! carries the summary), when they are abandoned, or when the idle sweeper
//! finds no client activity for `idle_ttl`.

use std::{
  collections::HashMap,
  sync::Arc,
  time::{Duration, Instant},
};

use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::codec::{encode_record, Document};
use crate::config::{load_config_from_env, FeedbackCopy, SessionCfg};
use crate::domain::{CourseType, EvaluationResult, LessonKey, SessionSummary, TaskRecord};
use crate::error::{FetchError, SessionError};
use crate::evaluator::AnswerPayload;
use crate::repository::fetch_lesson_tasks;
use crate::seeds::seed_lessons;
use crate::session::{LessonSession, MatchingDraft, SequenceState, SessionEvent};
use crate::store::{InMemoryStore, TaskStore};

/// How long a start request waits for the initial fetch before answering `Loading`.
pub const LOAD_WAIT: Duration = Duration::from_secs(10);

/// How often the idle sweeper runs.
const SWEEP_EVERY: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
  pub store: Arc<dyn TaskStore>,
  pub sessions: Arc<RwLock<HashMap<String, LessonSession>>>,
  pub feedback: FeedbackCopy,
  pub idle_ttl: Duration,
}

/// Snapshot of the current task, cloned out of the session lock.
#[derive(Clone, Debug)]
pub struct CurrentTask {
  pub state: SequenceState,
  pub position: usize,
  pub total: usize,
  pub record: Option<TaskRecord>,
  pub draft: MatchingDraft,
}

impl AppState {
  /// Build state from env: load config, merge the task bank with the seeds.
  #[instrument(level = "info", skip_all)]
  pub fn new() -> Self {
    let cfg = load_config_from_env().unwrap_or_default();

    let mut lessons = seed_lessons();
    for l in &cfg.lessons {
      lessons.push((LessonKey::new(&l.course_id, &l.lesson_id), l.course_type, l.documents()));
    }
    for (key, course_type, docs) in &lessons {
      info!(target: "lesson_tasks", lesson = %key, ?course_type, documents = docs.len(), "Startup lesson inventory");
    }

    Self::with_store(Arc::new(InMemoryStore::with_lessons(lessons)), cfg.feedback)
      .with_idle_ttl(Duration::from_secs(cfg.sessions.idle_ttl_secs))
  }

  pub fn with_store(store: Arc<dyn TaskStore>, feedback: FeedbackCopy) -> Self {
    Self {
      store,
      sessions: Arc::new(RwLock::new(HashMap::new())),
      feedback,
      idle_ttl: Duration::from_secs(SessionCfg::default().idle_ttl_secs),
    }
  }

  pub fn with_idle_ttl(mut self, idle_ttl: Duration) -> Self {
    self.idle_ttl = idle_ttl;
    self
  }

  /// Register a `Loading` session and spawn its fetch.
  #[instrument(level = "info", skip(self), fields(%key, ?course_type))]
  pub async fn start_session(
    &self,
    key: LessonKey,
    course_type: CourseType,
  ) -> (String, broadcast::Receiver<SessionEvent>) {
    let id = Uuid::new_v4().to_string();
    let mut session = LessonSession::new(id.clone(), key.clone(), course_type);
    let ticket = session.begin_load();
    let rx = session.subscribe();
    self.sessions.write().await.insert(id.clone(), session);
    info!(target: "session", %id, lesson = %key, "Session started");

    self.spawn_load(id.clone(), ticket, key, course_type);
    (id, rx)
  }

  /// Start a session and wait (bounded) for its first state after loading.
  pub async fn start_session_and_wait(
    &self,
    key: LessonKey,
    course_type: CourseType,
    wait: Duration,
  ) -> (String, SequenceState) {
    let (id, mut rx) = self.start_session(key, course_type).await;
    let loaded = tokio::time::timeout(wait, async {
      loop {
        match rx.recv().await {
          Ok(SessionEvent::Loaded { state }) => return state,
          Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
          Err(broadcast::error::RecvError::Closed) => return SequenceState::Abandoned,
        }
      }
    })
    .await;
    let state = match loaded {
      Ok(state) => state,
      Err(_) => self.session_state(&id).await.unwrap_or(SequenceState::Abandoned),
    };
    (id, state)
  }

  /// Retry the fetch of a session whose previous fetch failed.
  pub async fn reload_session(&self, id: &str) -> Result<SequenceState, SessionError> {
    let (ticket, key, course_type) = {
      let mut sessions = self.sessions.write().await;
      let s = sessions.get_mut(id).ok_or_else(|| SessionError::UnknownSession(id.to_string()))?;
      if !matches!(s.state(), SequenceState::FetchFailed { .. }) {
        return Err(SessionError::NotReloadable { state: s.state().name().to_string() });
      }
      (s.begin_load(), s.key().clone(), s.course_type())
    };
    self.spawn_load(id.to_string(), ticket, key, course_type);
    Ok(SequenceState::Loading)
  }

  fn spawn_load(&self, id: String, ticket: u64, key: LessonKey, course_type: CourseType) {
    let state = self.clone();
    tokio::spawn(async move {
      let result = fetch_lesson_tasks(state.store.as_ref(), &key, course_type).await;
      state.finish_load(&id, ticket, result).await;
    });
  }

  /// Deliver a fetch result; returns false when the session is gone or the result is stale.
  pub async fn finish_load(&self, id: &str, ticket: u64, result: Result<Vec<TaskRecord>, FetchError>) -> bool {
    let mut sessions = self.sessions.write().await;
    match sessions.get_mut(id) {
      Some(s) => s.complete_load(ticket, result),
      None => {
        debug!(target: "session", %id, "Fetch finished for a session that no longer exists; discarded");
        false
      }
    }
  }

  async fn with_session<R>(&self, id: &str, f: impl FnOnce(&mut LessonSession) -> R) -> Result<R, SessionError> {
    let mut sessions = self.sessions.write().await;
    let s = sessions.get_mut(id).ok_or_else(|| SessionError::UnknownSession(id.to_string()))?;
    s.touch();
    Ok(f(s))
  }

  /// Move a session forward; a session that reaches `Completed` is dropped
  /// from the registry, its summary travels in the returned state.
  async fn step(&self, id: &str, f: impl FnOnce(&mut LessonSession) -> SequenceState) -> Result<SequenceState, SessionError> {
    let mut sessions = self.sessions.write().await;
    let s = sessions.get_mut(id).ok_or_else(|| SessionError::UnknownSession(id.to_string()))?;
    s.touch();
    let next = f(s);
    if matches!(next, SequenceState::Completed { .. }) {
      sessions.remove(id);
      debug!(target: "session", %id, "Completed session evicted");
    }
    Ok(next)
  }

  pub async fn session_state(&self, id: &str) -> Result<SequenceState, SessionError> {
    self.with_session(id, |s| s.state().clone()).await
  }

  pub async fn current_task(&self, id: &str) -> Result<CurrentTask, SessionError> {
    self
      .with_session(id, |s| CurrentTask {
        state: s.state().clone(),
        position: s.position().unwrap_or_default(),
        total: s.total_tasks(),
        record: s.current_task().cloned(),
        draft: s.draft().clone(),
      })
      .await
  }

  #[instrument(level = "info", skip(self, answer), fields(%id))]
  pub async fn submit_answer(&self, id: &str, answer: Option<AnswerPayload>) -> Result<EvaluationResult, SessionError> {
    let copy = &self.feedback;
    self.with_session(id, |s| s.submit_answer(answer.as_ref(), copy)).await?
  }

  pub async fn select_key(&self, id: &str, key: &str) -> Result<MatchingDraft, SessionError> {
    self.with_session(id, |s| s.select_key(key).cloned()).await?
  }

  pub async fn match_value(&self, id: &str, value: &str) -> Result<MatchingDraft, SessionError> {
    self.with_session(id, |s| s.match_value(value).cloned()).await?
  }

  pub async fn unmatch(&self, id: &str, key: &str) -> Result<MatchingDraft, SessionError> {
    self.with_session(id, |s| s.unmatch(key).cloned()).await?
  }

  pub async fn submit_matching(&self, id: &str) -> Result<EvaluationResult, SessionError> {
    let copy = &self.feedback;
    self.with_session(id, |s| s.submit_matching(copy)).await?
  }

  pub async fn advance(&self, id: &str) -> Result<SequenceState, SessionError> {
    self.step(id, LessonSession::advance).await
  }

  pub async fn skip(&self, id: &str) -> Result<SequenceState, SessionError> {
    self.step(id, LessonSession::skip).await
  }

  pub async fn summary(&self, id: &str) -> Result<SessionSummary, SessionError> {
    self.with_session(id, |s| s.summary()).await
  }

  /// Abandon and forget a session; nothing about it is kept.
  #[instrument(level = "info", skip(self), fields(%id))]
  pub async fn abandon(&self, id: &str) -> Result<(), SessionError> {
    let mut session = self
      .sessions
      .write()
      .await
      .remove(id)
      .ok_or_else(|| SessionError::UnknownSession(id.to_string()))?;
    session.abandon();
    Ok(())
  }

  /// Abandon every session idle for longer than `idle_ttl` at `now`.
  /// Returns how many were removed.
  pub async fn sweep_idle(&self, now: Instant) -> usize {
    let mut sessions = self.sessions.write().await;
    let before = sessions.len();
    let ttl = self.idle_ttl;
    sessions.retain(|id, s| {
      let keep = now.saturating_duration_since(s.last_active()) < ttl;
      if !keep {
        debug!(target: "session", %id, state = s.state().name(), "Idle session swept");
        s.abandon();
      }
      keep
    });
    let swept = before - sessions.len();
    if swept > 0 {
      info!(target: "session", swept, live = sessions.len(), "Idle sessions swept");
    }
    swept
  }

  /// Run `sweep_idle` periodically for the lifetime of the runtime.
  pub fn spawn_idle_sweeper(&self) -> JoinHandle<()> {
    let state = self.clone();
    tokio::spawn(async move {
      let mut tick = tokio::time::interval(SWEEP_EVERY);
      tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
      loop {
        tick.tick().await;
        state.sweep_idle(Instant::now()).await;
      }
    })
  }

  pub async fn live_sessions(&self) -> usize {
    self.sessions.read().await.len()
  }

  /// Encoded documents of a lesson, in presentation order.
  pub async fn lesson_documents(&self, key: &LessonKey, course_type: CourseType) -> Result<Vec<Document>, FetchError> {
    let tasks = fetch_lesson_tasks(self.store.as_ref(), key, course_type).await?;
    Ok(tasks.iter().map(encode_record).collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::repository::tests::DownStore;

  fn seeded() -> AppState {
    AppState::with_store(Arc::new(InMemoryStore::with_lessons(seed_lessons())), FeedbackCopy::default())
  }

  #[tokio::test]
  async fn start_session_loads_seed_lesson() {
    let state = seeded();
    let (id, loaded) = state
      .start_session_and_wait(LessonKey::new("demo-science", "basics"), CourseType::Regular, LOAD_WAIT)
      .await;
    assert_eq!(loaded, SequenceState::InProgress { position: 0 });
    assert_eq!(
      state.reload_session(&id).await,
      Err(SessionError::NotReloadable { state: "in_progress".into() })
    );

    let current = state.current_task(&id).await.unwrap();
    assert_eq!(current.total, 5);
    assert_eq!(current.record.unwrap().id.as_deref(), Some("basics-1"));

    let res = state.submit_answer(&id, Some(AnswerPayload::Choice("Paris".into()))).await.unwrap();
    assert!(res.is_correct);
    for _ in 0..4 {
      state.advance(&id).await.unwrap();
    }
    assert_eq!(
      state.advance(&id).await.unwrap(),
      SequenceState::Completed { summary: SessionSummary { total_tasks: 5, correct_count: 1 } }
    );
  }

  #[tokio::test]
  async fn completed_sessions_leave_the_registry() {
    let state = seeded();
    for _ in 0..50 {
      let (id, _) = state
        .start_session_and_wait(LessonKey::new("demo-science", "basics"), CourseType::Regular, LOAD_WAIT)
        .await;
      loop {
        if let SequenceState::Completed { .. } = state.skip(&id).await.unwrap() {
          break;
        }
      }
      assert_eq!(state.advance(&id).await, Err(SessionError::UnknownSession(id.clone())));
    }
    assert_eq!(state.live_sessions().await, 0);
  }

  #[tokio::test]
  async fn idle_sessions_are_swept() {
    let state = seeded().with_idle_ttl(Duration::from_secs(60));
    let (idle, empty) = state
      .start_session_and_wait(LessonKey::new("nope", "nope"), CourseType::Regular, LOAD_WAIT)
      .await;
    assert_eq!(empty, SequenceState::NoExercises);
    let (active, _) = state
      .start_session_and_wait(LessonKey::new("demo-science", "basics"), CourseType::Regular, LOAD_WAIT)
      .await;

    assert_eq!(state.sweep_idle(Instant::now()).await, 0);
    assert_eq!(state.live_sessions().await, 2);

    let mut events = state.sessions.read().await[&active].subscribe();
    assert_eq!(state.sweep_idle(Instant::now() + Duration::from_secs(61)).await, 2);
    assert_eq!(state.session_state(&idle).await, Err(SessionError::UnknownSession(idle.clone())));
    assert!(matches!(events.recv().await, Ok(SessionEvent::Abandoned)));
  }

  #[tokio::test]
  async fn unknown_lesson_and_down_store_are_distinguishable() {
    let state = seeded();
    let (_, empty) = state
      .start_session_and_wait(LessonKey::new("nope", "nope"), CourseType::Regular, LOAD_WAIT)
      .await;
    assert_eq!(empty, SequenceState::NoExercises);

    let down = AppState::with_store(Arc::new(DownStore), FeedbackCopy::default());
    let (id, failed) = down
      .start_session_and_wait(LessonKey::new("c", "l"), CourseType::Regular, LOAD_WAIT)
      .await;
    assert!(matches!(failed, SequenceState::FetchFailed { .. }));
    assert_eq!(down.reload_session(&id).await.unwrap(), SequenceState::Loading);
  }

  #[tokio::test]
  async fn results_for_abandoned_sessions_are_dropped() {
    let state = seeded();
    let key = LessonKey::new("demo-science", "basics");
    let (id, _) = state.start_session_and_wait(key.clone(), CourseType::Regular, LOAD_WAIT).await;
    state.abandon(&id).await.unwrap();

    let late = fetch_lesson_tasks(state.store.as_ref(), &key, CourseType::Regular).await;
    assert!(!state.finish_load(&id, 1, late).await);
    assert_eq!(state.session_state(&id).await, Err(SessionError::UnknownSession(id.clone())));
    assert!(state.abandon(&id).await.is_err());
  }

  #[tokio::test]
  async fn legacy_matching_lesson_is_playable() {
    let state = seeded();
    let (id, _) = state
      .start_session_and_wait(LessonKey::new("demo-generated", "intro"), CourseType::Generated, LOAD_WAIT)
      .await;
    state.select_key(&id, "der Hund").await.unwrap();
    state.match_value(&id, "the dog").await.unwrap();
    state.select_key(&id, "die Katze").await.unwrap();
    let draft = state.match_value(&id, "the cat").await.unwrap();
    assert_eq!(draft.pairs().len(), 2);
    assert!(state.submit_matching(&id).await.unwrap().is_correct);
  }

  #[tokio::test]
  async fn lesson_documents_are_canonical() {
    let state = seeded();
    let docs = state
      .lesson_documents(&LessonKey::new("demo-generated", "intro"), CourseType::Generated)
      .await
      .unwrap();
    assert_eq!(docs[0]["type"], "MATCHING");
    assert_eq!(docs[0]["pairs"][0]["key"], "der Hund");
  }
}
