//! Lesson exercise session: ordered tasks, position, per-task results.
//!
//! # State Machine
//! ```text
//! Loading -> InProgress(0) -> InProgress(i+1) -> Completed(summary)
//!         \-> NoExercises
//!         \-> FetchFailed -> Loading (retry)
//! any non-terminal -> Abandoned
//! ```
//!
//! Each session owns a broadcast channel of `SessionEvent`s; listeners are
//! scoped to the session and the channel closes when the session is dropped.

use std::time::Instant;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::FeedbackCopy;
use crate::domain::{CourseType, EvaluationResult, LessonKey, MatchingPair, SessionSummary, TaskRecord, TaskVariant};
use crate::error::{FetchError, SessionError};
use crate::evaluator::{evaluate, AnswerPayload};

const EVENT_CAPACITY: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SequenceState {
  /// Tasks not fetched yet.
  Loading,
  /// Fetched, and the lesson has no tasks.
  NoExercises,
  FetchFailed { message: String },
  InProgress { position: usize },
  Completed { summary: SessionSummary },
  Abandoned,
}

impl SequenceState {
  pub fn name(&self) -> &'static str {
    match self {
      SequenceState::Loading => "loading",
      SequenceState::NoExercises => "no_exercises",
      SequenceState::FetchFailed { .. } => "fetch_failed",
      SequenceState::InProgress { .. } => "in_progress",
      SequenceState::Completed { .. } => "completed",
      SequenceState::Abandoned => "abandoned",
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
  Loaded { state: SequenceState },
  Evaluated { position: usize, result: EvaluationResult },
  Advanced { state: SequenceState },
  Abandoned,
}

/// In-progress matches of the current matching task.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingDraft {
  selected_key: Option<String>,
  matched: Vec<MatchingPair>,
}

impl MatchingDraft {
  pub fn select_key(&mut self, key: impl Into<String>) {
    self.selected_key = Some(key.into());
  }

  /// Pair the selected key with `value`, replacing an earlier match of that
  /// key. Several keys may share a value.
  pub fn match_value(&mut self, value: impl Into<String>) -> Result<MatchingPair, SessionError> {
    let key = self.selected_key.take().ok_or(SessionError::NoKeySelected)?;
    let pair = MatchingPair::new(key, value);
    self.matched.retain(|p| p.key != pair.key);
    self.matched.push(pair.clone());
    Ok(pair)
  }

  pub fn unmatch(&mut self, key: &str) {
    self.matched.retain(|p| p.key != key);
  }

  pub fn pairs(&self) -> &[MatchingPair] {
    &self.matched
  }
}

pub struct LessonSession {
  id: String,
  key: LessonKey,
  course_type: CourseType,
  state: SequenceState,
  tasks: Vec<TaskRecord>,
  /// Latest outcome per position; `None` until answered.
  results: Vec<Option<bool>>,
  load_ticket: u64,
  draft: MatchingDraft,
  last_active: Instant,
  events: broadcast::Sender<SessionEvent>,
}

impl LessonSession {
  pub fn new(id: impl Into<String>, key: LessonKey, course_type: CourseType) -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    Self {
      id: id.into(),
      key,
      course_type,
      state: SequenceState::Loading,
      tasks: Vec::new(),
      results: Vec::new(),
      load_ticket: 0,
      draft: MatchingDraft::default(),
      last_active: Instant::now(),
      events,
    }
  }

  pub fn key(&self) -> &LessonKey {
    &self.key
  }

  pub fn course_type(&self) -> CourseType {
    self.course_type
  }

  pub fn state(&self) -> &SequenceState {
    &self.state
  }

  pub fn draft(&self) -> &MatchingDraft {
    &self.draft
  }

  /// Record client activity; idle sessions are swept by `AppState`.
  pub fn touch(&mut self) {
    self.last_active = Instant::now();
  }

  pub fn last_active(&self) -> Instant {
    self.last_active
  }

  pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
    self.events.subscribe()
  }

  /// Start (or retry) a fetch. Only the result carrying the returned ticket
  /// is applied.
  pub fn begin_load(&mut self) -> u64 {
    self.load_ticket += 1;
    self.state = SequenceState::Loading;
    self.load_ticket
  }

  /// Apply a fetch result. Returns false when the result is stale (an older
  /// ticket, or the session already left `Loading`).
  pub fn complete_load(&mut self, ticket: u64, result: Result<Vec<TaskRecord>, FetchError>) -> bool {
    if ticket != self.load_ticket || self.state != SequenceState::Loading {
      debug!(target: "session", id = %self.id, ticket, current = self.load_ticket, state = self.state.name(), "Discarding stale fetch result");
      return false;
    }
    self.state = match result {
      Ok(tasks) if tasks.is_empty() => SequenceState::NoExercises,
      Ok(tasks) => {
        self.results = vec![None; tasks.len()];
        self.tasks = tasks;
        SequenceState::InProgress { position: 0 }
      }
      Err(e) => {
        warn!(target: "session", id = %self.id, error = %e, "Lesson fetch failed");
        SequenceState::FetchFailed { message: e.to_string() }
      }
    };
    info!(target: "session", id = %self.id, lesson = %self.key, state = self.state.name(), tasks = self.tasks.len(), "Session loaded");
    self.emit(SessionEvent::Loaded { state: self.state.clone() });
    true
  }

  pub fn current_task(&self) -> Option<&TaskRecord> {
    match self.state {
      SequenceState::InProgress { position } => self.tasks.get(position),
      _ => None,
    }
  }

  pub fn position(&self) -> Option<usize> {
    match self.state {
      SequenceState::InProgress { position } => Some(position),
      _ => None,
    }
  }

  pub fn total_tasks(&self) -> usize {
    self.tasks.len()
  }

  /// Evaluate an answer for the current task and record the outcome.
  pub fn submit_answer(
    &mut self,
    answer: Option<&AnswerPayload>,
    copy: &FeedbackCopy,
  ) -> Result<EvaluationResult, SessionError> {
    let position = self.require_in_progress()?;
    let result = evaluate(&self.tasks[position].task, answer, copy);
    self.results[position] = Some(result.is_correct);
    debug!(target: "session", id = %self.id, position, correct = result.is_correct, "Answer evaluated");
    self.emit(SessionEvent::Evaluated { position, result: result.clone() });
    Ok(result)
  }

  pub fn select_key(&mut self, key: &str) -> Result<&MatchingDraft, SessionError> {
    self.require_matching()?;
    self.draft.select_key(key);
    Ok(&self.draft)
  }

  pub fn match_value(&mut self, value: &str) -> Result<&MatchingDraft, SessionError> {
    self.require_matching()?;
    self.draft.match_value(value)?;
    Ok(&self.draft)
  }

  pub fn unmatch(&mut self, key: &str) -> Result<&MatchingDraft, SessionError> {
    self.require_matching()?;
    self.draft.unmatch(key);
    Ok(&self.draft)
  }

  /// Submit the matches collected so far for the current matching task.
  pub fn submit_matching(&mut self, copy: &FeedbackCopy) -> Result<EvaluationResult, SessionError> {
    self.require_matching()?;
    let payload = AnswerPayload::Pairs(self.draft.pairs().to_vec());
    self.submit_answer(Some(&payload), copy)
  }

  /// Move to the next task, or to `Completed` past the last one. No-op
  /// outside `InProgress`.
  pub fn advance(&mut self) -> SequenceState {
    if let SequenceState::InProgress { position } = self.state {
      self.state = if position + 1 < self.tasks.len() {
        SequenceState::InProgress { position: position + 1 }
      } else {
        let summary = self.summary();
        info!(target: "session", id = %self.id, total = summary.total_tasks, correct = summary.correct_count, "Session completed");
        SequenceState::Completed { summary }
      };
      self.draft = MatchingDraft::default();
      self.emit(SessionEvent::Advanced { state: self.state.clone() });
    }
    self.state.clone()
  }

  /// Same position movement as `advance`.
  pub fn skip(&mut self) -> SequenceState {
    if let Some(position) = self.position() {
      debug!(target: "session", id = %self.id, position, "Task skipped");
    }
    self.advance()
  }

  pub fn summary(&self) -> SessionSummary {
    SessionSummary {
      total_tasks: self.tasks.len(),
      correct_count: self.results.iter().filter(|r| **r == Some(true)).count(),
    }
  }

  pub fn abandon(&mut self) {
    if self.state != SequenceState::Abandoned {
      info!(target: "session", id = %self.id, state = self.state.name(), "Session abandoned");
      self.state = SequenceState::Abandoned;
      self.emit(SessionEvent::Abandoned);
    }
  }

  fn require_in_progress(&self) -> Result<usize, SessionError> {
    self.position().ok_or_else(|| SessionError::NotInProgress { state: self.state.name().to_string() })
  }

  fn require_matching(&self) -> Result<(), SessionError> {
    let position = self.require_in_progress()?;
    match self.tasks[position].task {
      TaskVariant::Matching { .. } => Ok(()),
      _ => Err(SessionError::NotMatching),
    }
  }

  fn emit(&self, event: SessionEvent) {
    // No listeners is fine.
    let _ = self.events.send(event);
  }
}
