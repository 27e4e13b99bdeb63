//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::domain::{split_gap_segments, CourseType, EvaluationResult, SessionSummary, TaskVariant, FALSE_ANSWER, TRUE_ANSWER};
use crate::evaluator::AnswerPayload;
use crate::session::{MatchingDraft, SequenceState};
use crate::state::CurrentTask;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
  Ping,
  StartSession {
    #[serde(rename = "courseId")]
    course_id: String,
    #[serde(rename = "lessonId")]
    lesson_id: String,
    #[serde(default, rename = "courseType")]
    course_type: CourseType,
  },
  CurrentTask {
    #[serde(rename = "sessionId")]
    session_id: String,
  },
  SubmitAnswer {
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(default)]
    answer: Option<AnswerPayload>,
  },
  SelectKey {
    #[serde(rename = "sessionId")]
    session_id: String,
    key: String,
  },
  MatchValue {
    #[serde(rename = "sessionId")]
    session_id: String,
    value: String,
  },
  Unmatch {
    #[serde(rename = "sessionId")]
    session_id: String,
    key: String,
  },
  SubmitMatching {
    #[serde(rename = "sessionId")]
    session_id: String,
  },
  Advance {
    #[serde(rename = "sessionId")]
    session_id: String,
  },
  Skip {
    #[serde(rename = "sessionId")]
    session_id: String,
  },
  Summary {
    #[serde(rename = "sessionId")]
    session_id: String,
  },
  Abandon {
    #[serde(rename = "sessionId")]
    session_id: String,
  },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
  Pong,
  Session {
    #[serde(rename = "sessionId")]
    session_id: String,
    state: SequenceState,
  },
  Task {
    #[serde(rename = "sessionId")]
    session_id: String,
    state: SequenceState,
    task: Option<TaskOut>,
    #[serde(skip_serializing_if = "Option::is_none")]
    draft: Option<MatchingDraft>,
  },
  AnswerResult {
    #[serde(rename = "sessionId")]
    session_id: String,
    result: EvaluationResult,
  },
  Draft {
    #[serde(rename = "sessionId")]
    session_id: String,
    draft: MatchingDraft,
  },
  Summary {
    #[serde(rename = "sessionId")]
    session_id: String,
    summary: SessionSummary,
  },
  Abandoned {
    #[serde(rename = "sessionId")]
    session_id: String,
  },
  Error {
    message: String,
  },
}

/// Consumer projection of a task: everything needed to present it, no answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskView {
  TextQuiz {
    question: String,
    options: Vec<String>,
  },
  FillInGaps {
    /// Text around the gaps; `segments.len() == gapOptions.len() + 1` for valid tasks.
    segments: Vec<String>,
    #[serde(rename = "gapOptions")]
    gap_options: Vec<Vec<String>>,
  },
  Matching {
    question: String,
    keys: Vec<String>,
    /// Shuffled so the order does not reveal the pairing.
    values: Vec<String>,
  },
  TrueOrFalse {
    statement: String,
    choices: Vec<String>,
  },
  OpenAnswer {
    question: String,
    description: String,
  },
}

/// Map a task onto its presentation.
pub fn to_view(task: &TaskVariant) -> TaskView {
  match task {
    TaskVariant::TextQuiz { question, options, .. } => {
      TaskView::TextQuiz { question: question.clone(), options: options.clone() }
    }
    TaskVariant::FillInGaps { text, gaps } => TaskView::FillInGaps {
      segments: split_gap_segments(text),
      gap_options: gaps.iter().map(|g| g.options.clone()).collect(),
    },
    TaskVariant::Matching { question, pairs } => {
      let mut values: Vec<String> = pairs.iter().map(|p| p.value.clone()).collect();
      values.shuffle(&mut rand::thread_rng());
      TaskView::Matching { question: question.clone(), keys: pairs.iter().map(|p| p.key.clone()).collect(), values }
    }
    TaskVariant::TrueOrFalse { statement, .. } => TaskView::TrueOrFalse {
      statement: statement.clone(),
      choices: vec![TRUE_ANSWER.to_string(), FALSE_ANSWER.to_string()],
    },
    TaskVariant::OpenAnswer { question, description, .. } => {
      TaskView::OpenAnswer { question: question.clone(), description: description.clone() }
    }
  }
}

/// DTO used by both WS and HTTP for task delivery.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOut {
  pub id: Option<String>,
  pub position: usize,
  pub total: usize,
  pub task: TaskView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentTaskOut {
  pub state: SequenceState,
  pub task: Option<TaskOut>,
  /// Matches made so far, for matching tasks.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub draft: Option<MatchingDraft>,
}

pub fn to_current_out(c: &CurrentTask) -> CurrentTaskOut {
  CurrentTaskOut {
    state: c.state.clone(),
    task: c.record.as_ref().map(|r| TaskOut {
      id: r.id.clone(),
      position: c.position,
      total: c.total,
      task: to_view(&r.task),
    }),
    draft: match c.record.as_ref().map(|r| &r.task) {
      Some(TaskVariant::Matching { .. }) => Some(c.draft.clone()),
      _ => None,
    },
  }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionIn {
  pub course_id: String,
  pub lesson_id: String,
  #[serde(default)]
  pub course_type: CourseType,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOut {
  pub session_id: String,
  pub state: SequenceState,
}

#[derive(Debug, Deserialize)]
pub struct AnswerIn {
  #[serde(default)]
  pub answer: Option<AnswerPayload>,
}

#[derive(Debug, Deserialize)]
pub struct KeyIn {
  pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct ValueIn {
  pub value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonTasksQuery {
  #[serde(default)]
  pub course_type: CourseType,
}

#[derive(Serialize)]
pub struct HealthOut {
  pub ok: bool,
  /// Live exercise sessions.
  pub sessions: usize,
}
