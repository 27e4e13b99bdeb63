//! Domain models: task variants, their payload pieces, lesson identity and results.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::TaskDataError;

/// Discriminant of a task document (`type` field), upper snake case on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskKind {
  TextQuiz,
  FillInGaps,
  Matching,
  TrueOrFalse,
  OpenAnswer,
}

impl TaskKind {
  pub const ALL: [TaskKind; 5] = [
    TaskKind::TextQuiz,
    TaskKind::FillInGaps,
    TaskKind::Matching,
    TaskKind::TrueOrFalse,
    TaskKind::OpenAnswer,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      TaskKind::TextQuiz => "TEXT_QUIZ",
      TaskKind::FillInGaps => "FILL_IN_GAPS",
      TaskKind::Matching => "MATCHING",
      TaskKind::TrueOrFalse => "TRUE_OR_FALSE",
      TaskKind::OpenAnswer => "OPEN_ANSWER",
    }
  }

  /// Case-insensitive lookup of a raw `type` value.
  pub fn parse(raw: &str) -> Option<TaskKind> {
    let upper = raw.trim().to_uppercase();
    TaskKind::ALL.into_iter().find(|k| k.as_str() == upper)
  }
}

impl fmt::Display for TaskKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One blank in a fill-in-the-gaps text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gap {
  pub answer: String,
  /// Choices offered for this gap. Set semantics: duplicates are dropped, first occurrence wins.
  pub options: Vec<String>,
}

impl Gap {
  pub fn new(answer: impl Into<String>, options: impl IntoIterator<Item = impl Into<String>>) -> Self {
    let mut unique: Vec<String> = Vec::new();
    for o in options.into_iter().map(Into::into) {
      if !unique.contains(&o) {
        unique.push(o);
      }
    }
    Self { answer: answer.into(), options: unique }
  }
}

/// A correct (key, value) association of a matching task.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct MatchingPair {
  pub key: String,
  pub value: String,
}

impl MatchingPair {
  pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
    Self { key: key.into(), value: value.into() }
  }
}

/// The closed set of exercise tasks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskVariant {
  TextQuiz { question: String, options: Vec<String>, answer: String },
  FillInGaps { text: String, gaps: Vec<Gap> },
  Matching { question: String, pairs: Vec<MatchingPair> },
  /// `answer` is `"True"` or `"False"`.
  TrueOrFalse { statement: String, answer: String },
  OpenAnswer { question: String, description: String, answer: String },
}

pub const TRUE_ANSWER: &str = "True";
pub const FALSE_ANSWER: &str = "False";

fn gap_marker_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"_{2,}").expect("static gap marker pattern"))
}

/// Number of gap markers (runs of two or more underscores) in `text`.
pub fn count_gap_markers(text: &str) -> usize {
  gap_marker_re().find_iter(text).count()
}

/// Split `text` around gap markers; `n` markers yield `n + 1` segments.
pub fn split_gap_segments(text: &str) -> Vec<String> {
  gap_marker_re().split(text).map(str::to_string).collect()
}

impl TaskVariant {
  pub fn kind(&self) -> TaskKind {
    match self {
      TaskVariant::TextQuiz { .. } => TaskKind::TextQuiz,
      TaskVariant::FillInGaps { .. } => TaskKind::FillInGaps,
      TaskVariant::Matching { .. } => TaskKind::Matching,
      TaskVariant::TrueOrFalse { .. } => TaskKind::TrueOrFalse,
      TaskVariant::OpenAnswer { .. } => TaskKind::OpenAnswer,
    }
  }

  /// Self-check before presenting or evaluating a task.
  pub fn validate(&self) -> Result<(), TaskDataError> {
    match self {
      TaskVariant::TextQuiz { options, .. } if options.is_empty() => {
        Err(TaskDataError::EmptyOptions { kind: self.kind() })
      }
      TaskVariant::Matching { pairs, .. } if pairs.is_empty() => {
        Err(TaskDataError::EmptyOptions { kind: self.kind() })
      }
      TaskVariant::FillInGaps { text, gaps } => {
        if gaps.is_empty() {
          return Err(TaskDataError::EmptyOptions { kind: self.kind() });
        }
        let markers = count_gap_markers(text);
        if markers != gaps.len() {
          return Err(TaskDataError::GapCountMismatch { markers, gaps: gaps.len() });
        }
        Ok(())
      }
      TaskVariant::TrueOrFalse { answer, .. } if answer != TRUE_ANSWER && answer != FALSE_ANSWER => {
        Err(TaskDataError::BadBooleanAnswer(answer.clone()))
      }
      _ => Ok(()),
    }
  }

  /// Human-readable canonical answer, used in feedback copy.
  pub fn canonical_answer(&self) -> String {
    match self {
      TaskVariant::TextQuiz { answer, .. }
      | TaskVariant::TrueOrFalse { answer, .. }
      | TaskVariant::OpenAnswer { answer, .. } => answer.clone(),
      TaskVariant::FillInGaps { gaps, .. } => {
        gaps.iter().map(|g| g.answer.as_str()).collect::<Vec<_>>().join(", ")
      }
      TaskVariant::Matching { pairs, .. } => pairs
        .iter()
        .map(|p| format!("{} = {}", p.key, p.value))
        .collect::<Vec<_>>()
        .join("; "),
    }
  }
}

/// A decoded task plus the document metadata that travels with it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskRecord {
  pub id: Option<String>,
  /// Explicit authoring order; drives lesson ordering.
  pub order: Option<i64>,
  pub task: TaskVariant,
}

impl TaskRecord {
  pub fn new(task: TaskVariant) -> Self {
    Self { id: None, order: None, task }
  }
}

/// Selects the top-level collection a lesson lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseType {
  #[default]
  Regular,
  Generated,
}

impl CourseType {
  pub fn collection(self) -> &'static str {
    match self {
      CourseType::Regular => "courses",
      CourseType::Generated => "generatedCourses",
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonKey {
  pub course_id: String,
  pub lesson_id: String,
}

impl LessonKey {
  pub fn new(course_id: impl Into<String>, lesson_id: impl Into<String>) -> Self {
    Self { course_id: course_id.into(), lesson_id: lesson_id.into() }
  }

  /// Document path of the lesson's task collection.
  pub fn tasks_path(&self, course_type: CourseType) -> String {
    format!("{}/{}/lessons/{}/tasks", course_type.collection(), self.course_id, self.lesson_id)
  }
}

impl fmt::Display for LessonKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.course_id, self.lesson_id)
  }
}

/// Outcome of checking one submitted answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
  pub is_correct: bool,
  pub feedback_message: Option<String>,
  /// Per-gap correctness for fill-in-gaps tasks; informational only.
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub gap_marks: Vec<bool>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
  pub total_tasks: usize,
  pub correct_count: usize,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kind_parse_is_case_insensitive() {
    assert_eq!(TaskKind::parse("text_quiz"), Some(TaskKind::TextQuiz));
    assert_eq!(TaskKind::parse(" Matching "), Some(TaskKind::Matching));
    assert_eq!(TaskKind::parse("essay"), None);
  }

  #[test]
  fn gap_markers_counted_and_split() {
    let text = "The sky is __ and grass is ___.";
    assert_eq!(count_gap_markers(text), 2);
    assert_eq!(split_gap_segments(text), vec!["The sky is ", " and grass is ", "."]);
    assert_eq!(count_gap_markers("snake_case has one underscore"), 0);
  }

  #[test]
  fn validate_flags_empty_and_mismatched_tasks() {
    let quiz = TaskVariant::TextQuiz { question: "q".into(), options: vec![], answer: "a".into() };
    assert!(matches!(quiz.validate(), Err(TaskDataError::EmptyOptions { .. })));

    let gaps = TaskVariant::FillInGaps {
      text: "only __ here".into(),
      gaps: vec![Gap::new("one", ["one"]), Gap::new("two", ["two"])],
    };
    assert!(matches!(gaps.validate(), Err(TaskDataError::GapCountMismatch { markers: 1, gaps: 2 })));

    let tf = TaskVariant::TrueOrFalse { statement: "s".into(), answer: "yes".into() };
    assert!(tf.validate().is_err());

    let open = TaskVariant::OpenAnswer { question: "q".into(), description: String::new(), answer: "a".into() };
    assert!(open.validate().is_ok());
  }

  #[test]
  fn course_type_selects_collection() {
    let key = LessonKey::new("c1", "l2");
    assert_eq!(key.tasks_path(CourseType::Regular), "courses/c1/lessons/l2/tasks");
    assert_eq!(key.tasks_path(CourseType::Generated), "generatedCourses/c1/lessons/l2/tasks");
  }
}
