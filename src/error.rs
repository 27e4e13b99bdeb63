//! Error types for the codec, the store boundary, tasks and sessions.

use thiserror::Error;

use crate::domain::TaskKind;

/// Why a single task document could not be decoded. Never fatal for a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
  #[error("document has no `type` field")]
  MissingType,

  #[error("unknown task type '{0}'")]
  UnknownType(String),

  #[error("{kind}: missing required field `{field}`")]
  MissingField { kind: TaskKind, field: &'static str },

  #[error("{kind}: field `{field}` should be {expected}")]
  WrongType { kind: TaskKind, field: &'static str, expected: &'static str },
}

/// Failure reported by a document store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
  #[error("store unreachable: {0}")]
  Unreachable(String),
}

/// Lesson fetch failure, kept distinct from a lesson with zero tasks.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
  #[error("task fetch failed for {path}: {source}")]
  StoreUnavailable {
    path: String,
    #[source]
    source: StoreError,
  },
}

/// A task whose data cannot be evaluated meaningfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskDataError {
  #[error("{kind} task has no options")]
  EmptyOptions { kind: TaskKind },

  #[error("text has {markers} gap markers but {gaps} gaps are defined")]
  GapCountMismatch { markers: usize, gaps: usize },

  #[error("true/false answer must be \"True\" or \"False\", got '{0}'")]
  BadBooleanAnswer(String),
}

/// Operations on a session that is missing or in the wrong state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
  #[error("unknown session '{0}'")]
  UnknownSession(String),

  #[error("session is {state}, not in progress")]
  NotInProgress { state: String },

  #[error("session is {state}; only a failed fetch can be reloaded")]
  NotReloadable { state: String },

  #[error("current task is not a matching task")]
  NotMatching,

  #[error("no key selected")]
  NoKeySelected,
}
