//! Loading service configuration (feedback copy + optional task bank) from TOML.
//!
//! See `AppConfig` and `FeedbackCopy` for the expected schema.

use serde::Deserialize;
use tracing::{error, info};

use crate::codec::Document;
use crate::domain::CourseType;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub feedback: FeedbackCopy,
  #[serde(default)]
  pub sessions: SessionCfg,
  #[serde(default)]
  pub lessons: Vec<LessonBankCfg>,
}

/// Session housekeeping. Sessions without client activity for
/// `idle_ttl_secs` are abandoned by the sweeper.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionCfg {
  pub idle_ttl_secs: u64,
}

impl Default for SessionCfg {
  fn default() -> Self {
    Self { idle_ttl_secs: 30 * 60 }
  }
}

/// Lesson entry accepted in TOML configuration. `tasks` are raw store
/// documents and go through the same codec as store data.
#[derive(Clone, Debug, Deserialize)]
pub struct LessonBankCfg {
  pub course_id: String,
  pub lesson_id: String,
  #[serde(default)]
  pub course_type: CourseType,
  #[serde(default)]
  pub tasks: Vec<toml::Table>,
}

impl LessonBankCfg {
  /// Task tables as JSON documents; entries that do not convert are dropped.
  pub fn documents(&self) -> Vec<Document> {
    self
      .tasks
      .iter()
      .filter_map(|t| match serde_json::to_value(t) {
        Ok(serde_json::Value::Object(m)) => Some(m),
        _ => None,
      })
      .collect()
  }
}

/// User-facing feedback templates. Placeholders: `{answer}`, `{wrong}`,
/// `{total}`, `{reason}`, `{kind}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FeedbackCopy {
  pub correct: String,
  pub incorrect: String,
  pub missing_answer: String,
  pub gaps_incorrect: String,
  pub matching_incorrect: String,
  pub invalid_task: String,
  pub wrong_shape: String,
}

impl Default for FeedbackCopy {
  fn default() -> Self {
    Self {
      correct: "Correct!".into(),
      incorrect: "Not quite. The correct answer is: {answer}".into(),
      missing_answer: "No answer given. The correct answer is: {answer}".into(),
      gaps_incorrect: "{wrong} of {total} gaps are filled incorrectly.".into(),
      matching_incorrect: "{wrong} of {total} pairs are not matched correctly.".into(),
      invalid_task: "This task cannot be checked: {reason}".into(),
      wrong_shape: "This answer does not fit a {kind} task.".into(),
    }
  }
}

/// Attempt to load `AppConfig` from TASKS_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("TASKS_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_config(&s) {
      Ok(cfg) => {
        info!(target: "lesson_tasks", %path, lessons = cfg.lessons.len(), "Loaded config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "lesson_tasks", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "lesson_tasks", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

pub fn parse_config(s: &str) -> Result<AppConfig, toml::de::Error> {
  toml::from_str::<AppConfig>(s)
}
