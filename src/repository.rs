//! Batch fetch of a lesson's tasks: store query, per-document decode, ordering.

use tracing::{info, instrument, warn};

use crate::codec::decode_document;
use crate::domain::{CourseType, LessonKey, TaskRecord};
use crate::error::FetchError;
use crate::store::TaskStore;

/// Fetch and decode the tasks of one lesson.
///
/// Malformed documents are skipped. Tasks are ordered by their explicit
/// `order` field; tasks without one follow in store order. A store failure is
/// an error, distinct from `Ok(vec![])` for a lesson without tasks.
#[instrument(level = "info", skip(store), fields(%key, ?course_type))]
pub async fn fetch_lesson_tasks(
  store: &dyn TaskStore,
  key: &LessonKey,
  course_type: CourseType,
) -> Result<Vec<TaskRecord>, FetchError> {
  let path = key.tasks_path(course_type);
  let docs = store
    .fetch_tasks_for_lesson(key, course_type)
    .await
    .map_err(|source| FetchError::StoreUnavailable { path: path.clone(), source })?;

  let fetched = docs.len();
  let mut tasks: Vec<TaskRecord> = docs.iter().filter_map(decode_document).collect();
  let skipped = fetched - tasks.len();
  if skipped > 0 {
    warn!(target: "task_codec", %path, skipped, fetched, "Some task documents were skipped");
  }

  // Stable: unordered tasks keep store order after the ordered ones.
  tasks.sort_by_key(|t| (t.order.is_none(), t.order.unwrap_or_default()));

  info!(target: "lesson_tasks", %path, count = tasks.len(), "Lesson tasks fetched");
  Ok(tasks)
}
