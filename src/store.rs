//! Document store boundary and the in-memory store the service runs on.
//!
//! The task engine only reads raw documents through `TaskStore`; connection
//! lifecycle, authentication and retries belong to the store implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::codec::Document;
use crate::domain::{CourseType, LessonKey};
use crate::error::StoreError;

#[async_trait]
pub trait TaskStore: Send + Sync {
  /// Raw task documents of one lesson, in store order.
  async fn fetch_tasks_for_lesson(
    &self,
    key: &LessonKey,
    course_type: CourseType,
  ) -> Result<Vec<Document>, StoreError>;
}

/// Lesson documents keyed by collection and lesson.
#[derive(Default)]
pub struct InMemoryStore {
  lessons: HashMap<(CourseType, LessonKey), Vec<Document>>,
}

impl InMemoryStore {
  /// Build a store from lesson documents; documents of repeated lessons are appended.
  pub fn with_lessons(lessons: impl IntoIterator<Item = (LessonKey, CourseType, Vec<Document>)>) -> Self {
    let mut map: HashMap<(CourseType, LessonKey), Vec<Document>> = HashMap::new();
    for (key, course_type, docs) in lessons {
      map.entry((course_type, key)).or_default().extend(docs);
    }
    Self { lessons: map }
  }
}

#[async_trait]
impl TaskStore for InMemoryStore {
  #[instrument(level = "debug", skip(self), fields(%key, ?course_type))]
  async fn fetch_tasks_for_lesson(
    &self,
    key: &LessonKey,
    course_type: CourseType,
  ) -> Result<Vec<Document>, StoreError> {
    let docs = self.lessons.get(&(course_type, key.clone())).cloned().unwrap_or_default();
    debug!(target: "lesson_tasks", path = %key.tasks_path(course_type), count = docs.len(), "Store query");
    Ok(docs)
  }
}
