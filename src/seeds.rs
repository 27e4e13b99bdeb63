//! Built-in lessons so the service is usable without a config file.

use serde_json::{json, Value};

use crate::codec::Document;
use crate::domain::{CourseType, LessonKey};

fn doc(v: Value) -> Document {
  match v {
    Value::Object(m) => m,
    _ => Document::new(),
  }
}

/// Seed lessons: one regular course lesson covering every task kind and a
/// generated-course lesson written in the legacy matching schema.
pub fn seed_lessons() -> Vec<(LessonKey, CourseType, Vec<Document>)> {
  vec![
    (
      LessonKey::new("demo-science", "basics"),
      CourseType::Regular,
      vec![
        doc(json!({
          "id": "basics-1", "order": 1, "type": "TEXT_QUIZ",
          "question": "What is the capital of France?",
          "options": ["London", "Marseille", "Paris", "Zurich"],
          "answer": "Paris"
        })),
        doc(json!({
          "id": "basics-2", "order": 2, "type": "FILL_IN_GAPS",
          "text": "The sky is __ and grass is __.",
          "gaps": [
            {"answer": "blue", "options": ["blue", "red", "yellow"]},
            {"answer": "green", "options": ["green", "purple", "grey"]}
          ]
        })),
        doc(json!({
          "id": "basics-3", "order": 3, "type": "MATCHING", "schemaVersion": 2,
          "question": "Match each formula with its substance.",
          "pairs": [
            {"key": "H2O", "value": "Water"},
            {"key": "CO2", "value": "Carbon Dioxide"}
          ]
        })),
        doc(json!({
          "id": "basics-4", "order": 4, "type": "TRUE_OR_FALSE",
          "statement": "Sound travels faster than light.",
          "answer": "False"
        })),
        doc(json!({
          "id": "basics-5", "order": 5, "type": "OPEN_ANSWER",
          "question": "Which gas do plants absorb from the air?",
          "description": "Answer with the common name.",
          "answer": "Carbon dioxide"
        })),
      ],
    ),
    (
      LessonKey::new("demo-generated", "intro"),
      CourseType::Generated,
      vec![
        doc(json!({
          "id": "intro-1", "order": 1, "type": "matching",
          "question": "Match the words with their translations.",
          "pairs": [
            {"term": "der Hund", "definition": "the dog"},
            {"term": "die Katze", "definition": "the cat"}
          ]
        })),
        doc(json!({
          "id": "intro-2", "order": 2, "type": "true_or_false",
          "statement": "\"das Haus\" means \"the house\".",
          "answer": true
        })),
      ],
    ),
  ]
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::codec::decode_document;

  #[test]
  fn every_seed_document_decodes_and_validates() {
    for (key, _, docs) in seed_lessons() {
      for d in &docs {
        let rec = decode_document(d).unwrap_or_else(|| panic!("seed in {key} failed to decode"));
        assert!(rec.task.validate().is_ok(), "seed {:?} invalid", rec.id);
      }
    }
  }
}
