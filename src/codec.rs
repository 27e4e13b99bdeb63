//! Conversion between loosely-typed store documents and `TaskRecord`s.
//!
//! Decoding is tolerant: a document that cannot be decoded yields `None`
//! (or a `CodecError` from `try_decode_document`) and never aborts a batch.
//!
//! Matching pairs: the canonical schema is `{key, value}`. Documents written
//! before schema version 2 may carry `{term, definition}` pairs; those are
//! migrated by `migrate_legacy_pair` and re-encoded canonically. Documents that
//! declare `schemaVersion: 2` get no migration.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::{Gap, MatchingPair, TaskKind, TaskRecord, TaskVariant, FALSE_ANSWER, TRUE_ANSWER};
use crate::error::CodecError;

/// Raw document as returned by the store.
pub type Document = Map<String, Value>;

pub const SCHEMA_VERSION: i64 = 2;

/// Decode one document; malformed documents are logged and skipped.
pub fn decode_document(doc: &Document) -> Option<TaskRecord> {
  match try_decode_document(doc) {
    Ok(rec) => Some(rec),
    Err(e) => {
      let id = doc.get("id").and_then(Value::as_str).unwrap_or("<no id>");
      warn!(target: "task_codec", %id, error = %e, "Skipping malformed task document");
      None
    }
  }
}

pub fn try_decode_document(doc: &Document) -> Result<TaskRecord, CodecError> {
  let raw_type = match doc.get("type") {
    Some(Value::String(s)) => s,
    _ => return Err(CodecError::MissingType),
  };
  let kind = TaskKind::parse(raw_type).ok_or_else(|| CodecError::UnknownType(raw_type.clone()))?;

  let task = match kind {
    TaskKind::TextQuiz => TaskVariant::TextQuiz {
      question: req_str(doc, kind, "question")?,
      options: string_list(req_array(doc, kind, "options")?),
      answer: req_str(doc, kind, "answer")?,
    },
    TaskKind::FillInGaps => TaskVariant::FillInGaps {
      text: req_str(doc, kind, "text")?,
      gaps: req_array(doc, kind, "gaps")?.iter().filter_map(decode_gap).collect(),
    },
    TaskKind::Matching => {
      let allow_legacy = schema_version(doc) < SCHEMA_VERSION;
      let pairs = req_array(doc, kind, "pairs")?
        .iter()
        .filter_map(|v| decode_pair(v, allow_legacy))
        .collect();
      TaskVariant::Matching { question: req_str(doc, kind, "question")?, pairs }
    }
    TaskKind::TrueOrFalse => TaskVariant::TrueOrFalse {
      statement: req_str(doc, kind, "statement")?,
      answer: decode_bool_answer(doc, kind)?,
    },
    TaskKind::OpenAnswer => TaskVariant::OpenAnswer {
      question: req_str(doc, kind, "question")?,
      description: opt_str(doc, "description").unwrap_or_default(),
      answer: req_str(doc, kind, "answer")?,
    },
  };

  Ok(TaskRecord {
    id: opt_str(doc, "id"),
    order: opt_order(doc, kind)?,
    task,
  })
}

/// Mirror of decode: `type`, the variant fields in canonical schema, metadata.
pub fn encode_record(rec: &TaskRecord) -> Document {
  let mut doc = Document::new();
  doc.insert("type".into(), Value::from(rec.task.kind().as_str()));
  match &rec.task {
    TaskVariant::TextQuiz { question, options, answer } => {
      doc.insert("question".into(), Value::from(question.as_str()));
      doc.insert("options".into(), Value::from(options.clone()));
      doc.insert("answer".into(), Value::from(answer.as_str()));
    }
    TaskVariant::FillInGaps { text, gaps } => {
      doc.insert("text".into(), Value::from(text.as_str()));
      let gaps: Vec<Value> = gaps
        .iter()
        .map(|g| {
          let mut m = Map::new();
          m.insert("answer".into(), Value::from(g.answer.as_str()));
          m.insert("options".into(), Value::from(g.options.clone()));
          Value::Object(m)
        })
        .collect();
      doc.insert("gaps".into(), Value::Array(gaps));
    }
    TaskVariant::Matching { question, pairs } => {
      doc.insert("question".into(), Value::from(question.as_str()));
      let pairs: Vec<Value> = pairs
        .iter()
        .map(|p| {
          let mut m = Map::new();
          m.insert("key".into(), Value::from(p.key.as_str()));
          m.insert("value".into(), Value::from(p.value.as_str()));
          Value::Object(m)
        })
        .collect();
      doc.insert("pairs".into(), Value::Array(pairs));
    }
    TaskVariant::TrueOrFalse { statement, answer } => {
      doc.insert("statement".into(), Value::from(statement.as_str()));
      doc.insert("answer".into(), Value::from(answer.as_str()));
    }
    TaskVariant::OpenAnswer { question, description, answer } => {
      doc.insert("question".into(), Value::from(question.as_str()));
      doc.insert("description".into(), Value::from(description.as_str()));
      doc.insert("answer".into(), Value::from(answer.as_str()));
    }
  }
  if let Some(order) = rec.order {
    doc.insert("order".into(), Value::from(order));
  }
  if let Some(id) = &rec.id {
    doc.insert("id".into(), Value::from(id.as_str()));
  }
  doc.insert("schemaVersion".into(), Value::from(SCHEMA_VERSION));
  doc
}

/// Convert a `{term, definition}` pair into the canonical `{key, value}` pair.
pub fn migrate_legacy_pair(m: &Map<String, Value>) -> Option<MatchingPair> {
  let term = m.get("term")?.as_str()?;
  let definition = m.get("definition")?.as_str()?;
  debug!(target: "task_codec", %term, "Migrated legacy term/definition pair");
  Some(MatchingPair::new(term, definition))
}

// -------- field helpers --------

fn schema_version(doc: &Document) -> i64 {
  // Unversioned documents predate the canonical pair schema.
  doc.get("schemaVersion").and_then(Value::as_i64).unwrap_or(1)
}

fn req_str(doc: &Document, kind: TaskKind, field: &'static str) -> Result<String, CodecError> {
  match doc.get(field) {
    None | Some(Value::Null) => Err(CodecError::MissingField { kind, field }),
    Some(Value::String(s)) => Ok(s.clone()),
    Some(_) => Err(CodecError::WrongType { kind, field, expected: "a string" }),
  }
}

fn opt_str(doc: &Document, field: &str) -> Option<String> {
  doc.get(field).and_then(Value::as_str).map(str::to_string)
}

fn req_array<'a>(doc: &'a Document, kind: TaskKind, field: &'static str) -> Result<&'a Vec<Value>, CodecError> {
  match doc.get(field) {
    None | Some(Value::Null) => Err(CodecError::MissingField { kind, field }),
    Some(Value::Array(items)) => Ok(items),
    Some(_) => Err(CodecError::WrongType { kind, field, expected: "a list" }),
  }
}

/// Stores may hand back whole numbers as floats (`1.0`); anything else is malformed.
fn opt_order(doc: &Document, kind: TaskKind) -> Result<Option<i64>, CodecError> {
  let wrong = CodecError::WrongType { kind, field: "order", expected: "a whole number" };
  match doc.get("order") {
    None | Some(Value::Null) => Ok(None),
    Some(Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
      (Some(i), _) => Ok(Some(i)),
      (None, Some(f)) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => Ok(Some(f as i64)),
      _ => Err(wrong),
    },
    Some(_) => Err(wrong),
  }
}

fn string_list(items: &[Value]) -> Vec<String> {
  items.iter().filter_map(Value::as_str).map(str::to_string).collect()
}

fn decode_gap(v: &Value) -> Option<Gap> {
  let m = v.as_object()?;
  let answer = m.get("answer")?.as_str()?;
  let options = m
    .get("options")
    .and_then(Value::as_array)
    .map(|items| string_list(items))
    .unwrap_or_default();
  Some(Gap::new(answer, options))
}

fn decode_pair(v: &Value, allow_legacy: bool) -> Option<MatchingPair> {
  let m = v.as_object()?;
  if let (Some(key), Some(value)) = (m.get("key").and_then(Value::as_str), m.get("value").and_then(Value::as_str)) {
    return Some(MatchingPair::new(key, value));
  }
  if allow_legacy {
    migrate_legacy_pair(m)
  } else {
    None
  }
}

fn decode_bool_answer(doc: &Document, kind: TaskKind) -> Result<String, CodecError> {
  let expected = "\"True\" or \"False\"";
  match doc.get("answer") {
    None | Some(Value::Null) => Err(CodecError::MissingField { kind, field: "answer" }),
    Some(Value::Bool(b)) => Ok(if *b { TRUE_ANSWER } else { FALSE_ANSWER }.to_string()),
    Some(Value::String(s)) if s.eq_ignore_ascii_case(TRUE_ANSWER) => Ok(TRUE_ANSWER.to_string()),
    Some(Value::String(s)) if s.eq_ignore_ascii_case(FALSE_ANSWER) => Ok(FALSE_ANSWER.to_string()),
    Some(_) => Err(CodecError::WrongType { kind, field: "answer", expected }),
  }
}
