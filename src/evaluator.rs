//! Answer evaluation: one pure function per task variant.
//!
//! Evaluation is synchronous and never mutates the task. In-progress state
//! (the selected matching key, pairs matched so far) lives in the session.

use serde::Deserialize;
use tracing::debug;

use crate::config::FeedbackCopy;
use crate::domain::{EvaluationResult, MatchingPair, TaskVariant};
use crate::util::fill_template;

/// What the consumer submits; the expected shape depends on the task variant.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerPayload {
  /// Selected option text (text quiz) or "True"/"False".
  Choice(String),
  /// Free text (open answer).
  Text(String),
  /// One entry per gap, positional.
  Gaps(Vec<String>),
  /// Proposed (key, value) matches, any order.
  Pairs(Vec<MatchingPair>),
}

impl AnswerPayload {
  fn is_blank(&self) -> bool {
    match self {
      AnswerPayload::Choice(s) | AnswerPayload::Text(s) => s.trim().is_empty(),
      AnswerPayload::Gaps(g) => g.iter().all(|s| s.trim().is_empty()),
      AnswerPayload::Pairs(p) => p.is_empty(),
    }
  }
}

pub fn evaluate(task: &TaskVariant, answer: Option<&AnswerPayload>, copy: &FeedbackCopy) -> EvaluationResult {
  if let Err(e) = task.validate() {
    debug!(target: "evaluator", kind = %task.kind(), error = %e, "Task data invalid for evaluation");
    return incorrect(fill_template(&copy.invalid_task, &[("reason", &e.to_string())]));
  }

  let answer = match answer {
    Some(a) if !a.is_blank() => a,
    _ => {
      let canonical = task.canonical_answer();
      return incorrect(fill_template(&copy.missing_answer, &[("answer", &canonical)]));
    }
  };

  match (task, answer) {
    (TaskVariant::TextQuiz { answer: expected, .. }, AnswerPayload::Choice(selected))
    | (TaskVariant::TrueOrFalse { answer: expected, .. }, AnswerPayload::Choice(selected)) => {
      exact(selected == expected, expected, copy)
    }
    (TaskVariant::OpenAnswer { answer: expected, .. }, AnswerPayload::Text(text) | AnswerPayload::Choice(text)) => {
      exact(text.trim() == expected.trim(), expected, copy)
    }
    (TaskVariant::FillInGaps { gaps, .. }, AnswerPayload::Gaps(submitted)) => {
      let marks: Vec<bool> = gaps
        .iter()
        .enumerate()
        .map(|(i, gap)| submitted.get(i).is_some_and(|s| *s == gap.answer))
        .collect();
      let wrong = marks.iter().filter(|ok| !**ok).count();
      let mut result = if wrong == 0 {
        correct(copy)
      } else {
        incorrect(fill_template(
          &copy.gaps_incorrect,
          &[("wrong", &wrong.to_string()), ("total", &gaps.len().to_string())],
        ))
      };
      result.gap_marks = marks;
      result
    }
    (TaskVariant::Matching { pairs, .. }, AnswerPayload::Pairs(submitted)) => {
      if same_pairs(pairs, submitted) {
        correct(copy)
      } else {
        let wrong = unmatched_count(pairs, submitted);
        incorrect(fill_template(
          &copy.matching_incorrect,
          &[("wrong", &wrong.to_string()), ("total", &pairs.len().to_string())],
        ))
      }
    }
    _ => incorrect(fill_template(&copy.wrong_shape, &[("kind", task.kind().as_str())])),
  }
}

/// Multiset equality of two pair lists.
pub fn same_pairs(canonical: &[MatchingPair], submitted: &[MatchingPair]) -> bool {
  if canonical.len() != submitted.len() {
    return false;
  }
  let mut a = canonical.to_vec();
  let mut b = submitted.to_vec();
  a.sort();
  b.sort();
  a == b
}

/// Canonical pairs not covered by the submission (multiset difference).
fn unmatched_count(canonical: &[MatchingPair], submitted: &[MatchingPair]) -> usize {
  let mut remaining = submitted.to_vec();
  canonical
    .iter()
    .filter(|p| match remaining.iter().position(|s| s == *p) {
      Some(i) => {
        remaining.swap_remove(i);
        false
      }
      None => true,
    })
    .count()
}

fn exact(ok: bool, expected: &str, copy: &FeedbackCopy) -> EvaluationResult {
  if ok {
    correct(copy)
  } else {
    incorrect(fill_template(&copy.incorrect, &[("answer", expected)]))
  }
}

fn correct(copy: &FeedbackCopy) -> EvaluationResult {
  EvaluationResult { is_correct: true, feedback_message: Some(copy.correct.clone()), gap_marks: vec![] }
}

fn incorrect(message: String) -> EvaluationResult {
  EvaluationResult { is_correct: false, feedback_message: Some(message), gap_marks: vec![] }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Gap;

  fn copy() -> FeedbackCopy {
    FeedbackCopy::default()
  }

  fn france() -> TaskVariant {
    TaskVariant::TextQuiz {
      question: "What is the capital of France?".into(),
      options: vec!["London".into(), "Marseille".into(), "Paris".into(), "Zurich".into()],
      answer: "Paris".into(),
    }
  }

  fn sky() -> TaskVariant {
    TaskVariant::FillInGaps {
      text: "The sky is __ and grass is __.".into(),
      gaps: vec![Gap::new("blue", ["blue", "red"]), Gap::new("green", ["green", "red"])],
    }
  }

  fn formulas() -> TaskVariant {
    TaskVariant::Matching {
      question: "Match the formulas".into(),
      pairs: vec![MatchingPair::new("H2O", "Water"), MatchingPair::new("CO2", "Carbon Dioxide")],
    }
  }

  fn choice(s: &str) -> AnswerPayload {
    AnswerPayload::Choice(s.into())
  }

  #[test]
  fn text_quiz_is_exact_and_case_sensitive() {
    let task = france();
    assert!(evaluate(&task, Some(&choice("Paris")), &copy()).is_correct);
    let wrong = evaluate(&task, Some(&choice("Zurich")), &copy());
    assert!(!wrong.is_correct);
    assert!(wrong.feedback_message.unwrap().contains("Paris"));
    assert!(!evaluate(&task, Some(&choice("paris")), &copy()).is_correct);
  }

  #[test]
  fn true_or_false_matches_exact_string() {
    let task = TaskVariant::TrueOrFalse { statement: "The earth is flat.".into(), answer: "False".into() };
    assert!(evaluate(&task, Some(&choice("False")), &copy()).is_correct);
    assert!(!evaluate(&task, Some(&choice("True")), &copy()).is_correct);
  }

  #[test]
  fn open_answer_trims_input() {
    let task = TaskVariant::OpenAnswer { question: "q".into(), description: String::new(), answer: "Neon".into() };
    assert!(evaluate(&task, Some(&AnswerPayload::Text("  Neon \n".into())), &copy()).is_correct);
    assert!(!evaluate(&task, Some(&AnswerPayload::Text("neon".into())), &copy()).is_correct);
  }

  #[test]
  fn fill_in_gaps_is_positional() {
    let task = sky();
    let ok = evaluate(&task, Some(&AnswerPayload::Gaps(vec!["blue".into(), "green".into()])), &copy());
    assert!(ok.is_correct);
    assert_eq!(ok.gap_marks, vec![true, true]);

    let bad = evaluate(&task, Some(&AnswerPayload::Gaps(vec!["blue".into(), "red".into()])), &copy());
    assert!(!bad.is_correct);
    assert_eq!(bad.gap_marks, vec![true, false]);

    let swapped = evaluate(&task, Some(&AnswerPayload::Gaps(vec!["green".into(), "blue".into()])), &copy());
    assert!(!swapped.is_correct);

    let short = evaluate(&task, Some(&AnswerPayload::Gaps(vec!["blue".into()])), &copy());
    assert_eq!(short.gap_marks, vec![true, false]);
  }

  #[test]
  fn matching_ignores_order() {
    let task = formulas();
    let forward = vec![MatchingPair::new("H2O", "Water"), MatchingPair::new("CO2", "Carbon Dioxide")];
    let reversed: Vec<_> = forward.iter().rev().cloned().collect();
    assert!(evaluate(&task, Some(&AnswerPayload::Pairs(forward.clone())), &copy()).is_correct);
    assert!(evaluate(&task, Some(&AnswerPayload::Pairs(reversed)), &copy()).is_correct);

    let one = vec![forward[0].clone()];
    assert!(!evaluate(&task, Some(&AnswerPayload::Pairs(one)), &copy()).is_correct);

    let swapped_values = vec![MatchingPair::new("H2O", "Carbon Dioxide"), MatchingPair::new("CO2", "Water")];
    let res = evaluate(&task, Some(&AnswerPayload::Pairs(swapped_values)), &copy());
    assert!(!res.is_correct);
    assert!(res.feedback_message.unwrap().starts_with("2 of 2"));
  }

  #[test]
  fn matching_counts_repeated_pairs() {
    let task = TaskVariant::Matching {
      question: "Classify".into(),
      pairs: vec![MatchingPair::new("Iron", "Metal"), MatchingPair::new("Iron", "Metal")],
    };
    let twice = vec![MatchingPair::new("Iron", "Metal"), MatchingPair::new("Iron", "Metal")];
    assert!(evaluate(&task, Some(&AnswerPayload::Pairs(twice)), &copy()).is_correct);

    let once = vec![MatchingPair::new("Iron", "Metal")];
    let res = evaluate(&task, Some(&AnswerPayload::Pairs(once)), &copy());
    assert!(!res.is_correct);
    assert!(res.feedback_message.unwrap().starts_with("1 of 2"));

    let shared = TaskVariant::Matching {
      question: "Classify".into(),
      pairs: vec![MatchingPair::new("Iron", "Metal"), MatchingPair::new("Copper", "Metal")],
    };
    let answer = vec![MatchingPair::new("Copper", "Metal"), MatchingPair::new("Iron", "Metal")];
    assert!(evaluate(&shared, Some(&AnswerPayload::Pairs(answer)), &copy()).is_correct);
  }

  #[test]
  fn missing_answer_reports_canonical_answer() {
    let res = evaluate(&france(), None, &copy());
    assert!(!res.is_correct);
    assert!(res.feedback_message.unwrap().contains("Paris"));

    let blank = evaluate(&france(), Some(&choice("   ")), &copy());
    assert!(!blank.is_correct);
  }

  #[test]
  fn invalid_tasks_and_wrong_shapes_are_incorrect_not_panics() {
    let empty = TaskVariant::TextQuiz { question: "q".into(), options: vec![], answer: "a".into() };
    assert!(!evaluate(&empty, Some(&choice("a")), &copy()).is_correct);

    let mismatch = TaskVariant::FillInGaps { text: "no markers".into(), gaps: vec![Gap::new("a", ["a"])] };
    let res = evaluate(&mismatch, Some(&AnswerPayload::Gaps(vec!["a".into()])), &copy());
    assert!(!res.is_correct);
    assert!(res.feedback_message.unwrap().contains("gap markers"));

    assert!(!evaluate(&france(), Some(&AnswerPayload::Gaps(vec!["Paris".into()])), &copy()).is_correct);
  }

  #[test]
  fn evaluation_leaves_task_untouched() {
    let task = formulas();
    let before = task.clone();
    let _ = evaluate(&task, Some(&AnswerPayload::Pairs(vec![])), &copy());
    assert_eq!(task, before);
  }
}
