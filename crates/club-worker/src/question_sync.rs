//! Question-sync: reshape a crew payload into the journaling screen's
//! question set.
//!
//! Runs after every successful crew upsert. A payload without a recognised
//! question list is not an error; the sync is simply skipped.

use std::collections::HashSet;

use club_core::{crew::CrewResponse, question::Question, store::ClubStore};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::{Error, Result};

/// How a crew payload is laid out, for logging at upsert time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
  /// `{"Questions": [...]}` with at least five items.
  Detailed,
  /// `{"questions": ["...", ...]}` with fewer than five plain strings.
  Simple,
  Unrecognized,
}

impl PayloadShape {
  pub fn classify(payload: &Value) -> Self {
    let array = |key: &str| payload.get(key).and_then(Value::as_array);

    if array("Questions").is_some_and(|q| q.len() >= 5) {
      return Self::Detailed;
    }
    if array("questions").is_some_and(|q| q.len() < 5 && q.first().is_some_and(Value::is_string)) {
      return Self::Simple;
    }
    Self::Unrecognized
  }
}

/// Locate a question list on the payload root, or failing that on any object
/// one level down.
pub fn extract_questions(payload: &Value) -> Option<Vec<Question>> {
  let root = payload.as_object()?;
  from_object(root).or_else(|| {
    root
      .values()
      .filter_map(Value::as_object)
      .find_map(from_object)
  })
}

fn from_object(obj: &Map<String, Value>) -> Option<Vec<Question>> {
  let questions = if let Some(items) = obj.get("Questions").and_then(Value::as_array) {
    detailed_questions(items)
  } else if let Some(items) = obj.get("questions").and_then(Value::as_array) {
    items.iter().filter_map(normalized_question).collect()
  } else {
    return None;
  };

  (!questions.is_empty()).then_some(questions)
}

/// `{"Question 3": "text", "Answers": [...]}` items. Ids are unique: the
/// number in the key wins, and an unnumbered or repeated item takes its
/// 1-based position, or the next id after it that is still free.
fn detailed_questions(items: &[Value]) -> Vec<Question> {
  let parsed: Vec<_> = items
    .iter()
    .enumerate()
    .filter_map(|(i, item)| detailed_question(item).map(|(number, q)| (i, number, q)))
    .collect();

  let mut taken = HashSet::new();
  let numbered: Vec<_> = parsed
    .into_iter()
    .map(|(i, number, q)| (i, number.filter(|n| taken.insert(*n)), q))
    .collect();

  numbered
    .into_iter()
    .map(|(i, number, q)| {
      let id = number.unwrap_or_else(|| {
        let mut id = u32::try_from(i + 1).unwrap_or(u32::MAX);
        while !taken.insert(id) {
          id = id.saturating_add(1);
        }
        id
      });
      Question { id, ..q }
    })
    .collect()
}

/// One detailed item, with the number from its key if it has one. The
/// returned question's id is a placeholder.
fn detailed_question(item: &Value) -> Option<(Option<u32>, Question)> {
  let obj = item.as_object()?;
  let (key, text) = obj
    .iter()
    .find(|(k, v)| k.starts_with("Question") && v.is_string())?;

  let number = key.trim_start_matches("Question").trim().parse().ok();
  let question = Question {
    id:       0,
    question: text.as_str()?.to_owned(),
    options:  string_list(obj.get("Answers")),
  };
  Some((number, question))
}

/// `{"id": 1, "question": "text", "options": [...]}`.
fn normalized_question(item: &Value) -> Option<Question> {
  let obj = item.as_object()?;
  let id = obj.get("id").and_then(Value::as_u64)?;
  Some(Question {
    id:       u32::try_from(id).ok()?,
    question: obj.get("question").and_then(Value::as_str)?.to_owned(),
    options:  string_list(obj.get("options")),
  })
}

fn string_list(value: Option<&Value>) -> Vec<String> {
  value
    .and_then(Value::as_array)
    .map(|items| {
      items
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_owned)
        .collect()
    })
    .unwrap_or_default()
}

/// Write the question set derived from `response` for its user and day.
///
/// The day is the persisted `created_on`, not a fresh "today". Returns whether
/// a question set was written.
pub async fn sync_questions<S: ClubStore>(store: &S, response: &CrewResponse) -> Result<bool> {
  let Some(questions) = extract_questions(&response.response_data) else {
    info!(user = %response.user_uid, "no question list in crew payload, skipping sync");
    return Ok(false);
  };

  let count = questions.len();
  store
    .upsert_question_set(response.user_uid.clone(), response.created_on, questions)
    .await
    .map_err(Error::store)?;

  debug!(user = %response.user_uid, day = %response.created_on, count, "synced journal questions");
  Ok(true)
}
