//! Journal question sets: the multiple-choice prompts shown on the
//! journaling screen for a given user and date.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel `user_uid` of the row holding the fallback template.
pub const DEFAULT_TEMPLATE_USER: &str = "default_template";

/// A single prompt with its answer options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
  pub id:       u32,
  pub question: String,
  pub options:  Vec<String>,
}

impl Question {
  pub fn new(id: u32, question: &str, options: &[&str]) -> Self {
    Self {
      id,
      question: question.to_owned(),
      options: options.iter().map(|o| (*o).to_owned()).collect(),
    }
  }
}

/// The ordered questions for one `(user_uid, entry_date)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalQuestionSet {
  pub id:         i64,
  pub user_uid:   String,
  pub entry_date: NaiveDate,
  pub questions:  Vec<Question>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Built-in template used when no `default_template` row has been stored.
pub fn builtin_default_questions() -> Vec<Question> {
  vec![
    Question::new(
      1,
      "How productive was your day today?",
      &["Very Productive", "Moderately Productive", "Not Productive"],
    ),
    Question::new(
      2,
      "How would you rate your energy levels?",
      &["High Energy", "Moderate Energy", "Low Energy"],
    ),
    Question::new(
      3,
      "Did you make progress on your key goals?",
      &["Significant Progress", "Some Progress", "No Progress"],
    ),
    Question::new(
      4,
      "How was your focus and concentration?",
      &["Excellent Focus", "Fair Focus", "Poor Focus"],
    ),
    Question::new(
      5,
      "Did you face any major challenges?",
      &["No Challenges", "Minor Challenges", "Major Challenges"],
    ),
    Question::new(
      6,
      "How satisfied are you with today's outcomes?",
      &["Very Satisfied", "Somewhat Satisfied", "Not Satisfied"],
    ),
    Question::new(
      7,
      "Did you learn something new today?",
      &["Learned a Lot", "Learned Something", "Learned Nothing"],
    ),
    Question::new(8, "How well did you manage your time?", &["Excellent", "Good", "Poor"]),
    Question::new(
      9,
      "Did you collaborate effectively with others?",
      &["Very Effective", "Somewhat Effective", "Not Effective"],
    ),
    Question::new(
      10,
      "How do you feel about tomorrow?",
      &["Excited & Ready", "Neutral", "Anxious or Uncertain"],
    ),
  ]
}
