// src/models/test_result.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored in place of an option index when a question was never answered.
pub const UNANSWERED: i32 = -1;

/// One entry of `TestResult::answers`, in session order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: i64,
    /// Chosen option index, or `UNANSWERED`.
    pub selected_option: i32,
    pub is_correct: bool,
    /// Seconds attributed to this question.
    pub time_spent: u32,
}

impl AnswerRecord {
    pub fn is_answered(&self) -> bool {
        self.selected_option != UNANSWERED
    }
}

/// A scored attempt that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResultDraft {
    pub user_id: i64,
    pub user_name: String,
    pub test_id: Option<i64>,
    pub test_date: DateTime<Utc>,
    pub score: u32,
    pub total_questions: u32,
    /// Aggregate session time in seconds, idle time included.
    pub time_spent: u32,
    pub answers: Vec<AnswerRecord>,
}

impl TestResultDraft {
    pub fn percentage(&self) -> f64 {
        if self.total_questions == 0 {
            return 0.0;
        }
        (self.score as f64 / self.total_questions as f64) * 100.0
    }

    pub fn with_id(self, id: i64) -> TestResult {
        TestResult { id, draft: self }
    }
}

/// Represents the 'test_results' table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub id: i64,
    #[serde(flatten)]
    pub draft: TestResultDraft,
}

#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    pub user_id: Option<i64>,
}
