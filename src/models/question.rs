// src/models/question.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// Every question in the bank carries exactly this many options.
pub const OPTION_COUNT: usize = 4;

/// A single multiple-choice item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    /// The prompt shown to the student.
    pub text: String,

    /// Answer choices. Position matters, answers refer to them by index.
    pub options: [String; OPTION_COUNT],

    /// Zero-based index into `options`.
    pub correct_option: usize,

    /// Rationale shown once the test is scored.
    pub explanation: Option<String>,

    /// Untagged questions never take part in topic selection.
    pub topic: Option<String>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Question {
    pub fn is_correct(&self, selected: Option<usize>) -> bool {
        selected == Some(self.correct_option)
    }
}

/// DTO for sending a question to a student mid-session (no answer key).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub text: String,
    pub options: [String; OPTION_COUNT],
    pub topic: Option<String>,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            text: q.text.clone(),
            options: q.options.clone(),
            topic: q.topic.clone(),
        }
    }
}

/// Fully validated input for inserting a question.
#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub text: String,
    pub options: [String; OPTION_COUNT],
    pub correct_option: usize,
    pub explanation: Option<String>,
    pub topic: Option<String>,
}

/// Partial update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuestionPatch {
    pub text: Option<String>,
    pub options: Option<[String; OPTION_COUNT]>,
    pub correct_option: Option<usize>,
    pub explanation: Option<String>,
    pub topic: Option<String>,
}

impl QuestionPatch {
    pub fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.options.is_none()
            && self.correct_option.is_none()
            && self.explanation.is_none()
            && self.topic.is_none()
    }
}

/// DTO for creating a new question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 1000))]
    pub text: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    #[validate(range(max = 3))]
    pub correct_option: usize,
    #[validate(length(max = 2000))]
    pub explanation: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub topic: Option<String>,
}

impl CreateQuestionRequest {
    /// Converts a validated request into insert input, sanitizing the text fields.
    pub fn into_new_question(self) -> Result<NewQuestion, validator::ValidationErrors> {
        self.validate()?;
        let options = fixed_options(self.options)
            .map_err(|_| single_error("options", "options_must_have_four_entries"))?;

        Ok(NewQuestion {
            text: crate::utils::html::clean_html(&self.text),
            options: options.map(|o| crate::utils::html::clean_html(&o)),
            correct_option: self.correct_option,
            explanation: self
                .explanation
                .map(|e| crate::utils::html::clean_html(&e)),
            topic: self.topic.map(|t| t.trim().to_string()),
        })
    }
}

/// DTO for updating a question. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuestionRequest {
    #[validate(length(min = 1, max = 1000))]
    pub text: Option<String>,
    #[validate(custom(function = validate_options))]
    pub options: Option<Vec<String>>,
    #[validate(range(max = 3))]
    pub correct_option: Option<usize>,
    #[validate(length(max = 2000))]
    pub explanation: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub topic: Option<String>,
}

impl UpdateQuestionRequest {
    pub fn into_patch(self) -> Result<QuestionPatch, validator::ValidationErrors> {
        self.validate()?;
        let options = self
            .options
            .map(fixed_options)
            .transpose()
            .map_err(|_| single_error("options", "options_must_have_four_entries"))?;

        Ok(QuestionPatch {
            text: self.text.map(|t| crate::utils::html::clean_html(&t)),
            options: options.map(|opts| opts.map(|o| crate::utils::html::clean_html(&o))),
            correct_option: self.correct_option,
            explanation: self
                .explanation
                .map(|e| crate::utils::html::clean_html(&e)),
            topic: self.topic.map(|t| t.trim().to_string()),
        })
    }
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.len() != OPTION_COUNT {
        return Err(validator::ValidationError::new(
            "options_must_have_four_entries",
        ));
    }
    for opt in options {
        if opt.trim().is_empty() {
            return Err(validator::ValidationError::new("option_cannot_be_empty"));
        }
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}

fn single_error(field: &'static str, code: &'static str) -> validator::ValidationErrors {
    let mut errors = validator::ValidationErrors::new();
    errors.add(field, validator::ValidationError::new(code));
    errors
}

fn fixed_options(options: Vec<String>) -> Result<[String; OPTION_COUNT], Vec<String>> {
    options.try_into()
}

/// Failure to read a stored `options` value.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("options must contain exactly 4 entries, found {0}")]
    WrongCount(usize),

    #[error("options entry is not a string")]
    NonString,

    #[error("options object has a non-numeric key: {0}")]
    BadKey(String),

    #[error("unsupported options shape")]
    Unsupported,

    #[error("correct option {0} does not point at one of the options")]
    AnswerOutOfRange(i32),
}

/// Decodes a stored `options` column into the fixed four-entry form.
///
/// Older rows hold the options as a JSON array, as a string containing a JSON
/// array, or as an object keyed by position (`{"0": "..", "1": ".."}`).
pub fn decode_options(value: &Value) -> Result<[String; OPTION_COUNT], OptionsError> {
    let entries: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_owned).ok_or(OptionsError::NonString))
            .collect::<Result<_, _>>()?,
        Value::String(raw) => {
            let nested: Value =
                serde_json::from_str(raw).map_err(|_| OptionsError::Unsupported)?;
            if matches!(nested, Value::String(_)) {
                return Err(OptionsError::Unsupported);
            }
            return decode_options(&nested);
        }
        Value::Object(map) => {
            let mut keyed = map
                .iter()
                .map(|(k, v)| {
                    let idx = k
                        .parse::<usize>()
                        .map_err(|_| OptionsError::BadKey(k.clone()))?;
                    let text = v.as_str().ok_or(OptionsError::NonString)?;
                    Ok((idx, text.to_owned()))
                })
                .collect::<Result<Vec<_>, OptionsError>>()?;
            keyed.sort_by_key(|(idx, _)| *idx);
            keyed.into_iter().map(|(_, text)| text).collect()
        }
        _ => return Err(OptionsError::Unsupported),
    };

    let found = entries.len();
    entries.try_into().map_err(|_| OptionsError::WrongCount(found))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn abcd() -> [String; 4] {
        ["A", "B", "C", "D"].map(String::from)
    }

    #[test]
    fn test_decode_options_array() {
        assert_eq!(decode_options(&json!(["A", "B", "C", "D"])), Ok(abcd()));
    }

    #[test]
    fn test_decode_options_json_string() {
        let raw = json!("[\"A\",\"B\",\"C\",\"D\"]");
        assert_eq!(decode_options(&raw), Ok(abcd()));
    }

    #[test]
    fn test_decode_options_numeric_keys_are_ordered() {
        let raw = json!({"2": "C", "0": "A", "3": "D", "1": "B"});
        assert_eq!(decode_options(&raw), Ok(abcd()));
    }

    #[test]
    fn test_decode_options_rejects_wrong_count() {
        assert_eq!(
            decode_options(&json!(["A", "B", "C"])),
            Err(OptionsError::WrongCount(3))
        );
    }

    #[test]
    fn test_decode_options_rejects_other_shapes() {
        assert_eq!(decode_options(&json!(42)), Err(OptionsError::Unsupported));
        assert_eq!(
            decode_options(&json!(["A", 1, "C", "D"])),
            Err(OptionsError::NonString)
        );
        assert_eq!(
            decode_options(&json!({"first": "A"})),
            Err(OptionsError::BadKey("first".to_string()))
        );
    }

    #[test]
    fn test_create_request_requires_four_options() {
        let req = CreateQuestionRequest {
            text: "2 + 2?".to_string(),
            options: vec!["3".into(), "4".into()],
            correct_option: 1,
            explanation: None,
            topic: Some("Mathematics".into()),
        };
        assert!(req.into_new_question().is_err());
    }

    #[test]
    fn test_create_request_rejects_out_of_range_answer() {
        let req = CreateQuestionRequest {
            text: "2 + 2?".to_string(),
            options: vec!["3".into(), "4".into(), "5".into(), "6".into()],
            correct_option: 4,
            explanation: None,
            topic: None,
        };
        assert!(req.into_new_question().is_err());
    }

    #[test]
    fn test_create_request_strips_scripts() {
        let req = CreateQuestionRequest {
            text: "Pick one<script>alert(1)</script>".to_string(),
            options: vec!["3".into(), "4".into(), "5".into(), "6".into()],
            correct_option: 1,
            explanation: Some("<b>four</b>".into()),
            topic: Some("  Mathematics ".into()),
        };
        let q = req.into_new_question().unwrap();
        assert_eq!(q.text, "Pick one");
        assert_eq!(q.explanation.as_deref(), Some("<b>four</b>"));
        assert_eq!(q.topic.as_deref(), Some("Mathematics"));
    }
}
