use serde::{Deserialize, Serialize};
use validator::Validate;

use super::QuestionKind;

/// Answer payload, one variant per question kind. The wire shapes are the
/// persisted ones: `{"value": "A"}`, `{"value": true}`, `{"values": [..]}`,
/// `{"text": ".."}`, `{"images": [..]}`. Exactly one variant matches a
/// given body, so no runtime shape-sniffing happens past deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerContent {
    Boolean { value: bool },
    Single { value: String },
    Multiple { values: Vec<String> },
    Text { text: String },
    Image { images: Vec<String> },
}

impl AnswerContent {
    pub fn matches_kind(&self, kind: QuestionKind) -> bool {
        matches!(
            (self, kind),
            (AnswerContent::Boolean { .. }, QuestionKind::Boolean)
                | (AnswerContent::Single { .. }, QuestionKind::Single)
                | (AnswerContent::Multiple { .. }, QuestionKind::Multiple)
                | (AnswerContent::Text { .. }, QuestionKind::Text)
                | (AnswerContent::Image { .. }, QuestionKind::Image)
        )
    }

    /// An empty answer counts as unanswered for required checks and is
    /// dropped at assembly. A boolean is never empty: `false` is an answer.
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerContent::Boolean { .. } => false,
            AnswerContent::Single { value } => value.is_empty(),
            AnswerContent::Multiple { values } => values.is_empty(),
            AnswerContent::Text { text } => text.trim().is_empty(),
            AnswerContent::Image { images } => images.is_empty(),
        }
    }

    /// Scalar extraction for condition evaluation, defined only for the two
    /// eligible kinds. Booleans coerce to their canonical string form.
    pub fn condition_scalar(&self) -> Option<&str> {
        match self {
            AnswerContent::Boolean { value: true } => Some("true"),
            AnswerContent::Boolean { value: false } => Some("false"),
            AnswerContent::Single { value } => Some(value.as_str()),
            AnswerContent::Multiple { .. }
            | AnswerContent::Text { .. }
            | AnswerContent::Image { .. } => None,
        }
    }
}

/// One answer entry as submitted and as embedded in a stored submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    pub question_id: String,
    pub content: AnswerContent,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitSurveyRequest {
    #[validate(length(min = 1, max = 64))]
    pub player_name: String,
    pub answers: Vec<SubmittedAnswer>,
    /// Bot-verification token, required when turnstile is enabled.
    pub turnstile_token: Option<String>,
    /// Client-reported fill start, epoch seconds.
    pub started_at: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct SubmitSurveyResponse {
    pub id: String,
    pub status: super::submission::SubmissionStatus,
}
