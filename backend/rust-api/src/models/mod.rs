use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod answer;
pub mod submission;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Survey {
    #[serde(rename = "_id")]
    pub id: String,
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub questions: Vec<Question>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    Single,
    Multiple,
    Boolean,
    Text,
    Image,
}

impl QuestionKind {
    /// Only these kinds yield a single scalar answer and may drive a
    /// condition. Everything else is rejected at authoring time.
    pub fn is_condition_source(self) -> bool {
        matches!(self, QuestionKind::Single | QuestionKind::Boolean)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationLimits {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_images: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<QuestionOption>>,
    #[serde(default = "default_required")]
    pub is_required: bool,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub order: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationLimits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

fn default_required() -> bool {
    true
}

/// Visibility rule: show the carrying question only while the answer to
/// `depends_on` matches `show_when`.
///
/// Wire shape: `{"depends_on": <question id>, "show_when": <scalar> | [<scalar>, ...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub depends_on: String,
    pub show_when: ShowWhen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShowWhen {
    One(ScalarValue),
    AnyOf(Vec<ScalarValue>),
}

impl ShowWhen {
    /// Exact string match against the canonical form of the dependency's
    /// answer, or set membership when the rule lists several values.
    pub fn matches(&self, actual: &str) -> bool {
        match self {
            ShowWhen::One(expected) => expected.canonical() == actual,
            ShowWhen::AnyOf(values) => values.iter().any(|v| v.canonical() == actual),
        }
    }
}

/// A condition operand. Booleans are written as JSON booleans but compare
/// through their canonical string form, so `show_when: true` and
/// `show_when: "true"` are equivalent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Text(String),
}

impl ScalarValue {
    pub fn canonical(&self) -> Cow<'_, str> {
        match self {
            ScalarValue::Bool(true) => Cow::Borrowed("true"),
            ScalarValue::Bool(false) => Cow::Borrowed("false"),
            ScalarValue::Text(s) => Cow::Borrowed(s.as_str()),
        }
    }
}

/// Public survey payload served to the filling client. Conditions are
/// included: the client-side evaluator needs them to compute visibility.
#[derive(Debug, Serialize)]
pub struct PublicSurveyResponse {
    pub code: String,
    pub title: String,
    pub description: Option<String>,
    pub questions: Vec<Question>,
}

#[derive(Debug, Serialize)]
pub struct SecurityConfigResponse {
    pub turnstile_enabled: bool,
}
