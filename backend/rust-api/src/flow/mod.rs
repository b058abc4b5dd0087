//! The filling-flow core: pure visibility evaluation over conditional
//! questions, the step-by-step traversal controller, and the payload
//! assembler. Nothing in here talks to the network or the database; the
//! server reuses the same evaluator when it re-checks an inbound payload.

use thiserror::Error;

pub mod assembler;
pub mod traversal;
pub mod visibility;

pub use assembler::{assemble, AssembledSubmission, FinalizeContext};
pub use traversal::{Advance, FormTraversal};
pub use visibility::{is_visible, validate_conditions, visible_subsequence, AnswerMap, ConfigError};

/// Recoverable failures while filling or finalizing a form. These surface
/// to the filling user and are fixed by completing or correcting input;
/// they never reach the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("unknown question: {0}")]
    UnknownQuestion(String),

    #[error("answer shape does not match question {question}")]
    TypeMismatch { question: String },

    /// Names every offending question, never just the first.
    #[error("required questions are unanswered: {}", ids.join(", "))]
    RequiredUnanswered { ids: Vec<String> },

    #[error("a submission is already in flight")]
    SubmitInFlight,
}
