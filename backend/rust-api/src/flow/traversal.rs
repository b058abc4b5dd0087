use crate::models::{answer::AnswerContent, Question};

use super::assembler::{self, AssembledSubmission, FinalizeContext};
use super::visibility::{self, AnswerMap, ConfigError};
use super::FlowError;

/// Outcome of a successful `next()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Moved,
    /// The end of the visible subsequence was reached with every
    /// required-visible question answered. Finalizing is now allowed; the
    /// controller itself never submits.
    ReadyToFinalize,
}

/// Walks the visible subsequence of a fixed, ordered question list.
///
/// The position always indexes the *current* visible subsequence. All
/// mutations are synchronous; the only suspension points in the filling
/// flow are the network calls around it.
pub struct FormTraversal {
    questions: Vec<Question>,
    answers: AnswerMap,
    position: usize,
    submit_in_flight: bool,
}

impl FormTraversal {
    /// Takes the fixed ordered question list for this rendering (pinned
    /// questions already included by the selector). Fails fast on a
    /// condition-graph violation instead of misbehaving mid-walk.
    pub fn new(questions: Vec<Question>) -> Result<Self, ConfigError> {
        visibility::validate_conditions(&questions)?;
        Ok(Self {
            questions,
            answers: AnswerMap::new(),
            position: 0,
            submit_in_flight: false,
        })
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn answers(&self) -> &AnswerMap {
        &self.answers
    }

    pub fn visible(&self) -> Vec<&Question> {
        visibility::visible_subsequence(&self.questions, &self.answers)
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn current(&self) -> Option<&Question> {
        self.visible().get(self.position).copied()
    }

    pub fn submit_in_flight(&self) -> bool {
        self.submit_in_flight
    }

    /// Records an answer and recomputes the visible subsequence. If the
    /// change hides the question at the current position, the position is
    /// clamped to the nearest valid index (staying put when the slot is
    /// still valid, else moving backward). The hidden question's cached
    /// answer stays in the map, inert until it becomes visible again.
    pub fn set_answer(&mut self, question_id: &str, content: AnswerContent) -> Result<(), FlowError> {
        let question = self
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| FlowError::UnknownQuestion(question_id.to_string()))?;
        if !content.matches_kind(question.kind) {
            return Err(FlowError::TypeMismatch {
                question: question_id.to_string(),
            });
        }

        let previous_current = self.current().map(|q| q.id.clone());
        self.answers.insert(question_id.to_string(), content);
        self.reclamp(previous_current.as_deref());
        Ok(())
    }

    fn reclamp(&mut self, previous_current: Option<&str>) {
        let new_position = {
            let visible = self.visible();
            if visible.is_empty() {
                0
            } else if let Some(idx) =
                previous_current.and_then(|id| visible.iter().position(|q| q.id == id))
            {
                // The question we were on is still visible; follow it.
                idx
            } else {
                self.position.min(visible.len() - 1)
            }
        };
        self.position = new_position;
    }

    /// Moves forward one step. Refused while the current question is
    /// required and unanswered; at the end of the visible subsequence it
    /// either reports readiness or names every still-missing required
    /// question.
    pub fn next(&mut self) -> Result<Advance, FlowError> {
        let (current_blocked, visible_len) = {
            let visible = self.visible();
            let blocked = visible.get(self.position).and_then(|q| {
                let unanswered = self
                    .answers
                    .get(&q.id)
                    .map_or(true, |content| content.is_empty());
                (q.is_required && unanswered).then(|| q.id.clone())
            });
            (blocked, visible.len())
        };

        if let Some(id) = current_blocked {
            return Err(FlowError::RequiredUnanswered { ids: vec![id] });
        }

        if self.position + 1 < visible_len {
            self.position += 1;
            return Ok(Advance::Moved);
        }

        let missing = self.missing_required_ids();
        if missing.is_empty() {
            Ok(Advance::ReadyToFinalize)
        } else {
            Err(FlowError::RequiredUnanswered { ids: missing })
        }
    }

    /// Always permitted while a prior step exists.
    pub fn previous(&mut self) -> bool {
        if self.position > 0 {
            self.position -= 1;
            true
        } else {
            false
        }
    }

    /// Required-visible questions that are unanswered or empty, in order.
    pub fn missing_required_ids(&self) -> Vec<String> {
        self.visible()
            .iter()
            .filter(|q| {
                q.is_required
                    && self
                        .answers
                        .get(&q.id)
                        .map_or(true, |content| content.is_empty())
            })
            .map(|q| q.id.clone())
            .collect()
    }

    pub fn is_ready_to_finalize(&self) -> bool {
        let visible_len = self.visible().len();
        let at_end = visible_len == 0 || self.position + 1 == visible_len;
        at_end && self.missing_required_ids().is_empty()
    }

    /// Assembles the outbound payload and arms the non-reentrancy guard:
    /// a second call while a submit is pending is rejected locally,
    /// without touching the network. `finalize_failed` re-arms after a
    /// failed submit; a successful submit ends the form's life.
    pub fn begin_finalize(
        &mut self,
        ctx: FinalizeContext<'_>,
    ) -> Result<AssembledSubmission, FlowError> {
        if self.submit_in_flight {
            return Err(FlowError::SubmitInFlight);
        }
        let assembled = assembler::assemble(&self.questions, &self.answers, ctx)?;
        self.submit_in_flight = true;
        Ok(assembled)
    }

    pub fn finalize_failed(&mut self) {
        self.submit_in_flight = false;
    }

    #[cfg(test)]
    pub(crate) fn context_at<'a>(
        player_name: &'a str,
        started_at: chrono::DateTime<chrono::Utc>,
        finalized_at: chrono::DateTime<chrono::Utc>,
    ) -> FinalizeContext<'a> {
        FinalizeContext {
            player_name,
            started_at,
            finalized_at,
            turnstile_token: None,
            turnstile_enabled: false,
        }
    }
}
