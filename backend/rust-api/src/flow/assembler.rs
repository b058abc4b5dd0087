use chrono::{DateTime, Utc};

use crate::models::answer::{SubmitSurveyRequest, SubmittedAnswer};
use crate::models::Question;

use super::visibility::{self, AnswerMap};
use super::FlowError;

/// Everything the assembler needs at the moment of finalize. Anti-abuse
/// enablement comes in explicitly (from the deployment's security config),
/// never from ambient state.
#[derive(Debug, Clone)]
pub struct FinalizeContext<'a> {
    pub player_name: &'a str,
    pub started_at: DateTime<Utc>,
    pub finalized_at: DateTime<Utc>,
    pub turnstile_token: Option<String>,
    pub turnstile_enabled: bool,
}

#[derive(Debug)]
pub struct AssembledSubmission {
    pub request: SubmitSurveyRequest,
    pub elapsed_seconds: f64,
}

/// Builds the outbound payload from the full answer map and the visible
/// subsequence computed *at this moment*. Cached answers for questions
/// outside that subsequence are dropped; a previously-filled but
/// now-hidden answer is never transmitted. Required-visible questions
/// without an answer fail assembly, naming every offender.
pub fn assemble(
    questions: &[Question],
    answers: &AnswerMap,
    ctx: FinalizeContext<'_>,
) -> Result<AssembledSubmission, FlowError> {
    let visible = visibility::visible_subsequence(questions, answers);

    let mut entries = Vec::with_capacity(visible.len());
    let mut missing = Vec::new();
    for question in visible {
        match answers.get(&question.id) {
            Some(content) if !content.is_empty() => entries.push(SubmittedAnswer {
                question_id: question.id.clone(),
                content: content.clone(),
            }),
            _ if question.is_required => missing.push(question.id.clone()),
            _ => {}
        }
    }

    if !missing.is_empty() {
        return Err(FlowError::RequiredUnanswered { ids: missing });
    }

    let elapsed_seconds =
        (ctx.finalized_at - ctx.started_at).num_milliseconds() as f64 / 1000.0;

    Ok(AssembledSubmission {
        request: SubmitSurveyRequest {
            player_name: ctx.player_name.to_string(),
            answers: entries,
            turnstile_token: if ctx.turnstile_enabled {
                ctx.turnstile_token
            } else {
                None
            },
            started_at: Some(ctx.started_at.timestamp_millis() as f64 / 1000.0),
        },
        elapsed_seconds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::answer::AnswerContent;
    use crate::models::{Condition, QuestionKind, ScalarValue, ShowWhen};
    use chrono::Duration;

    fn question(
        id: &str,
        kind: QuestionKind,
        required: bool,
        condition: Option<Condition>,
    ) -> Question {
        Question {
            id: id.to_string(),
            title: format!("Question {id}"),
            description: None,
            kind,
            options: None,
            is_required: required,
            is_pinned: false,
            order: 0,
            validation: None,
            condition,
        }
    }

    fn shown_when(depends_on: &str, value: &str) -> Condition {
        Condition {
            depends_on: depends_on.to_string(),
            show_when: ShowWhen::One(ScalarValue::Text(value.to_string())),
        }
    }

    fn ctx(started_at: DateTime<Utc>, finalized_at: DateTime<Utc>) -> FinalizeContext<'static> {
        FinalizeContext {
            player_name: "steve",
            started_at,
            finalized_at,
            turnstile_token: None,
            turnstile_enabled: false,
        }
    }

    fn conditional_form() -> Vec<Question> {
        vec![
            question("q1", QuestionKind::Single, true, None),
            question("q2", QuestionKind::Text, true, Some(shown_when("q1", "A"))),
            question("q3", QuestionKind::Text, true, None),
        ]
    }

    #[test]
    fn hidden_cached_answer_is_never_transmitted() {
        let questions = conditional_form();
        let mut answers = AnswerMap::new();
        answers.insert(
            "q1".to_string(),
            AnswerContent::Single {
                value: "B".to_string(),
            },
        );
        // Stale Q2 answer from before Q1 was changed; never cleared.
        answers.insert(
            "q2".to_string(),
            AnswerContent::Text {
                text: "stale".to_string(),
            },
        );
        answers.insert(
            "q3".to_string(),
            AnswerContent::Text {
                text: "fresh".to_string(),
            },
        );

        let now = Utc::now();
        let assembled = assemble(&questions, &answers, ctx(now - Duration::seconds(10), now))
            .expect("assembly should succeed");

        let ids: Vec<&str> = assembled
            .request
            .answers
            .iter()
            .map(|a| a.question_id.as_str())
            .collect();
        assert_eq!(ids, vec!["q1", "q3"]);
    }

    #[test]
    fn missing_required_fails_naming_every_offender() {
        let questions = vec![
            question("q1", QuestionKind::Text, true, None),
            question("q2", QuestionKind::Text, true, None),
            question("q3", QuestionKind::Text, false, None),
        ];
        let answers = AnswerMap::new();

        let now = Utc::now();
        let err = assemble(&questions, &answers, ctx(now, now)).unwrap_err();
        assert_eq!(
            err,
            FlowError::RequiredUnanswered {
                ids: vec!["q1".to_string(), "q2".to_string()]
            }
        );
    }

    #[test]
    fn empty_answers_count_as_missing() {
        let questions = vec![question("q1", QuestionKind::Text, true, None)];
        let mut answers = AnswerMap::new();
        answers.insert(
            "q1".to_string(),
            AnswerContent::Text {
                text: "  ".to_string(),
            },
        );

        let now = Utc::now();
        assert!(assemble(&questions, &answers, ctx(now, now)).is_err());
    }

    #[test]
    fn optional_unanswered_questions_are_simply_omitted() {
        let questions = vec![
            question("q1", QuestionKind::Text, true, None),
            question("q2", QuestionKind::Text, false, None),
        ];
        let mut answers = AnswerMap::new();
        answers.insert(
            "q1".to_string(),
            AnswerContent::Text {
                text: "hi".to_string(),
            },
        );

        let now = Utc::now();
        let assembled = assemble(&questions, &answers, ctx(now, now)).unwrap();
        assert_eq!(assembled.request.answers.len(), 1);
    }

    #[test]
    fn elapsed_time_is_attached() {
        let questions = vec![question("q1", QuestionKind::Text, true, None)];
        let mut answers = AnswerMap::new();
        answers.insert(
            "q1".to_string(),
            AnswerContent::Text {
                text: "hi".to_string(),
            },
        );

        let now = Utc::now();
        let assembled =
            assemble(&questions, &answers, ctx(now - Duration::seconds(90), now)).unwrap();
        assert!((assembled.elapsed_seconds - 90.0).abs() < 0.5);
        assert!(assembled.request.started_at.is_some());
    }

    #[test]
    fn token_attached_only_when_verification_enabled() {
        let questions = vec![question("q1", QuestionKind::Text, false, None)];
        let answers = AnswerMap::new();
        let now = Utc::now();

        let mut enabled = ctx(now, now);
        enabled.turnstile_enabled = true;
        enabled.turnstile_token = Some("tok-123".to_string());
        let assembled = assemble(&questions, &answers, enabled).unwrap();
        assert_eq!(assembled.request.turnstile_token.as_deref(), Some("tok-123"));

        let mut disabled = ctx(now, now);
        disabled.turnstile_token = Some("tok-123".to_string());
        let assembled = assemble(&questions, &answers, disabled).unwrap();
        assert_eq!(assembled.request.turnstile_token, None);
    }
}
