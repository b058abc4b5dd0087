//! End-to-end walks over the filling flow: traversal across a
//! conditionally-filtered question list, and assembly of the final
//! payload from a possibly-stale answer cache.

use chrono::{Duration, Utc};
use surveygate_api::flow::{
    self, Advance, FinalizeContext, FlowError, FormTraversal,
};
use surveygate_api::models::answer::AnswerContent;
use surveygate_api::models::{Condition, Question, QuestionKind, ScalarValue, ShowWhen};

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

fn single(value: &str) -> AnswerContent {
    AnswerContent::Single {
        value: value.to_string(),
    }
}

fn text(value: &str) -> AnswerContent {
    AnswerContent::Text {
        text: value.to_string(),
    }
}

fn finalize_ctx(player: &'static str) -> FinalizeContext<'static> {
    let now = Utc::now();
    FinalizeContext {
        player_name: player,
        started_at: now - Duration::seconds(60),
        finalized_at: now,
        turnstile_token: None,
        turnstile_enabled: false,
    }
}

/// Survey with 3 questions where Q2 depends on Q1 == "A": answering
/// Q1 = "B" skips Q2, walks straight to Q3, and the final payload holds
/// answers for Q1 and Q3 only.
#[test]
fn branch_not_taken_is_skipped_and_never_submitted() {
    let mut form = FormTraversal::new(vec![
        question("q1", QuestionKind::Single, true, None),
        question("q2", QuestionKind::Text, true, Some(shown_when("q1", "A"))),
        question("q3", QuestionKind::Text, true, None),
    ])
    .unwrap();

    form.set_answer("q1", single("B")).unwrap();
    assert_eq!(form.next().unwrap(), Advance::Moved);
    assert_eq!(form.current().unwrap().id, "q3");

    form.set_answer("q3", text("third answer")).unwrap();
    assert_eq!(form.next().unwrap(), Advance::ReadyToFinalize);

    let assembled = form.begin_finalize(finalize_ctx("steve")).unwrap();
    let ids: Vec<&str> = assembled
        .request
        .answers
        .iter()
        .map(|a| a.question_id.as_str())
        .collect();
    assert_eq!(ids, vec!["q1", "q3"]);
}

/// Boolean gate: flipping the controlling answer hides the dependent
/// question, and its previously-entered answer is excluded from the
/// payload even though it was never explicitly cleared.
#[test]
fn flipped_boolean_excludes_cached_dependent_answer() {
    let mut form = FormTraversal::new(vec![
        question("q1", QuestionKind::Boolean, true, None),
        question(
            "q2",
            QuestionKind::Text,
            true,
            Some(shown_when("q1", "true")),
        ),
    ])
    .unwrap();

    form.set_answer("q1", AnswerContent::Boolean { value: true })
        .unwrap();
    assert_eq!(
        form.visible().iter().map(|q| q.id.as_str()).collect::<Vec<_>>(),
        vec!["q1", "q2"]
    );

    form.set_answer("q2", text("only relevant if q1 is yes"))
        .unwrap();

    form.set_answer("q1", AnswerContent::Boolean { value: false })
        .unwrap();
    assert_eq!(
        form.visible().iter().map(|q| q.id.as_str()).collect::<Vec<_>>(),
        vec!["q1"]
    );

    let assembled = form.begin_finalize(finalize_ctx("alex")).unwrap();
    assert_eq!(assembled.request.answers.len(), 1);
    assert_eq!(assembled.request.answers[0].question_id, "q1");
}

/// Whatever sequence of answer mutations happens, the assembled payload
/// only ever contains questions from the visible subsequence computed at
/// that moment.
#[test]
fn payload_matches_visible_subsequence_after_any_mutation_sequence() {
    let questions = vec![
        question("q1", QuestionKind::Single, true, None),
        question("q2", QuestionKind::Text, false, Some(shown_when("q1", "A"))),
        question("q3", QuestionKind::Boolean, true, None),
        question(
            "q4",
            QuestionKind::Text,
            false,
            Some(shown_when("q3", "true")),
        ),
    ];

    let mutations: Vec<(&str, AnswerContent)> = vec![
        ("q1", single("A")),
        ("q2", text("visible for now")),
        ("q3", AnswerContent::Boolean { value: true }),
        ("q4", text("also visible")),
        ("q1", single("B")), // hides q2
        ("q3", AnswerContent::Boolean { value: false }), // hides q4
        ("q1", single("A")), // q2 comes back
    ];

    let mut answers = flow::AnswerMap::new();
    for (id, content) in mutations {
        answers.insert(id.to_string(), content);

        let ctx = FinalizeContext {
            player_name: "probe",
            started_at: Utc::now() - Duration::seconds(60),
            finalized_at: Utc::now(),
            turnstile_token: None,
            turnstile_enabled: false,
        };
        let Ok(assembled) = flow::assemble(&questions, &answers, ctx) else {
            continue; // required answers still missing at this point
        };

        let visible: Vec<&str> = flow::visible_subsequence(&questions, &answers)
            .iter()
            .map(|q| q.id.as_str())
            .collect();
        for entry in &assembled.request.answers {
            assert!(
                visible.contains(&entry.question_id.as_str()),
                "payload contains hidden question {}",
                entry.question_id
            );
        }
    }
}

#[test]
fn finalize_failure_names_every_missing_required_question() {
    let mut form = FormTraversal::new(vec![
        question("q1", QuestionKind::Text, true, None),
        question("q2", QuestionKind::Text, true, None),
        question("q3", QuestionKind::Text, false, None),
    ])
    .unwrap();

    let err = form.begin_finalize(finalize_ctx("steve")).unwrap_err();
    assert_eq!(
        err,
        FlowError::RequiredUnanswered {
            ids: vec!["q1".to_string(), "q2".to_string()]
        }
    );

    // The failed attempt must not arm the in-flight guard.
    form.set_answer("q1", text("one")).unwrap();
    form.set_answer("q2", text("two")).unwrap();
    assert!(form.begin_finalize(finalize_ctx("steve")).is_ok());
}

#[test]
fn only_one_submit_leaves_the_form() {
    let mut form = FormTraversal::new(vec![question("q1", QuestionKind::Text, true, None)]).unwrap();
    form.set_answer("q1", text("done")).unwrap();

    assert!(form.begin_finalize(finalize_ctx("steve")).is_ok());
    assert_eq!(
        form.begin_finalize(finalize_ctx("steve")).unwrap_err(),
        FlowError::SubmitInFlight
    );
}
