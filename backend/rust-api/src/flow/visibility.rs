use std::collections::HashMap;

use thiserror::Error;

use crate::models::{answer::AnswerContent, Question, QuestionKind};

/// Answers gathered so far, keyed by question id. Entries are never removed
/// when a question drops out of visibility; they just stop mattering.
pub type AnswerMap = HashMap<String, AnswerContent>;

/// Condition-graph violations. Raised once, when a question set is loaded
/// or published; a survey that fails here is an authoring fault and must
/// not be served.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("question {question} depends on unknown question {depends_on}")]
    UnknownDependency { question: String, depends_on: String },

    #[error("question {question} depends on itself")]
    SelfReference { question: String },

    #[error("condition dependencies form a cycle: {}", chain.join(" -> "))]
    DependencyCycle { chain: Vec<String> },

    #[error(
        "question {question} depends on {depends_on}, which is not rendered before it"
    )]
    ForwardReference { question: String, depends_on: String },

    #[error(
        "question {depends_on} cannot drive a condition: {kind:?} answers have no scalar value"
    )]
    NonScalarSource {
        question: String,
        depends_on: String,
        kind: QuestionKind,
    },
}

/// Decides whether `question` is currently shown, given the answers so far.
/// Pure; called on every recomputation of the visible subsequence.
///
/// An unanswered dependency means NOT visible: a dependent question can
/// never appear before its dependency has a value. An answer that yields
/// no scalar (possible only for surveys that bypassed validation) also
/// hides the question rather than guessing.
pub fn is_visible(question: &Question, answers: &AnswerMap) -> bool {
    let Some(condition) = &question.condition else {
        return true;
    };
    let Some(answer) = answers.get(&condition.depends_on) else {
        return false;
    };
    let Some(scalar) = answer.condition_scalar() else {
        return false;
    };
    condition.show_when.matches(scalar)
}

/// The ordered subset of `questions` that is visible under `answers`.
/// Recomputed from scratch on every answer change; linear in the total
/// question count, which is fine at survey sizes.
pub fn visible_subsequence<'a>(
    questions: &'a [Question],
    answers: &AnswerMap,
) -> Vec<&'a Question> {
    questions
        .iter()
        .filter(|q| is_visible(q, answers))
        .collect()
}

/// Authoring-time validation of every condition in a question set, in
/// rendering order. Checks, in order: the dependency exists, is not the
/// question itself, the dependency graph is acyclic, the source question
/// has a scalar answer kind, and the dependency is rendered strictly
/// earlier.
pub fn validate_conditions(questions: &[Question]) -> Result<(), ConfigError> {
    let index: HashMap<&str, (usize, QuestionKind)> = questions
        .iter()
        .enumerate()
        .map(|(pos, q)| (q.id.as_str(), (pos, q.kind)))
        .collect();

    for q in questions {
        let Some(condition) = &q.condition else {
            continue;
        };
        if condition.depends_on == q.id {
            return Err(ConfigError::SelfReference {
                question: q.id.clone(),
            });
        }
        if !index.contains_key(condition.depends_on.as_str()) {
            return Err(ConfigError::UnknownDependency {
                question: q.id.clone(),
                depends_on: condition.depends_on.clone(),
            });
        }
    }

    detect_cycles(questions)?;

    for (pos, q) in questions.iter().enumerate() {
        let Some(condition) = &q.condition else {
            continue;
        };
        let (dep_pos, dep_kind) = index[condition.depends_on.as_str()];
        if !dep_kind.is_condition_source() {
            return Err(ConfigError::NonScalarSource {
                question: q.id.clone(),
                depends_on: condition.depends_on.clone(),
                kind: dep_kind,
            });
        }
        if dep_pos >= pos {
            return Err(ConfigError::ForwardReference {
                question: q.id.clone(),
                depends_on: condition.depends_on.clone(),
            });
        }
    }

    Ok(())
}

/// Each question has at most one outgoing dependency edge, so the graph is
/// functional: following the chain from any node either terminates or
/// revisits a node on the current path.
fn detect_cycles(questions: &[Question]) -> Result<(), ConfigError> {
    let dep_of: HashMap<&str, &str> = questions
        .iter()
        .filter_map(|q| {
            q.condition
                .as_ref()
                .map(|c| (q.id.as_str(), c.depends_on.as_str()))
        })
        .collect();

    for start in dep_of.keys() {
        let mut chain = vec![*start];
        let mut current = *start;
        while let Some(&next) = dep_of.get(current) {
            if let Some(offset) = chain.iter().position(|&id| id == next) {
                let mut cycle: Vec<String> =
                    chain[offset..].iter().map(|s| s.to_string()).collect();
                cycle.push(next.to_string());
                return Err(ConfigError::DependencyCycle { chain: cycle });
            }
            chain.push(next);
            current = next;
        }
    }

    Ok(())
}
