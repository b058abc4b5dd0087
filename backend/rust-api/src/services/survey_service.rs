use anyhow::Context;
use mongodb::bson::doc;
use mongodb::Database;

use crate::error::ApiError;
use crate::flow;
use crate::models::{Question, Survey};

/// Produces the fixed ordered question list for one rendering of a survey.
/// Pinned questions are always part of the result. Randomized subset
/// selection lives behind this trait when a deployment wants it; the
/// default is a plain ordered passthrough.
pub trait QuestionSelector: Send + Sync {
    fn select(&self, survey: &Survey) -> Vec<Question>;
}

pub struct OrderedSelector;

impl QuestionSelector for OrderedSelector {
    fn select(&self, survey: &Survey) -> Vec<Question> {
        let mut questions = survey.questions.clone();
        questions.sort_by_key(|q| q.order);
        questions
    }
}

pub struct SurveyService {
    mongo: Database,
}

impl SurveyService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    /// Fetches a survey by its public access code. Closed surveys answer
    /// with a user-facing error; a survey whose condition graph no longer
    /// validates is an operator fault and surfaces as an internal error,
    /// never as detail to the filling user.
    pub async fn get_survey_by_code(&self, code: &str) -> Result<Survey, ApiError> {
        let collection = self.mongo.collection::<Survey>("surveys");

        let survey = collection
            .find_one(doc! { "code": code })
            .await
            .context("Failed to query surveys collection")?
            .ok_or(ApiError::NotFound("survey"))?;

        if !survey.is_active {
            return Err(ApiError::SurveyClosed);
        }

        validate_survey(&survey).map_err(|e| {
            tracing::error!(
                "Survey {} has an invalid condition graph: {}",
                survey.code,
                e
            );
            ApiError::Internal(anyhow::Error::new(e))
        })?;

        Ok(survey)
    }

    /// Lookup for the review surface. No active check: submissions stay
    /// reviewable after their survey is closed.
    pub async fn get_survey_by_id(&self, survey_id: &str) -> Result<Option<Survey>, ApiError> {
        let collection = self.mongo.collection::<Survey>("surveys");
        let survey = collection
            .find_one(doc! { "_id": survey_id })
            .await
            .context("Failed to query surveys collection")?;
        Ok(survey)
    }
}

/// Authoring-time check, also the publish gate: a survey with a forward
/// reference, a non-scalar condition source or a dependency cycle must
/// never reach filling users.
pub fn validate_survey(survey: &Survey) -> Result<(), flow::ConfigError> {
    let ordered = OrderedSelector.select(survey);
    flow::validate_conditions(&ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Condition, QuestionKind, ScalarValue, ShowWhen};
    use chrono::Utc;

    fn question(id: &str, order: i32, condition: Option<Condition>) -> Question {
        Question {
            id: id.to_string(),
            title: format!("Question {id}"),
            description: None,
            kind: QuestionKind::Single,
            options: None,
            is_required: true,
            is_pinned: false,
            order,
            validation: None,
            condition,
        }
    }

    fn survey(questions: Vec<Question>) -> Survey {
        Survey {
            id: "srv-1".to_string(),
            code: "abc123".to_string(),
            title: "Whitelist application".to_string(),
            description: None,
            is_active: true,
            questions,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn selector_sorts_by_display_order() {
        let s = survey(vec![
            question("q2", 2, None),
            question("q1", 1, None),
            question("q3", 3, None),
        ]);
        let ids: Vec<String> = OrderedSelector
            .select(&s)
            .into_iter()
            .map(|q| q.id)
            .collect();
        assert_eq!(ids, vec!["q1", "q2", "q3"]);
    }

    #[test]
    fn publish_validation_uses_display_order_not_storage_order() {
        // Stored out of order: the dependency is later in the vec but
        // earlier in display order, which is what matters.
        let s = survey(vec![
            question(
                "q2",
                2,
                Some(Condition {
                    depends_on: "q1".to_string(),
                    show_when: ShowWhen::One(ScalarValue::Text("A".to_string())),
                }),
            ),
            question("q1", 1, None),
        ]);
        assert!(validate_survey(&s).is_ok());
    }

    #[test]
    fn publish_validation_rejects_forward_reference_in_display_order() {
        let s = survey(vec![
            question(
                "q1",
                1,
                Some(Condition {
                    depends_on: "q2".to_string(),
                    show_when: ShowWhen::One(ScalarValue::Text("A".to_string())),
                }),
            ),
            question("q2", 2, None),
        ]);
        assert!(validate_survey(&s).is_err());
    }
}
