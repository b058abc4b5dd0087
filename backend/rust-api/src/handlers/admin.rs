use axum::{
    extract::{Extension, Path, Query, State},
    response::IntoResponse,
    Json,
};
use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    error::ApiError,
    middlewares::auth::JwtClaims,
    models::answer::AnswerContent,
    models::submission::{
        AnswerDetail, ListSubmissionsQuery, ReviewRequest, ReviewResponse, SubmissionDetail,
    },
    models::Question,
    services::{
        submission_service::SubmissionService, survey_service::SurveyService, AppState,
    },
};

pub async fn list_submissions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListSubmissionsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let service = SubmissionService::new(state.mongo.clone(), state.redis.clone());
    let page = service.list_submissions(query).await?;
    Ok(Json(page))
}

pub async fn stats_overview(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let service = SubmissionService::new(state.mongo.clone(), state.redis.clone());
    let stats = service.stats_overview().await?;
    Ok(Json(stats))
}

/// Detail view. Reading it is the qualifying event for `first_viewed_at`;
/// the conditional write underneath makes repeated and concurrent reads
/// idempotent.
pub async fn get_submission(
    State(state): State<Arc<AppState>>,
    Path(submission_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let service = SubmissionService::new(state.mongo.clone(), state.redis.clone());
    let submission = service.get_submission_marking_viewed(&submission_id).await?;

    // Join answers with their question titles for display.
    let survey_service = SurveyService::new(state.mongo.clone());
    let questions: HashMap<String, Question> = survey_service
        .get_survey_by_id(&submission.survey_id)
        .await?
        .map(|survey| {
            survey
                .questions
                .into_iter()
                .map(|q| (q.id.clone(), q))
                .collect()
        })
        .unwrap_or_default();

    let answers = submission
        .answers
        .iter()
        .map(|a| {
            let question = questions.get(&a.question_id);
            let image_urls = match &a.content {
                AnswerContent::Image { images } => Some(
                    images
                        .iter()
                        .map(|name| state.file_storage.url_for(name))
                        .collect(),
                ),
                _ => None,
            };
            AnswerDetail {
                question_id: a.question_id.clone(),
                question_title: question.map(|q| q.title.clone()).unwrap_or_default(),
                question_type: question.map(|q| q.kind),
                content: a.content.clone(),
                image_urls,
            }
        })
        .collect();

    let timeline = submission.timeline();
    Ok(Json(SubmissionDetail {
        id: submission.id,
        survey_id: submission.survey_id,
        survey_title: submission.survey_title,
        player_name: submission.player_name,
        client_ip: submission.client_ip,
        fill_duration: submission.fill_duration,
        submitted_at: submission.submitted_at,
        status: submission.status,
        first_viewed_at: submission.first_viewed_at,
        reviewed_at: submission.reviewed_at,
        reviewed_by: submission.reviewed_by,
        review_note: submission.review_note,
        answers,
        timeline,
    }))
}

pub async fn review_submission(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(submission_id): Path<String>,
    Json(req): Json<ReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(
        "Review decision: submission={}, outcome={:?}, admin={}",
        submission_id,
        req.status,
        claims.sub
    );

    let service = SubmissionService::new(state.mongo.clone(), state.redis.clone());
    let submission = service
        .decide(&submission_id, req.status, req.review_note, &claims.sub)
        .await?;

    Ok(Json(ReviewResponse {
        id: submission.id,
        status: submission.status,
        reviewed_at: submission.reviewed_at,
    }))
}
