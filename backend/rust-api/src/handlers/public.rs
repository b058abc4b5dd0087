use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::{
    error::ApiError,
    middlewares::rate_limit::client_ip_from_headers,
    models::{
        answer::{SubmitSurveyRequest, SubmitSurveyResponse},
        submission::StatusQuery,
        PublicSurveyResponse, SecurityConfigResponse,
    },
    services::{
        submission_service::SubmissionService,
        survey_service::{OrderedSelector, QuestionSelector, SurveyService},
        AppState,
    },
};

pub async fn get_survey(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Serving survey: code={}", code);

    let service = SurveyService::new(state.mongo.clone());
    let survey = service.get_survey_by_code(&code).await?;

    let questions = OrderedSelector.select(&survey);

    Ok(Json(PublicSurveyResponse {
        code: survey.code,
        title: survey.title,
        description: survey.description,
        questions,
    }))
}

/// Exposes only what the filling client needs to render the verification
/// widget. The fill-time threshold is deliberately absent.
pub async fn get_security_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(SecurityConfigResponse {
        turnstile_enabled: state.config.security.turnstile_enabled,
    })
}

pub async fn submit_survey(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    headers: axum::http::HeaderMap,
    Json(req): Json<SubmitSurveyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(
        "Submission received: survey={}, answers={}",
        code,
        req.answers.len()
    );

    let survey_service = SurveyService::new(state.mongo.clone());
    let survey = survey_service.get_survey_by_code(&code).await?;
    let questions = OrderedSelector.select(&survey);

    let client_ip = client_ip_from_headers(&headers);

    let service = SubmissionService::new(state.mongo.clone(), state.redis.clone());
    let submission = service
        .create_submission(
            &survey,
            &questions,
            req,
            client_ip,
            &state.config.security,
            state.bot_verifier.as_ref(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitSurveyResponse {
            id: submission.id,
            status: submission.status,
        }),
    ))
}

pub async fn query_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let player_name = query.player_name.trim();
    if player_name.is_empty() {
        return Err(ApiError::validation(
            "player_name must not be empty",
            vec!["player_name".to_string()],
        ));
    }

    let service = SubmissionService::new(state.mongo.clone(), state.redis.clone());
    let entries = service.query_status(player_name).await?;

    Ok(Json(entries))
}
