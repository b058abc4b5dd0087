use std::collections::HashMap;

use anyhow::Context;
use chrono::Utc;
use lazy_static::lazy_static;
use mongodb::bson::{doc, to_bson, Bson, Document};
use mongodb::options::ReturnDocument;
use mongodb::Database;
use redis::aio::ConnectionManager;
use regex::Regex;
use uuid::Uuid;
use validator::Validate;

use crate::config::SecurityConfig;
use crate::error::ApiError;
use crate::flow;
use crate::metrics::{REVIEW_DECISIONS_TOTAL, SUBMISSIONS_CREATED_TOTAL};
use crate::models::answer::{AnswerContent, SubmitSurveyRequest, SubmittedAnswer};
use crate::models::submission::{
    ListSubmissionsQuery, PagedSubmissions, ReviewOutcome, StatsOverview, StatusQueryEntry,
    Submission, SubmissionStatus, SubmissionSummary,
};
use crate::models::{Question, Survey};

use super::abuse_gate::AbuseGate;
use super::turnstile_service::BotVerifier;

const SUBMIT_GUARD_TTL_SECONDS: u64 = 10;
const STATUS_QUERY_LIMIT: i64 = 10;

pub struct SubmissionService {
    mongo: Database,
    redis: ConnectionManager,
}

impl SubmissionService {
    pub fn new(mongo: Database, redis: ConnectionManager) -> Self {
        Self { mongo, redis }
    }

    /// Validates the payload against the visible question set, runs the
    /// anti-abuse gate, and persists the submission with its answers as a
    /// single document insert: the whole thing lands or nothing does.
    pub async fn create_submission(
        &self,
        survey: &Survey,
        questions: &[Question],
        req: SubmitSurveyRequest,
        client_ip: Option<String>,
        security: &SecurityConfig,
        verifier: &dyn BotVerifier,
    ) -> Result<Submission, ApiError> {
        req.validate()
            .map_err(|e| ApiError::validation(format!("invalid payload: {e}"), vec![]))?;

        let player_name = sanitize_player_name(&req.player_name);
        if player_name.is_empty() {
            return Err(ApiError::validation(
                "player name is empty after sanitization",
                vec!["player_name".to_string()],
            ));
        }

        let answers = validate_answers(questions, &req.answers)?;

        // Gate before any write; a rejected request leaves no trace.
        let gate = AbuseGate::new(security, verifier);
        let now = Utc::now();
        let fill_duration = gate
            .check(
                req.turnstile_token.as_deref(),
                req.started_at,
                client_ip.as_deref(),
                now,
            )
            .await?;

        // One concurrent create per (survey, player); the guard outlives
        // the insert by its TTL, which also swallows double-clicks that
        // slip past the client-side in-flight lock.
        if !self.acquire_submit_guard(&survey.id, &player_name).await? {
            tracing::warn!(
                "Duplicate submit blocked: survey={}, player={}",
                survey.code,
                player_name
            );
            return Err(ApiError::SubmitInProgress);
        }

        let submission = Submission {
            id: Uuid::new_v4().to_string(),
            survey_id: survey.id.clone(),
            survey_code: survey.code.clone(),
            survey_title: survey.title.clone(),
            player_name,
            client_ip,
            fill_duration,
            submitted_at: now,
            status: SubmissionStatus::Pending,
            first_viewed_at: None,
            reviewed_at: None,
            reviewed_by: None,
            review_note: None,
            answers,
        };

        let collection = self.mongo.collection::<Submission>("submissions");
        if let Err(e) = collection.insert_one(&submission).await {
            self.release_submit_guard(&survey.id, &submission.player_name)
                .await;
            return Err(ApiError::Internal(
                anyhow::Error::new(e).context("Failed to insert submission"),
            ));
        }

        SUBMISSIONS_CREATED_TOTAL
            .with_label_values(&[survey.code.as_str()])
            .inc();
        tracing::info!(
            "Submission created: id={}, survey={}, answers={}",
            submission.id,
            survey.code,
            submission.answers.len()
        );

        Ok(submission)
    }

    pub async fn get_submission(&self, submission_id: &str) -> Result<Submission, ApiError> {
        let collection = self.mongo.collection::<Submission>("submissions");
        collection
            .find_one(doc! { "_id": submission_id })
            .await
            .context("Failed to fetch submission")?
            .ok_or(ApiError::NotFound("submission"))
    }

    /// Fetch for the admin detail view, stamping `first_viewed_at` on the
    /// first qualifying read. The set-if-null conditional write makes
    /// concurrent admin views race safely: exactly one wins, the rest read.
    pub async fn get_submission_marking_viewed(
        &self,
        submission_id: &str,
    ) -> Result<Submission, ApiError> {
        let collection = self.mongo.collection::<Submission>("submissions");

        let updated = collection
            .find_one_and_update(
                first_view_filter(submission_id),
                doc! { "$set": {
                    "first_viewed_at": to_bson(&Utc::now())
                        .context("Failed to encode view timestamp")?
                } },
            )
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to record first view")?;

        match updated {
            Some(submission) => Ok(submission),
            // Already viewed (or missing): fall through to a plain read.
            None => self.get_submission(submission_id).await,
        }
    }

    /// The decision transition of the review state machine. Legal only
    /// from `pending`, enforced by the status-filtered conditional update:
    /// of two concurrent decisions exactly one matches the filter, and the
    /// loser gets a conflict carrying the winner's outcome.
    pub async fn decide(
        &self,
        submission_id: &str,
        outcome: ReviewOutcome,
        note: Option<String>,
        reviewed_by: &str,
    ) -> Result<Submission, ApiError> {
        let note = validated_review_note(outcome, note)?;
        let status = SubmissionStatus::from(outcome);
        let now = Utc::now();

        let collection = self.mongo.collection::<Submission>("submissions");
        let updated = collection
            .find_one_and_update(
                decide_filter(submission_id),
                doc! { "$set": {
                    "status": to_bson(&status).context("Failed to encode status")?,
                    "reviewed_at": to_bson(&now).context("Failed to encode review timestamp")?,
                    "reviewed_by": reviewed_by,
                    "review_note": note.map(Bson::String).unwrap_or(Bson::Null),
                } },
            )
            .return_document(ReturnDocument::After)
            .await
            .context("Failed to record decision")?;

        match updated {
            Some(submission) => {
                REVIEW_DECISIONS_TOTAL
                    .with_label_values(&[status.as_str()])
                    .inc();
                tracing::info!(
                    "Submission decided: id={}, outcome={}, by={}",
                    submission.id,
                    status.as_str(),
                    reviewed_by
                );
                Ok(submission)
            }
            None => {
                // Not pending anymore, or never existed; report which.
                let current = self.get_submission(submission_id).await?;
                Err(ApiError::DecisionConflict {
                    current: current.status,
                })
            }
        }
    }

    pub async fn list_submissions(
        &self,
        query: ListSubmissionsQuery,
    ) -> Result<PagedSubmissions, ApiError> {
        let collection = self.mongo.collection::<Submission>("submissions");

        let mut filter = doc! {};
        if let Some(status) = query.status {
            filter.insert("status", status.as_str());
        }
        if let Some(survey_id) = &query.survey_id {
            filter.insert("survey_id", survey_id.clone());
        }
        if let Some(player_name) = &query.player_name {
            filter.insert(
                "player_name",
                doc! { "$regex": regex::escape(player_name), "$options": "i" },
            );
        }

        let page = query.page.unwrap_or(1).max(1);
        let size = query.size.unwrap_or(20).clamp(1, 100);

        let total = collection
            .count_documents(filter.clone())
            .await
            .context("Failed to count submissions")?;

        let mut cursor = collection
            .find(filter)
            .sort(doc! { "submitted_at": -1 })
            .skip(((page - 1) * size) as u64)
            .limit(size as i64)
            .await
            .context("Failed to query submissions")?;

        let mut items = Vec::new();
        while cursor
            .advance()
            .await
            .context("Failed to advance submissions cursor")?
        {
            let submission = cursor
                .deserialize_current()
                .context("Failed to deserialize submission")?;
            items.push(SubmissionSummary::from(&submission));
        }

        Ok(PagedSubmissions {
            items,
            page,
            size,
            total,
            pages: total.div_ceil(size as u64),
        })
    }

    /// Public status query: a player's recent submissions with their
    /// timelines, nothing else (no answer contents, no reviewer identity).
    pub async fn query_status(&self, player_name: &str) -> Result<Vec<StatusQueryEntry>, ApiError> {
        let collection = self.mongo.collection::<Submission>("submissions");

        let mut cursor = collection
            .find(doc! { "player_name": player_name })
            .sort(doc! { "submitted_at": -1 })
            .limit(STATUS_QUERY_LIMIT)
            .await
            .context("Failed to query submission status")?;

        let mut entries = Vec::new();
        while cursor
            .advance()
            .await
            .context("Failed to advance status cursor")?
        {
            let submission: Submission = cursor
                .deserialize_current()
                .context("Failed to deserialize submission")?;
            entries.push(StatusQueryEntry::from(&submission));
        }

        Ok(entries)
    }

    pub async fn stats_overview(&self) -> Result<StatsOverview, ApiError> {
        let collection = self.mongo.collection::<Submission>("submissions");

        let pending = collection
            .count_documents(doc! { "status": "pending" })
            .await
            .context("Failed to count pending submissions")?;
        let approved = collection
            .count_documents(doc! { "status": "approved" })
            .await
            .context("Failed to count approved submissions")?;
        let rejected = collection
            .count_documents(doc! { "status": "rejected" })
            .await
            .context("Failed to count rejected submissions")?;

        Ok(StatsOverview {
            pending,
            approved,
            rejected,
            total: pending + approved + rejected,
        })
    }

    async fn acquire_submit_guard(
        &self,
        survey_id: &str,
        player_name: &str,
    ) -> Result<bool, ApiError> {
        let mut conn = self.redis.clone();
        let key = submit_guard_key(survey_id, player_name);

        let acquired: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(SUBMIT_GUARD_TTL_SECONDS)
            .query_async(&mut conn)
            .await
            .context("Failed to acquire submit guard")?;

        Ok(acquired.is_some())
    }

    /// Best effort: an expired guard only delays a retry by its TTL.
    async fn release_submit_guard(&self, survey_id: &str, player_name: &str) {
        let mut conn = self.redis.clone();
        let key = submit_guard_key(survey_id, player_name);
        let released: Result<(), _> = redis::cmd("DEL").arg(&key).query_async(&mut conn).await;
        if let Err(e) = released {
            tracing::warn!("Failed to release submit guard {}: {:#?}", key, e);
        }
    }
}

fn submit_guard_key(survey_id: &str, player_name: &str) -> String {
    format!("submit:guard:{}:{}", survey_id, player_name)
}

/// Conditional-write filters for the two racy transitions. Kept as plain
/// functions so the shapes are pinned by unit tests.
fn first_view_filter(submission_id: &str) -> Document {
    doc! { "_id": submission_id, "first_viewed_at": null }
}

fn decide_filter(submission_id: &str) -> Document {
    doc! { "_id": submission_id, "status": "pending" }
}

lazy_static! {
    static ref MARKUP_RE: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref EVENT_HANDLER_RE: Regex = Regex::new(r"(?i)on\w+\s*=").unwrap();
}

/// Strips markup, inline event handlers and statement separators from the
/// player identity before it is persisted or echoed anywhere.
fn sanitize_player_name(raw: &str) -> String {
    let without_markup = MARKUP_RE.replace_all(raw, "");
    let without_handlers = EVENT_HANDLER_RE.replace_all(&without_markup, "");
    without_handlers
        .replace(';', "")
        .replace("--", "")
        .trim()
        .to_string()
}

/// Server-side mirror of the client assembler: the payload is checked
/// against the visible subsequence computed from the submitted answers.
/// Entries for hidden questions are dropped (stale client caches must not
/// persist), and required-visible questions without an answer fail the
/// request naming every offender.
fn validate_answers(
    questions: &[Question],
    submitted: &[SubmittedAnswer],
) -> Result<Vec<SubmittedAnswer>, ApiError> {
    let by_id: HashMap<&str, &Question> =
        questions.iter().map(|q| (q.id.as_str(), q)).collect();

    let mut answers = flow::AnswerMap::new();
    for entry in submitted {
        let question = by_id.get(entry.question_id.as_str()).ok_or_else(|| {
            ApiError::validation(
                format!("unknown question id: {}", entry.question_id),
                vec![entry.question_id.clone()],
            )
        })?;
        if !entry.content.matches_kind(question.kind) {
            return Err(ApiError::validation(
                format!("answer shape does not match question {}", question.id),
                vec![question.id.clone()],
            ));
        }
        check_limits(question, &entry.content)?;
        answers.insert(entry.question_id.clone(), entry.content.clone());
    }

    let visible = flow::visible_subsequence(questions, &answers);

    let mut kept = Vec::with_capacity(visible.len());
    let mut missing = Vec::new();
    for question in visible {
        match answers.get(&question.id) {
            Some(content) if !content.is_empty() => kept.push(SubmittedAnswer {
                question_id: question.id.clone(),
                content: content.clone(),
            }),
            _ if question.is_required => missing.push(question.id.clone()),
            _ => {}
        }
    }

    if !missing.is_empty() {
        return Err(ApiError::validation(
            format!("required questions are unanswered: {}", missing.join(", ")),
            missing,
        ));
    }

    Ok(kept)
}

fn check_limits(question: &Question, content: &AnswerContent) -> Result<(), ApiError> {
    let limits = question.validation.clone().unwrap_or_default();

    match content {
        AnswerContent::Text { text } => {
            let len = text.chars().count() as u32;
            if let Some(max) = limits.max_length {
                if len > max {
                    return Err(ApiError::validation(
                        format!("answer to {} exceeds maximum length", question.id),
                        vec![question.id.clone()],
                    ));
                }
            }
            if let Some(min) = limits.min_length {
                if !text.trim().is_empty() && len < min {
                    return Err(ApiError::validation(
                        format!("answer to {} is below minimum length", question.id),
                        vec![question.id.clone()],
                    ));
                }
            }
        }
        AnswerContent::Image { images } => {
            if let Some(max) = limits.max_images {
                if images.len() as u32 > max {
                    return Err(ApiError::validation(
                        format!("too many images for {}", question.id),
                        vec![question.id.clone()],
                    ));
                }
            }
        }
        AnswerContent::Single { value } => {
            check_option_membership(question, std::slice::from_ref(value))?;
        }
        AnswerContent::Multiple { values } => {
            check_option_membership(question, values)?;
        }
        AnswerContent::Boolean { .. } => {}
    }

    Ok(())
}

fn check_option_membership(question: &Question, values: &[String]) -> Result<(), ApiError> {
    let Some(options) = &question.options else {
        return Ok(());
    };
    for value in values {
        if !options.iter().any(|o| &o.value == value) {
            return Err(ApiError::validation(
                format!("{} is not an option of question {}", value, question.id),
                vec![question.id.clone()],
            ));
        }
    }
    Ok(())
}

/// Note rule of the decision transition: required non-empty when
/// rejecting, optional when approving. Whitespace-only notes count as
/// absent.
fn validated_review_note(
    outcome: ReviewOutcome,
    note: Option<String>,
) -> Result<Option<String>, ApiError> {
    let trimmed = note
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    if outcome == ReviewOutcome::Rejected && trimmed.is_none() {
        return Err(ApiError::validation(
            "a review note is required when rejecting",
            vec!["review_note".to_string()],
        ));
    }
    Ok(trimmed)
}
