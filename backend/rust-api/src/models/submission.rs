use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::answer::{AnswerContent, SubmittedAnswer};

/// A stored submission. Answers are embedded so the whole thing is written
/// with a single insert; there is no partially-persisted state.
///
/// The nullable review fields deliberately serialize as `null` (not
/// skipped): the conditional writes in the submission service filter on
/// `first_viewed_at: null` and `status: "pending"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    #[serde(rename = "_id")]
    pub id: String,
    pub survey_id: String,
    pub survey_code: String,
    pub survey_title: String,
    pub player_name: String,
    pub client_ip: Option<String>,
    /// Fill time in seconds, derived from the client-reported start.
    pub fill_duration: Option<f64>,
    pub submitted_at: DateTime<Utc>,
    pub status: SubmissionStatus,
    pub first_viewed_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    pub review_note: Option<String>,
    pub answers: Vec<SubmittedAnswer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SubmissionStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        }
    }
}

/// Admin decision. Pending is not a decision, so this is a separate enum
/// rather than a reuse of `SubmissionStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    Approved,
    Rejected,
}

impl From<ReviewOutcome> for SubmissionStatus {
    fn from(outcome: ReviewOutcome) -> Self {
        match outcome {
            ReviewOutcome::Approved => SubmissionStatus::Approved,
            ReviewOutcome::Rejected => SubmissionStatus::Rejected,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub status: ReviewOutcome,
    pub review_note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineStage {
    Submitted,
    Viewed,
    Decided,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineState {
    Complete,
    Pending,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineStep {
    pub stage: TimelineStage,
    pub state: TimelineState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SubmissionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Submission {
    pub fn is_decided(&self) -> bool {
        self.status.is_terminal()
    }

    /// Derives the review timeline from the three timestamps; there is no
    /// separate event log. At most three steps:
    ///
    /// - submitted: always complete;
    /// - viewed: complete once `first_viewed_at` is set; a decided
    ///   submission that was never marked viewed renders as implicitly
    ///   complete (without a timestamp) rather than contradicting the
    ///   decision step; otherwise pending;
    /// - decided: present only once the status is terminal, carrying the
    ///   outcome and, for rejections, the note.
    pub fn timeline(&self) -> Vec<TimelineStep> {
        let mut steps = vec![TimelineStep {
            stage: TimelineStage::Submitted,
            state: TimelineState::Complete,
            at: Some(self.submitted_at),
            outcome: None,
            note: None,
        }];

        let viewed_state = if self.first_viewed_at.is_some() || self.is_decided() {
            TimelineState::Complete
        } else {
            TimelineState::Pending
        };
        steps.push(TimelineStep {
            stage: TimelineStage::Viewed,
            state: viewed_state,
            at: self.first_viewed_at,
            outcome: None,
            note: None,
        });

        if self.is_decided() {
            steps.push(TimelineStep {
                stage: TimelineStage::Decided,
                state: TimelineState::Complete,
                at: self.reviewed_at,
                outcome: Some(self.status),
                note: if self.status == SubmissionStatus::Rejected {
                    self.review_note.clone()
                } else {
                    None
                },
            });
        }

        steps
    }
}

#[derive(Debug, Deserialize)]
pub struct ListSubmissionsQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub status: Option<SubmissionStatus>,
    pub survey_id: Option<String>,
    pub player_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionSummary {
    pub id: String,
    pub survey_id: String,
    pub survey_title: String,
    pub player_name: String,
    pub status: SubmissionStatus,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl From<&Submission> for SubmissionSummary {
    fn from(s: &Submission) -> Self {
        Self {
            id: s.id.clone(),
            survey_id: s.survey_id.clone(),
            survey_title: s.survey_title.clone(),
            player_name: s.player_name.clone(),
            status: s.status,
            submitted_at: s.submitted_at,
            reviewed_at: s.reviewed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PagedSubmissions {
    pub items: Vec<SubmissionSummary>,
    pub page: u32,
    pub size: u32,
    pub total: u64,
    pub pages: u64,
}

/// Answer enriched with question metadata for the admin detail view.
/// Image answers additionally carry serving URLs resolved through the
/// storage collaborator.
#[derive(Debug, Serialize)]
pub struct AnswerDetail {
    pub question_id: String,
    pub question_title: String,
    pub question_type: Option<super::QuestionKind>,
    pub content: AnswerContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_urls: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionDetail {
    pub id: String,
    pub survey_id: String,
    pub survey_title: String,
    pub player_name: String,
    pub client_ip: Option<String>,
    pub fill_duration: Option<f64>,
    pub submitted_at: DateTime<Utc>,
    pub status: SubmissionStatus,
    pub first_viewed_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    pub review_note: Option<String>,
    pub answers: Vec<AnswerDetail>,
    pub timeline: Vec<TimelineStep>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub player_name: String,
}

/// Public status-query row: no answer contents, no reviewer identity.
#[derive(Debug, Serialize)]
pub struct StatusQueryEntry {
    pub survey_title: String,
    pub status: SubmissionStatus,
    pub submitted_at: DateTime<Utc>,
    pub fill_duration: Option<f64>,
    pub timeline: Vec<TimelineStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_note: Option<String>,
}

impl From<&Submission> for StatusQueryEntry {
    fn from(s: &Submission) -> Self {
        Self {
            survey_title: s.survey_title.clone(),
            status: s.status,
            submitted_at: s.submitted_at,
            fill_duration: s.fill_duration,
            timeline: s.timeline(),
            review_note: if s.status == SubmissionStatus::Rejected {
                s.review_note.clone()
            } else {
                None
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub id: String,
    pub status: SubmissionStatus,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct StatsOverview {
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(status: SubmissionStatus) -> Submission {
        Submission {
            id: "sub-1".to_string(),
            survey_id: "srv-1".to_string(),
            survey_code: "abc123".to_string(),
            survey_title: "Whitelist application".to_string(),
            player_name: "steve".to_string(),
            client_ip: None,
            fill_duration: Some(42.0),
            submitted_at: Utc::now(),
            status,
            first_viewed_at: None,
            reviewed_at: None,
            reviewed_by: None,
            review_note: None,
            answers: vec![],
        }
    }

    #[test]
    fn pending_unviewed_timeline_has_two_steps() {
        let steps = submission(SubmissionStatus::Pending).timeline();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].stage, TimelineStage::Submitted);
        assert_eq!(steps[0].state, TimelineState::Complete);
        assert_eq!(steps[1].stage, TimelineStage::Viewed);
        assert_eq!(steps[1].state, TimelineState::Pending);
    }

    #[test]
    fn viewed_timestamp_completes_the_viewed_step() {
        let mut sub = submission(SubmissionStatus::Pending);
        let viewed = Utc::now();
        sub.first_viewed_at = Some(viewed);
        let steps = sub.timeline();
        assert_eq!(steps[1].state, TimelineState::Complete);
        assert_eq!(steps[1].at, Some(viewed));
    }

    #[test]
    fn decision_without_view_renders_viewed_implicitly_complete() {
        let mut sub = submission(SubmissionStatus::Approved);
        sub.reviewed_at = Some(Utc::now());
        let steps = sub.timeline();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1].state, TimelineState::Complete);
        assert_eq!(steps[1].at, None);
        assert_eq!(steps[2].stage, TimelineStage::Decided);
        assert_eq!(steps[2].outcome, Some(SubmissionStatus::Approved));
    }

    #[test]
    fn rejection_note_appears_only_on_the_decided_step() {
        let mut sub = submission(SubmissionStatus::Rejected);
        sub.reviewed_at = Some(Utc::now());
        sub.review_note = Some("incomplete answers".to_string());
        let steps = sub.timeline();
        assert_eq!(steps[2].note.as_deref(), Some("incomplete answers"));

        let mut approved = submission(SubmissionStatus::Approved);
        approved.reviewed_at = Some(Utc::now());
        approved.review_note = Some("looks good".to_string());
        assert_eq!(approved.timeline()[2].note, None);
    }

    #[test]
    fn status_query_entry_hides_note_unless_rejected() {
        let mut sub = submission(SubmissionStatus::Approved);
        sub.review_note = Some("internal remark".to_string());
        let entry = StatusQueryEntry::from(&sub);
        assert_eq!(entry.review_note, None);

        let mut rejected = submission(SubmissionStatus::Rejected);
        rejected.review_note = Some("try again".to_string());
        let entry = StatusQueryEntry::from(&rejected);
        assert_eq!(entry.review_note.as_deref(), Some("try again"));
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SubmissionStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::to_string(&ReviewOutcome::Rejected).unwrap(),
            "\"rejected\""
        );
    }
}
