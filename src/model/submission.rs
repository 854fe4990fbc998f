use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::model::quiz::Quiz;
use crate::model::types::{QuestionKind, SubmissionStatus};

/// One student response payload, shaped per question type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponsePayload {
    /// Selected option ids for multiple_choice.
    Choice { selected: Vec<String> },
    /// true_false answer.
    Boolean { value: bool },
    /// Free text for open_ended.
    Text { value: String },
    /// blank id -> entered text for fill_blank.
    Blanks { entries: BTreeMap<String, String> },
    /// left id -> right id for matching.
    Matches { entries: BTreeMap<String, String> },
}

impl ResponsePayload {
    pub fn kind(&self) -> QuestionKind {
        match self {
            ResponsePayload::Choice { .. } => QuestionKind::MultipleChoice,
            ResponsePayload::Boolean { .. } => QuestionKind::TrueFalse,
            ResponsePayload::Text { .. } => QuestionKind::OpenEnded,
            ResponsePayload::Blanks { .. } => QuestionKind::FillBlank,
            ResponsePayload::Matches { .. } => QuestionKind::Matching,
        }
    }

    pub fn answers_kind(&self, kind: QuestionKind) -> bool {
        self.kind() == kind
    }
}

/// An in-flight response held by the session runtime and mirrored into the
/// resume snapshot. Becomes a `QuestionAnswer` at finalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedAnswer {
    pub response: ResponsePayload,
    pub answered_at: PrimitiveDateTime,
    pub time_spent_seconds: u32,
}

/// One scored response within a finalized submission. `question_type` is
/// denormalized so results can be rendered without re-joining the quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question_id: String,
    pub question_type: QuestionKind,
    pub response: ResponsePayload,
    /// None for open_ended answers awaiting manual grading.
    pub is_correct: Option<bool>,
    pub points_earned: u32,
    pub answered_at: PrimitiveDateTime,
    pub time_spent_seconds: u32,
}

/// One attempt by one student against one quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub quiz_id: String,
    pub student_id: String,
    pub answers: Vec<QuestionAnswer>,
    pub score: u32,
    /// Copied from the quiz at attempt start, never re-derived live.
    pub total_points: u32,
    pub percentage: u8,
    pub passed: bool,
    pub status: SubmissionStatus,
    pub attempt_number: u32,
    pub started_at: PrimitiveDateTime,
    pub submitted_at: Option<PrimitiveDateTime>,
    pub graded_at: Option<PrimitiveDateTime>,
    pub duration_seconds: Option<i64>,
}

impl Submission {
    pub fn begin(
        quiz: &Quiz,
        student_id: &str,
        attempt_number: u32,
        now: PrimitiveDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            quiz_id: quiz.id.clone(),
            student_id: student_id.to_string(),
            answers: Vec::new(),
            score: 0,
            total_points: quiz.total_points,
            percentage: 0,
            passed: false,
            status: SubmissionStatus::InProgress,
            attempt_number,
            started_at: now,
            submitted_at: None,
            graded_at: None,
            duration_seconds: None,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == SubmissionStatus::InProgress
    }
}

/// round(100 * score / total_points), clamped to 0..=100.
pub fn percentage_of(score: u32, total_points: u32) -> u8 {
    if total_points == 0 {
        return 0;
    }
    let rounded = (200 * u64::from(score) + u64::from(total_points)) / (2 * u64::from(total_points));
    rounded.min(100) as u8
}
