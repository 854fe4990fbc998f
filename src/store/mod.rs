pub mod memory;

use async_trait::async_trait;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::model::quiz::Quiz;
use crate::model::submission::{QuestionAnswer, Submission};
use crate::model::types::QuizStatus;

/// Persistence failures. Not-found is deliberately distinct from transient
/// unavailability so callers can tell a missing document from a flaky link.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("stored data corrupted: {0}")]
    Corrupted(String),
}

/// Write half of a finalize call.
pub struct FinalizeSubmission<'a> {
    pub submission_id: &'a str,
    pub answers: &'a [QuestionAnswer],
    pub score: u32,
    pub percentage: u8,
    pub passed: bool,
    pub submitted_at: PrimitiveDateTime,
    pub duration_seconds: i64,
}

/// Document persistence for quizzes and submissions. Implemented by the
/// embedding application over its document database; `memory` carries the
/// reference implementation.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_quiz(&self, quiz_id: &str) -> Result<Option<Quiz>, StoreError>;

    /// Inserts the record unless an in-progress submission already exists
    /// for the same (quiz, student) pair. Returns whether the insert won.
    async fn create_submission(&self, record: &Submission) -> Result<bool, StoreError>;

    async fn find_in_progress(
        &self,
        quiz_id: &str,
        student_id: &str,
    ) -> Result<Option<Submission>, StoreError>;

    async fn list_submissions(
        &self,
        quiz_id: &str,
        student_id: &str,
    ) -> Result<Vec<Submission>, StoreError>;

    async fn finalize_submission(&self, params: FinalizeSubmission<'_>) -> Result<(), StoreError>;

    async fn update_quiz_status(&self, quiz_id: &str, status: QuizStatus)
        -> Result<(), StoreError>;
}

/// Browser-scoped key-value cache for resume snapshots. Values are plain
/// JSON; shape compatibility with the current build is the only contract.
#[async_trait]
pub trait ResumeCache: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;
    async fn store(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

pub fn resume_key(quiz_id: &str) -> String {
    format!("resume:{quiz_id}")
}
