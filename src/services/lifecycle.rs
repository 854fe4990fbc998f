use thiserror::Error;
use time::PrimitiveDateTime;
use tracing::info;

use crate::model::quiz::Quiz;
use crate::model::submission::Submission;
use crate::model::types::QuizStatus;
use crate::store::{DocumentStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDenied {
    MaxAttempts,
    NotPublished,
}

impl StartDenied {
    pub fn reason(self) -> &'static str {
        match self {
            StartDenied::MaxAttempts => "max_attempts",
            StartDenied::NotPublished => "not_published",
        }
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("attempt not allowed: {}", .0.reason())]
    StartDenied(StartDenied),
    #[error("cannot move a {from} quiz to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
    #[error("quiz must have at least one question before approval")]
    NoQuestions,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Gate for starting a new attempt. `prior_attempts` counts the student's
/// existing submissions for this quiz across all statuses.
pub fn can_start_attempt(quiz: &Quiz, prior_attempts: usize) -> Result<(), StartDenied> {
    if quiz.status != QuizStatus::Published {
        return Err(StartDenied::NotPublished);
    }
    if let Some(max_attempts) = quiz.settings.max_attempts {
        if prior_attempts as u32 >= max_attempts {
            return Err(StartDenied::MaxAttempts);
        }
    }
    Ok(())
}

/// Resumes the student's in-progress submission if one exists, otherwise
/// gates and creates a new one. The submission list is re-read here, at
/// creation time, so the attempt count is authoritative even when two tabs
/// race; a lost insert adopts the winner's record. Best-effort against an
/// eventually consistent store.
pub async fn begin_attempt(
    store: &dyn DocumentStore,
    quiz: &Quiz,
    student_id: &str,
    now: PrimitiveDateTime,
) -> Result<Submission, LifecycleError> {
    let prior = store.list_submissions(&quiz.id, student_id).await?;
    if let Some(open) = prior.iter().find(|submission| submission.is_in_progress()) {
        info!(
            quiz_id = %quiz.id,
            student_id = %student_id,
            submission_id = %open.id,
            "resuming in-progress attempt"
        );
        return Ok(open.clone());
    }

    can_start_attempt(quiz, prior.len()).map_err(LifecycleError::StartDenied)?;

    let record = Submission::begin(quiz, student_id, prior.len() as u32 + 1, now);
    let inserted = store.create_submission(&record).await?;
    if !inserted {
        // Another session won the race; adopt its record.
        let existing = store.find_in_progress(&quiz.id, student_id).await?.ok_or_else(|| {
            StoreError::NotFound(format!("in-progress submission for quiz {}", quiz.id))
        })?;
        return Ok(existing);
    }

    info!(
        quiz_id = %quiz.id,
        student_id = %student_id,
        submission_id = %record.id,
        attempt = record.attempt_number,
        "attempt started"
    );
    Ok(record)
}

/// Enforces the monotonic status table: draft → approved → published →
/// closed. Approval requires at least one question.
pub fn advance_status(
    quiz: &mut Quiz,
    target: QuizStatus,
    now: PrimitiveDateTime,
) -> Result<(), LifecycleError> {
    let allowed = matches!(
        (quiz.status, target),
        (QuizStatus::Draft, QuizStatus::Approved)
            | (QuizStatus::Approved, QuizStatus::Published)
            | (QuizStatus::Published, QuizStatus::Closed)
    );
    if !allowed {
        return Err(LifecycleError::InvalidTransition {
            from: quiz.status.as_str(),
            to: target.as_str(),
        });
    }
    if target == QuizStatus::Approved && quiz.questions.is_empty() {
        return Err(LifecycleError::NoQuestions);
    }

    quiz.status = target;
    quiz.updated_at = now;
    info!(quiz_id = %quiz.id, status = target.as_str(), "quiz status advanced");
    Ok(())
}

/// Advances the local document and persists the new status.
pub async fn advance_and_store(
    store: &dyn DocumentStore,
    quiz: &mut Quiz,
    target: QuizStatus,
    now: PrimitiveDateTime,
) -> Result<(), LifecycleError> {
    advance_status(quiz, target, now)?;
    store.update_quiz_status(&quiz.id, target).await?;
    Ok(())
}
