use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::model::quiz::Quiz;
use crate::model::submission::Submission;
use crate::model::types::{QuizStatus, SubmissionStatus};
use crate::store::{DocumentStore, FinalizeSubmission, ResumeCache, StoreError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory `DocumentStore`. Doubles as the test double: failures can be
/// injected for the next finalize call, and finalize invocations are counted.
#[derive(Default)]
pub struct MemoryStore {
    quizzes: Mutex<HashMap<String, Quiz>>,
    submissions: Mutex<HashMap<String, Submission>>,
    fail_next_finalize: AtomicBool,
    finalize_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_quiz(&self, quiz: Quiz) {
        lock(&self.quizzes).insert(quiz.id.clone(), quiz);
    }

    pub fn insert_submission(&self, submission: Submission) {
        lock(&self.submissions).insert(submission.id.clone(), submission);
    }

    pub fn submission(&self, submission_id: &str) -> Option<Submission> {
        lock(&self.submissions).get(submission_id).cloned()
    }

    pub fn fail_next_finalize(&self) {
        self.fail_next_finalize.store(true, Ordering::SeqCst);
    }

    /// Number of finalize invocations, including injected failures.
    pub fn finalize_calls(&self) -> usize {
        self.finalize_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_quiz(&self, quiz_id: &str) -> Result<Option<Quiz>, StoreError> {
        Ok(lock(&self.quizzes).get(quiz_id).cloned())
    }

    async fn create_submission(&self, record: &Submission) -> Result<bool, StoreError> {
        let mut submissions = lock(&self.submissions);
        let open_exists = submissions.values().any(|existing| {
            existing.quiz_id == record.quiz_id
                && existing.student_id == record.student_id
                && existing.is_in_progress()
        });
        if open_exists {
            return Ok(false);
        }
        submissions.insert(record.id.clone(), record.clone());
        Ok(true)
    }

    async fn find_in_progress(
        &self,
        quiz_id: &str,
        student_id: &str,
    ) -> Result<Option<Submission>, StoreError> {
        Ok(lock(&self.submissions)
            .values()
            .find(|submission| {
                submission.quiz_id == quiz_id
                    && submission.student_id == student_id
                    && submission.is_in_progress()
            })
            .cloned())
    }

    async fn list_submissions(
        &self,
        quiz_id: &str,
        student_id: &str,
    ) -> Result<Vec<Submission>, StoreError> {
        let mut matching: Vec<Submission> = lock(&self.submissions)
            .values()
            .filter(|submission| {
                submission.quiz_id == quiz_id && submission.student_id == student_id
            })
            .cloned()
            .collect();
        matching.sort_by_key(|submission| submission.attempt_number);
        Ok(matching)
    }

    async fn finalize_submission(&self, params: FinalizeSubmission<'_>) -> Result<(), StoreError> {
        // Yield once so concurrent finalize calls genuinely overlap in tests.
        tokio::task::yield_now().await;

        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_finalize.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected finalize failure".to_string()));
        }

        let mut submissions = lock(&self.submissions);
        let submission = submissions
            .get_mut(params.submission_id)
            .ok_or_else(|| StoreError::NotFound(format!("submission {}", params.submission_id)))?;
        submission.answers = params.answers.to_vec();
        submission.score = params.score;
        submission.percentage = params.percentage;
        submission.passed = params.passed;
        submission.status = SubmissionStatus::Submitted;
        submission.submitted_at = Some(params.submitted_at);
        submission.duration_seconds = Some(params.duration_seconds);
        Ok(())
    }

    async fn update_quiz_status(
        &self,
        quiz_id: &str,
        status: QuizStatus,
    ) -> Result<(), StoreError> {
        let mut quizzes = lock(&self.quizzes);
        let quiz = quizzes
            .get_mut(quiz_id)
            .ok_or_else(|| StoreError::NotFound(format!("quiz {quiz_id}")))?;
        quiz.status = status;
        Ok(())
    }
}

/// In-memory `ResumeCache` with injectable write failures, standing in for
/// browser-local storage.
#[derive(Default)]
pub struct MemoryResumeCache {
    entries: Mutex<HashMap<String, serde_json::Value>>,
    fail_writes: AtomicBool,
}

impl MemoryResumeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.entries).contains_key(key)
    }

    pub fn put(&self, key: &str, value: serde_json::Value) {
        lock(&self.entries).insert(key.to_string(), value);
    }
}

#[async_trait]
impl ResumeCache for MemoryResumeCache {
    async fn load(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    async fn store(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("cache quota exceeded".to_string()));
        }
        lock(&self.entries).insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::submission::Submission;
    use crate::core::time::primitive_now_utc;
    use crate::test_support;

    #[tokio::test]
    async fn create_submission_refuses_second_open_attempt() {
        let store = MemoryStore::new();
        let quiz = test_support::full_quiz();
        let now = primitive_now_utc();

        let first = Submission::begin(&quiz, "student-1", 1, now);
        assert!(store.create_submission(&first).await.unwrap());

        let second = Submission::begin(&quiz, "student-1", 2, now);
        assert!(!store.create_submission(&second).await.unwrap());

        let listed = store.list_submissions(&quiz.id, "student-1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, first.id);
    }

    #[tokio::test]
    async fn finalize_rejects_unknown_submission() {
        let store = MemoryStore::new();
        let err = store
            .finalize_submission(FinalizeSubmission {
                submission_id: "missing",
                answers: &[],
                score: 0,
                percentage: 0,
                passed: true,
                submitted_at: primitive_now_utc(),
                duration_seconds: 0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
