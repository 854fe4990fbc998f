mod snapshot;


pub use snapshot::ResumeSnapshot;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use time::PrimitiveDateTime;
use tracing::{debug, info, warn};

use crate::core::config::SessionSettings;
use crate::core::time::{format_primitive, primitive_now_utc, seconds_between};
use crate::model::quiz::{Question, Quiz};
use crate::model::submission::{QuestionAnswer, RecordedAnswer, ResponsePayload};
use crate::services::lifecycle::{self, LifecycleError};
use crate::services::scoring::{self, ScoringAnomaly};
use crate::store::{resume_key, DocumentStore, FinalizeSubmission, ResumeCache, StoreError};

/// Session phases. `Loading` is the `start` call itself; a constructed
/// runtime is observable in `Active`, `Submitting` or `Completed` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Loading,
    Active,
    Submitting,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeTrigger {
    Student,
    Timeout,
}

#[derive(Debug)]
pub enum TickOutcome {
    /// Countdown is running; remaining seconds after this tick.
    Running { remaining_seconds: i64 },
    /// No timer to run: untimed quiz, stopped timer, or inactive phase.
    Idle,
    /// The deadline fired and the session was force-finalized.
    Finalized(FinalizeReport),
}

/// What finalize produced. Mirrors the terminal submission record.
#[derive(Debug, Clone)]
pub struct FinalizeReport {
    pub submission_id: String,
    pub answers: Vec<QuestionAnswer>,
    pub score: u32,
    pub total_points: u32,
    pub percentage: u8,
    pub passed: bool,
    pub submitted_at: PrimitiveDateTime,
    pub duration_seconds: i64,
    pub timed_out: bool,
    pub anomalies: Vec<ScoringAnomaly>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("quiz {0} not found")]
    QuizNotFound(String),
    #[error("question '{0}' is not part of this quiz")]
    UnknownQuestion(String),
    #[error("a {response} response cannot answer a {question} question")]
    ResponseMismatch { question: &'static str, response: &'static str },
    #[error("question index {index} is out of bounds (question count {count})")]
    IndexOutOfBounds { index: usize, count: usize },
    #[error("finalize requires at least one answered question")]
    NothingAnswered,
    #[error("a finalize call is already in flight")]
    FinalizeInFlight,
    #[error("session is already completed")]
    Completed,
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The in-browser, resumable state machine driving one attempt. Cloneable
/// handle over shared inner state so a countdown driver and UI handlers can
/// hold the same session.
#[derive(Clone)]
pub struct SessionRuntime {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn DocumentStore>,
    cache: Arc<dyn ResumeCache>,
    settings: SessionSettings,
    quiz: Quiz,
    student_id: String,
    submission_id: String,
    attempt_number: u32,
    total_points: u32,
    started_at: PrimitiveDateTime,
    state: Mutex<SessionState>,
    finalize_latch: AtomicBool,
}

#[derive(Debug)]
struct SessionState {
    phase: SessionPhase,
    /// Reachable only via the countdown hitting zero.
    expired: bool,
    answers: BTreeMap<String, RecordedAnswer>,
    current_index: usize,
    remaining_seconds: Option<i64>,
    question_entered_at: PrimitiveDateTime,
    last_snapshot_at: Option<PrimitiveDateTime>,
}

/// Clears the finalize latch on every exit path, success or failure.
struct LatchGuard<'a>(&'a AtomicBool);

impl Drop for LatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock_state(inner: &Inner) -> MutexGuard<'_, SessionState> {
    inner.state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn ensure_active(state: &SessionState) -> Result<(), SessionError> {
    match state.phase {
        SessionPhase::Active => Ok(()),
        SessionPhase::Submitting => Err(SessionError::FinalizeInFlight),
        SessionPhase::Completed | SessionPhase::Loading => Err(SessionError::Completed),
    }
}

impl SessionRuntime {
    /// The `loading` phase: fetch the quiz, resume or create the submission
    /// through the lifecycle gate, and reseed from the resume snapshot when
    /// a usable one exists. Fetch failures and denied starts surface as
    /// errors; nothing is retried here.
    pub async fn start(
        store: Arc<dyn DocumentStore>,
        cache: Arc<dyn ResumeCache>,
        settings: SessionSettings,
        quiz_id: &str,
        student_id: &str,
    ) -> Result<Self, SessionError> {
        let quiz = store
            .get_quiz(quiz_id)
            .await?
            .ok_or_else(|| SessionError::QuizNotFound(quiz_id.to_string()))?;

        let now = primitive_now_utc();
        let submission = lifecycle::begin_attempt(store.as_ref(), &quiz, student_id, now).await?;

        let key = resume_key(quiz_id);
        let mut resume: Option<ResumeSnapshot> = None;
        match cache.load(&key).await {
            Ok(Some(value)) => match serde_json::from_value::<ResumeSnapshot>(value) {
                Ok(snap) if snap.submission_id != submission.id => {
                    debug!(quiz_id, "snapshot belongs to another attempt; discarding");
                    let _ = cache.remove(&key).await;
                }
                Ok(snap) if snap.is_stale(now, settings.snapshot_ttl_minutes) => {
                    debug!(
                        quiz_id,
                        written_at = %format_primitive(snap.written_at),
                        "snapshot expired; discarding"
                    );
                    let _ = cache.remove(&key).await;
                }
                Ok(snap) => resume = Some(snap),
                Err(err) => {
                    warn!(quiz_id, error = %err, "snapshot unreadable; starting fresh");
                    let _ = cache.remove(&key).await;
                }
            },
            Ok(None) => {}
            Err(err) => {
                // Snapshot loss degrades to a fresh session, never a failure.
                warn!(quiz_id, error = %err, "resume cache unavailable; starting fresh");
            }
        }

        let remaining_seconds = match quiz.settings.time_limit_minutes {
            None => None,
            Some(limit) => {
                let from_snapshot = resume.as_ref().and_then(|snap| snap.remaining_seconds);
                Some(from_snapshot.unwrap_or_else(|| {
                    let budget = i64::from(limit) * 60;
                    let elapsed = seconds_between(submission.started_at, now).max(0);
                    (budget - elapsed).max(0)
                }))
            }
        };

        let question_count = quiz.questions.len();
        let resumed = resume.is_some();
        let (answers, current_index) = match resume {
            Some(snap) => {
                let index =
                    if question_count == 0 { 0 } else { snap.current_index.min(question_count - 1) };
                (snap.answers, index)
            }
            None => (BTreeMap::new(), 0),
        };

        info!(
            quiz_id,
            student_id,
            submission_id = %submission.id,
            attempt = submission.attempt_number,
            resumed,
            "session active"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                store,
                cache,
                settings,
                quiz,
                student_id: student_id.to_string(),
                submission_id: submission.id,
                attempt_number: submission.attempt_number,
                total_points: submission.total_points,
                started_at: submission.started_at,
                state: Mutex::new(SessionState {
                    phase: SessionPhase::Active,
                    expired: false,
                    answers,
                    current_index,
                    remaining_seconds,
                    question_entered_at: now,
                    last_snapshot_at: None,
                }),
                finalize_latch: AtomicBool::new(false),
            }),
        })
    }

    pub fn quiz(&self) -> &Quiz {
        &self.inner.quiz
    }

    pub fn submission_id(&self) -> &str {
        &self.inner.submission_id
    }

    pub fn student_id(&self) -> &str {
        &self.inner.student_id
    }

    pub fn attempt_number(&self) -> u32 {
        self.inner.attempt_number
    }

    pub fn phase(&self) -> SessionPhase {
        lock_state(&self.inner).phase
    }

    pub fn is_expired(&self) -> bool {
        lock_state(&self.inner).expired
    }

    pub fn current_index(&self) -> usize {
        lock_state(&self.inner).current_index
    }

    pub fn current_question(&self) -> Option<&Question> {
        let index = lock_state(&self.inner).current_index;
        self.inner.quiz.questions.get(index)
    }

    pub fn remaining_seconds(&self) -> Option<i64> {
        lock_state(&self.inner).remaining_seconds
    }

    pub fn answered_count(&self) -> usize {
        lock_state(&self.inner).answers.len()
    }

    /// Current answer map, keyed by question id.
    pub fn answers(&self) -> BTreeMap<String, ResponsePayload> {
        lock_state(&self.inner)
            .answers
            .iter()
            .map(|(question_id, recorded)| (question_id.clone(), recorded.response.clone()))
            .collect()
    }

    /// Free-form navigation within `[0, question_count)`.
    pub async fn jump_to(&self, index: usize) -> Result<(), SessionError> {
        let now = primitive_now_utc();
        {
            let mut state = lock_state(&self.inner);
            ensure_active(&state)?;
            let count = self.inner.quiz.questions.len();
            if index >= count {
                return Err(SessionError::IndexOutOfBounds { index, count });
            }
            if index == state.current_index {
                return Ok(());
            }
            state.current_index = index;
            state.question_entered_at = now;
        }
        self.mirror_snapshot(now).await;
        Ok(())
    }

    pub async fn next(&self) -> Result<(), SessionError> {
        let target = {
            let state = lock_state(&self.inner);
            ensure_active(&state)?;
            let last = self.inner.quiz.questions.len().saturating_sub(1);
            state.current_index.saturating_add(1).min(last)
        };
        self.jump_to(target).await
    }

    pub async fn previous(&self) -> Result<(), SessionError> {
        let target = {
            let state = lock_state(&self.inner);
            ensure_active(&state)?;
            state.current_index.saturating_sub(1)
        };
        self.jump_to(target).await
    }

    /// Records or replaces the answer for one question and mirrors the
    /// resume snapshot (debounced). Time spent is best-effort, accumulated
    /// from the moment the question became current.
    pub async fn record_answer(
        &self,
        question_id: &str,
        response: ResponsePayload,
    ) -> Result<(), SessionError> {
        let now = primitive_now_utc();
        {
            let mut state = lock_state(&self.inner);
            ensure_active(&state)?;

            let question = self
                .inner
                .quiz
                .question(question_id)
                .ok_or_else(|| SessionError::UnknownQuestion(question_id.to_string()))?;
            if !response.answers_kind(question.kind()) {
                return Err(SessionError::ResponseMismatch {
                    question: question.kind().as_str(),
                    response: response.kind().as_str(),
                });
            }

            let spent = seconds_between(state.question_entered_at, now).max(0) as u32;
            state.question_entered_at = now;
            match state.answers.get_mut(question_id) {
                Some(recorded) => {
                    recorded.response = response;
                    recorded.answered_at = now;
                    recorded.time_spent_seconds = recorded.time_spent_seconds.saturating_add(spent);
                }
                None => {
                    state.answers.insert(
                        question_id.to_string(),
                        RecordedAnswer { response, answered_at: now, time_spent_seconds: spent },
                    );
                }
            }
        }
        self.mirror_snapshot(now).await;
        Ok(())
    }

    /// One countdown step. Crossing zero flips the `expired` sub-state and
    /// performs the single forced finalize; after a failed forced finalize
    /// the timer stays stopped and any retry is an explicit call.
    pub async fn tick(&self) -> Result<TickOutcome, SessionError> {
        let now = primitive_now_utc();
        let (crossed, remaining) = {
            let mut state = lock_state(&self.inner);
            if state.phase != SessionPhase::Active || state.expired {
                return Ok(TickOutcome::Idle);
            }
            let Some(remaining) = state.remaining_seconds else {
                return Ok(TickOutcome::Idle);
            };
            let next = (remaining - 1).max(0);
            state.remaining_seconds = Some(next);
            if next == 0 {
                state.expired = true;
            }
            (next == 0, next)
        };

        if crossed {
            info!(quiz_id = %self.inner.quiz.id, "time limit reached; forcing finalize");
            return match self.finalize(FinalizeTrigger::Timeout).await {
                Ok(report) => Ok(TickOutcome::Finalized(report)),
                Err(SessionError::FinalizeInFlight | SessionError::Completed) => {
                    Ok(TickOutcome::Idle)
                }
                Err(err) => Err(err),
            };
        }

        self.mirror_snapshot(now).await;
        Ok(TickOutcome::Running { remaining_seconds: remaining })
    }

    /// Drives `tick` on a one-second interval until the deadline fires or
    /// the session stops being active. Returns the forced-finalize report
    /// when the countdown itself ended the session.
    pub async fn run_countdown(&self) -> Result<Option<FinalizeReport>, SessionError> {
        if self.remaining_seconds().is_none() {
            return Ok(None);
        }
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        // The first tick of a tokio interval completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            match self.tick().await? {
                TickOutcome::Finalized(report) => return Ok(Some(report)),
                TickOutcome::Running { .. } => {}
                TickOutcome::Idle => {
                    let state = lock_state(&self.inner);
                    if state.phase != SessionPhase::Active
                        || state.expired
                        || state.remaining_seconds.is_none()
                    {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Converts the answer map into a scored, terminal submission. Exactly
    /// one persistence call is in flight at a time: the latch is set before
    /// any asynchronous work and cleared however this returns. On a store
    /// failure the session re-surfaces as `active` with all answers intact.
    pub async fn finalize(&self, trigger: FinalizeTrigger) -> Result<FinalizeReport, SessionError> {
        if self
            .inner
            .finalize_latch
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::FinalizeInFlight);
        }
        let _latch = LatchGuard(&self.inner.finalize_latch);

        let now = primitive_now_utc();
        let (recorded, timed_out) = {
            let mut state = lock_state(&self.inner);
            ensure_active(&state)?;
            let timed_out = trigger == FinalizeTrigger::Timeout || state.expired;
            if state.answers.is_empty() && !timed_out {
                return Err(SessionError::NothingAnswered);
            }
            state.phase = SessionPhase::Submitting;
            (state.answers.clone(), timed_out)
        };

        let scored = scoring::score_answer_set(&self.inner.quiz, &recorded);
        let summary = scoring::summarize(
            scored.score,
            self.inner.total_points,
            self.inner.quiz.settings.passing_score,
        );
        let duration_seconds = seconds_between(self.inner.started_at, now).max(0);

        let outcome = self
            .inner
            .store
            .finalize_submission(FinalizeSubmission {
                submission_id: &self.inner.submission_id,
                answers: &scored.answers,
                score: summary.score,
                percentage: summary.percentage,
                passed: summary.passed,
                submitted_at: now,
                duration_seconds,
            })
            .await;

        if let Err(err) = outcome {
            // Roll back to active, never to loading: in-memory answers and
            // the resume snapshot survive for an explicit retry.
            let mut state = lock_state(&self.inner);
            state.phase = SessionPhase::Active;
            warn!(
                quiz_id = %self.inner.quiz.id,
                submission_id = %self.inner.submission_id,
                error = %err,
                "finalize failed; session back to active"
            );
            return Err(err.into());
        }

        // The snapshot is deleted only after the persist succeeded.
        if let Err(err) = self.inner.cache.remove(&resume_key(&self.inner.quiz.id)).await {
            warn!(quiz_id = %self.inner.quiz.id, error = %err, "snapshot removal failed");
        }

        {
            let mut state = lock_state(&self.inner);
            state.phase = SessionPhase::Completed;
        }

        info!(
            quiz_id = %self.inner.quiz.id,
            submission_id = %self.inner.submission_id,
            score = summary.score,
            percentage = summary.percentage,
            passed = summary.passed,
            timed_out,
            "submission finalized"
        );

        Ok(FinalizeReport {
            submission_id: self.inner.submission_id.clone(),
            answers: scored.answers,
            score: summary.score,
            total_points: summary.total_points,
            percentage: summary.percentage,
            passed: summary.passed,
            submitted_at: now,
            duration_seconds,
            timed_out,
            anomalies: scored.anomalies,
        })
    }

    /// Best-effort, debounced mirror of the in-memory state into the resume
    /// cache. Write failures degrade with a warning; they never surface.
    async fn mirror_snapshot(&self, now: PrimitiveDateTime) {
        let value = {
            let mut state = lock_state(&self.inner);
            if state.phase != SessionPhase::Active {
                return;
            }
            if let Some(last) = state.last_snapshot_at {
                let debounce = self.inner.settings.snapshot_debounce_seconds as i64;
                if seconds_between(last, now) < debounce {
                    return;
                }
            }
            state.last_snapshot_at = Some(now);
            let snapshot = ResumeSnapshot {
                quiz_id: self.inner.quiz.id.clone(),
                submission_id: self.inner.submission_id.clone(),
                answers: state.answers.clone(),
                current_index: state.current_index,
                remaining_seconds: state.remaining_seconds,
                written_at: now,
            };
            match serde_json::to_value(&snapshot) {
                Ok(value) => value,
                Err(err) => {
                    warn!(quiz_id = %self.inner.quiz.id, error = %err, "snapshot serialization failed");
                    return;
                }
            }
        };

        if let Err(err) = self.inner.cache.store(&resume_key(&self.inner.quiz.id), value).await {
            warn!(quiz_id = %self.inner.quiz.id, error = %err, "snapshot write failed");
        }
    }
}
