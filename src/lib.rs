pub mod core;
pub mod model;
pub mod services;
pub mod store;

#[cfg(test)]
mod test_support;

pub use model::quiz::{Question, QuestionBody, Quiz, QuizError, QuizSettings};
pub use model::submission::{QuestionAnswer, RecordedAnswer, ResponsePayload, Submission};
pub use model::types::{
    AnswerVisibility, DifficultyLevel, QuestionKind, QuizStatus, SubmissionStatus,
};
pub use services::session::{
    FinalizeReport, FinalizeTrigger, ResumeSnapshot, SessionError, SessionPhase, SessionRuntime,
    TickOutcome,
};
pub use store::{DocumentStore, FinalizeSubmission, ResumeCache, StoreError};
