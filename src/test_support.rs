use std::sync::Arc;

use crate::core::config::SessionSettings;
use crate::core::time::primitive_now_utc;
use crate::model::quiz::{
    BlankSlot, ChoiceOption, MatchPair, Question, QuestionBody, Quiz, QuizSettings,
};
use crate::model::types::{DifficultyLevel, QuizStatus};
use crate::services::session::SessionRuntime;
use crate::store::memory::{MemoryResumeCache, MemoryStore};
use crate::store::{DocumentStore, ResumeCache};

pub(crate) const STUDENT: &str = "student-1";

pub(crate) fn test_settings() -> SessionSettings {
    SessionSettings { snapshot_debounce_seconds: 0, snapshot_ttl_minutes: 1440 }
}

fn question(id: &str, points: u32, body: QuestionBody) -> Question {
    Question {
        id: id.to_string(),
        prompt: format!("Prompt for {id}"),
        points,
        difficulty: DifficultyLevel::Medium,
        explanation: None,
        hint: None,
        order_index: 0,
        body,
    }
}

/// Four options `a`..`d`; the listed ids are flagged correct.
pub(crate) fn multiple_choice(id: &str, points: u32, correct: &[&str]) -> Question {
    let options = ["a", "b", "c", "d"]
        .iter()
        .map(|&option_id| ChoiceOption {
            id: option_id.to_string(),
            text: format!("Option {}", option_id.to_uppercase()),
            is_correct: correct.contains(&option_id),
        })
        .collect();
    question(id, points, QuestionBody::MultipleChoice { options })
}

pub(crate) fn true_false(id: &str, points: u32, answer: bool) -> Question {
    question(id, points, QuestionBody::TrueFalse { answer })
}

pub(crate) fn open_ended(id: &str, points: u32) -> Question {
    question(id, points, QuestionBody::OpenEnded { sample_answer: None })
}

/// Two pairs: l1 -> r1, l2 -> r2.
pub(crate) fn matching(id: &str, points: u32) -> Question {
    let pairs = vec![
        MatchPair {
            left_id: "l1".to_string(),
            left: "Mitochondria".to_string(),
            right_id: "r1".to_string(),
            right: "Respiration".to_string(),
        },
        MatchPair {
            left_id: "l2".to_string(),
            left: "Chloroplast".to_string(),
            right_id: "r2".to_string(),
            right: "Photosynthesis".to_string(),
        },
    ];
    question(id, points, QuestionBody::Matching { pairs })
}

/// One blank `b1`, answer "oxygen" with alternative "o2".
pub(crate) fn fill_blank(id: &str, points: u32, case_sensitive: bool) -> Question {
    let blanks = vec![BlankSlot {
        id: "b1".to_string(),
        answer: "oxygen".to_string(),
        alternatives: vec!["o2".to_string()],
        case_sensitive,
    }];
    question(id, points, QuestionBody::FillBlank { blanks })
}

pub(crate) fn quiz_with_questions(
    id: &str,
    status: QuizStatus,
    questions: Vec<Question>,
) -> Quiz {
    let now = primitive_now_utc();
    let settings = QuizSettings { passing_score: Some(60), ..QuizSettings::default() };
    let mut quiz = Quiz::new(id, "Unit quiz", settings, now);
    for item in questions {
        quiz.push_question(item, now).expect("fixture question");
    }
    quiz.status = status;
    quiz
}

/// Published quiz covering all five question variants, 40 points total.
pub(crate) fn full_quiz() -> Quiz {
    quiz_with_questions(
        "quiz-1",
        QuizStatus::Published,
        vec![
            multiple_choice("q1", 10, &["b"]),
            true_false("q2", 5, true),
            open_ended("q3", 5),
            matching("q4", 10),
            fill_blank("q5", 10, false),
        ],
    )
}

/// Published single-question quiz with a countdown.
pub(crate) fn timed_quiz(minutes: u32) -> Quiz {
    let mut quiz = quiz_with_questions(
        "quiz-timed",
        QuizStatus::Published,
        vec![multiple_choice("q1", 10, &["b"])],
    );
    quiz.settings.time_limit_minutes = Some(minutes);
    quiz
}

pub(crate) fn seeded_store(quiz: &Quiz) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert_quiz(quiz.clone());
    store
}

pub(crate) async fn start_session(
    store: &Arc<MemoryStore>,
    cache: &Arc<MemoryResumeCache>,
    quiz_id: &str,
) -> SessionRuntime {
    let store: Arc<dyn DocumentStore> = store.clone();
    let cache: Arc<dyn ResumeCache> = cache.clone();
    SessionRuntime::start(store, cache, test_settings(), quiz_id, STUDENT)
        .await
        .expect("session start")
}
