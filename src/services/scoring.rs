use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::warn;

use crate::model::quiz::{BlankSlot, Question, QuestionBody, Quiz};
use crate::model::submission::{percentage_of, QuestionAnswer, RecordedAnswer, ResponsePayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreOutcome {
    /// None for open_ended answers awaiting manual grading.
    pub is_correct: Option<bool>,
    pub points_earned: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScoringError {
    #[error("a {response} response cannot be scored against a {question} question")]
    KindMismatch { question: &'static str, response: &'static str },
    #[error("question has no scoring key: {0}")]
    MissingKey(String),
}

/// A question that could not be scored. Reported alongside the scored set
/// instead of failing the whole pass.
#[derive(Debug, Clone)]
pub struct ScoringAnomaly {
    pub question_id: String,
    pub reason: String,
}

/// The scored answer set for one submission.
#[derive(Debug, Clone)]
pub struct ScoredSet {
    pub answers: Vec<QuestionAnswer>,
    pub score: u32,
    pub anomalies: Vec<ScoringAnomaly>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreSummary {
    pub score: u32,
    pub total_points: u32,
    pub percentage: u8,
    pub passed: bool,
}

/// Scores one response against one question. Pure and stateless; repeated
/// invocation with the same inputs yields the same outcome.
pub fn score_response(
    question: &Question,
    response: &ResponsePayload,
) -> Result<ScoreOutcome, ScoringError> {
    match (&question.body, response) {
        (QuestionBody::MultipleChoice { options }, ResponsePayload::Choice { selected }) => {
            let correct: BTreeSet<&str> = options
                .iter()
                .filter(|option| option.is_correct)
                .map(|option| option.id.as_str())
                .collect();
            if correct.is_empty() {
                return Err(ScoringError::MissingKey(
                    "multiple_choice question has no correct option flagged".to_string(),
                ));
            }
            let chosen: BTreeSet<&str> = selected.iter().map(String::as_str).collect();
            Ok(award(question, chosen == correct))
        }
        (QuestionBody::TrueFalse { answer }, ResponsePayload::Boolean { value }) => {
            Ok(award(question, value == answer))
        }
        (QuestionBody::OpenEnded { .. }, ResponsePayload::Text { .. }) => {
            // Ungraded until a manual grading action sets the points.
            Ok(ScoreOutcome { is_correct: None, points_earned: 0 })
        }
        (QuestionBody::Matching { pairs }, ResponsePayload::Matches { entries }) => {
            if pairs.is_empty() {
                return Err(ScoringError::MissingKey(
                    "matching question has no pairs".to_string(),
                ));
            }
            let matched = pairs.iter().all(|pair| {
                entries.get(&pair.left_id).map(String::as_str) == Some(pair.right_id.as_str())
            });
            Ok(award(question, matched))
        }
        (QuestionBody::FillBlank { blanks }, ResponsePayload::Blanks { entries }) => {
            if blanks.is_empty() {
                return Err(ScoringError::MissingKey(
                    "fill_blank question has no blanks".to_string(),
                ));
            }
            // Each blank is checked independently; points are whole-question.
            let all_correct = blanks.iter().all(|blank| {
                entries.get(&blank.id).map(String::as_str).is_some_and(|text| {
                    blank_matches(blank, text)
                })
            });
            Ok(award(question, all_correct))
        }
        (body, payload) => Err(ScoringError::KindMismatch {
            question: body.kind().as_str(),
            response: payload.kind().as_str(),
        }),
    }
}

fn award(question: &Question, correct: bool) -> ScoreOutcome {
    ScoreOutcome {
        is_correct: Some(correct),
        points_earned: if correct { question.points } else { 0 },
    }
}

fn blank_matches(blank: &BlankSlot, text: &str) -> bool {
    let given = text.trim();
    let candidates = std::iter::once(blank.answer.as_str())
        .chain(blank.alternatives.iter().map(String::as_str));
    if blank.case_sensitive {
        candidates.into_iter().any(|candidate| candidate.trim() == given)
    } else {
        let given = given.to_lowercase();
        candidates.into_iter().any(|candidate| candidate.trim().to_lowercase() == given)
    }
}

/// Scores a full answer set against the quiz. Unanswered questions simply do
/// not appear; a question that cannot be scored is skipped and reported.
pub fn score_answer_set(quiz: &Quiz, recorded: &BTreeMap<String, RecordedAnswer>) -> ScoredSet {
    let mut answers = Vec::new();
    let mut anomalies = Vec::new();
    let mut score: u32 = 0;

    for question in &quiz.questions {
        let Some(entry) = recorded.get(&question.id) else {
            continue;
        };
        match score_response(question, &entry.response) {
            Ok(outcome) => {
                score += outcome.points_earned;
                answers.push(QuestionAnswer {
                    question_id: question.id.clone(),
                    question_type: question.kind(),
                    response: entry.response.clone(),
                    is_correct: outcome.is_correct,
                    points_earned: outcome.points_earned,
                    answered_at: entry.answered_at,
                    time_spent_seconds: entry.time_spent_seconds,
                });
            }
            Err(err) => {
                warn!(question_id = %question.id, error = %err, "skipping unscorable question");
                anomalies
                    .push(ScoringAnomaly { question_id: question.id.clone(), reason: err.to_string() });
            }
        }
    }

    for question_id in recorded.keys() {
        if quiz.question(question_id).is_none() {
            warn!(question_id = %question_id, "recorded answer has no matching question");
            anomalies.push(ScoringAnomaly {
                question_id: question_id.clone(),
                reason: "question is not part of the quiz".to_string(),
            });
        }
    }

    ScoredSet { answers, score, anomalies }
}

pub fn summarize(score: u32, total_points: u32, passing_score: Option<u8>) -> ScoreSummary {
    let percentage = percentage_of(score, total_points);
    let passed = passing_score.map(|threshold| percentage >= threshold).unwrap_or(true);
    ScoreSummary { score, total_points, percentage, passed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::primitive_now_utc;
    use crate::model::quiz::ChoiceOption;
    use crate::model::types::QuizStatus;
    use crate::test_support;

    fn recorded(response: ResponsePayload) -> RecordedAnswer {
        RecordedAnswer { response, answered_at: primitive_now_utc(), time_spent_seconds: 5 }
    }

    #[test]
    fn multiple_choice_exact_set_wins_full_points() {
        let question = test_support::multiple_choice("q1", 10, &["b"]);

        let hit = score_response(
            &question,
            &ResponsePayload::Choice { selected: vec!["b".to_string()] },
        )
        .unwrap();
        assert_eq!(hit, ScoreOutcome { is_correct: Some(true), points_earned: 10 });

        let miss = score_response(
            &question,
            &ResponsePayload::Choice { selected: vec!["a".to_string()] },
        )
        .unwrap();
        assert_eq!(miss, ScoreOutcome { is_correct: Some(false), points_earned: 0 });
    }

    #[test]
    fn multiple_choice_multi_correct_is_all_or_nothing() {
        let question = test_support::multiple_choice("q1", 10, &["a", "c"]);

        let partial = score_response(
            &question,
            &ResponsePayload::Choice { selected: vec!["a".to_string()] },
        )
        .unwrap();
        assert_eq!(partial.is_correct, Some(false));
        assert_eq!(partial.points_earned, 0);

        let exact = score_response(
            &question,
            &ResponsePayload::Choice { selected: vec!["c".to_string(), "a".to_string()] },
        )
        .unwrap();
        assert_eq!(exact.is_correct, Some(true));
        assert_eq!(exact.points_earned, 10);
    }

    #[test]
    fn true_false_compares_booleans() {
        let question = test_support::true_false("q1", 5, true);
        let outcome =
            score_response(&question, &ResponsePayload::Boolean { value: false }).unwrap();
        assert_eq!(outcome, ScoreOutcome { is_correct: Some(false), points_earned: 0 });
    }

    #[test]
    fn open_ended_stays_ungraded() {
        let question = test_support::open_ended("q1", 5);
        let outcome = score_response(
            &question,
            &ResponsePayload::Text { value: "Plants convert light into energy".to_string() },
        )
        .unwrap();
        assert_eq!(outcome, ScoreOutcome { is_correct: None, points_earned: 0 });
    }

    #[test]
    fn matching_requires_every_pair() {
        let question = test_support::matching("q1", 10);

        let complete = BTreeMap::from([
            ("l1".to_string(), "r1".to_string()),
            ("l2".to_string(), "r2".to_string()),
        ]);
        let outcome =
            score_response(&question, &ResponsePayload::Matches { entries: complete }).unwrap();
        assert_eq!(outcome.is_correct, Some(true));

        // One omission fails the whole question.
        let partial = BTreeMap::from([("l1".to_string(), "r1".to_string())]);
        let outcome =
            score_response(&question, &ResponsePayload::Matches { entries: partial }).unwrap();
        assert_eq!(outcome.is_correct, Some(false));
        assert_eq!(outcome.points_earned, 0);
    }

    #[test]
    fn fill_blank_trims_and_honors_case_flag() {
        let insensitive = test_support::fill_blank("q1", 10, false);
        let entries = BTreeMap::from([("b1".to_string(), "  OXYGEN ".to_string())]);
        let outcome = score_response(&insensitive, &ResponsePayload::Blanks { entries }).unwrap();
        assert_eq!(outcome.is_correct, Some(true));

        let entries = BTreeMap::from([("b1".to_string(), "o2".to_string())]);
        let outcome = score_response(&insensitive, &ResponsePayload::Blanks { entries }).unwrap();
        assert_eq!(outcome.is_correct, Some(true), "alternatives are accepted");

        let sensitive = test_support::fill_blank("q2", 10, true);
        let entries = BTreeMap::from([("b1".to_string(), "OXYGEN".to_string())]);
        let outcome = score_response(&sensitive, &ResponsePayload::Blanks { entries }).unwrap();
        assert_eq!(outcome.is_correct, Some(false));
    }

    #[test]
    fn kind_mismatch_is_an_error() {
        let question = test_support::true_false("q1", 5, true);
        let err = score_response(
            &question,
            &ResponsePayload::Text { value: "yes".to_string() },
        )
        .unwrap_err();
        assert_eq!(
            err,
            ScoringError::KindMismatch { question: "true_false", response: "open_ended" }
        );
    }

    #[test]
    fn malformed_question_is_skipped_not_fatal() {
        let mut quiz = test_support::quiz_with_questions(
            "quiz-1",
            QuizStatus::Published,
            vec![
                test_support::multiple_choice("q1", 10, &["a"]),
                test_support::true_false("q2", 5, true),
            ],
        );
        // Corrupt the stored document past edit-time validation: no option
        // is flagged correct anymore.
        if let crate::model::quiz::QuestionBody::MultipleChoice { options } =
            &mut quiz.questions[0].body
        {
            for option in options.iter_mut() {
                option.is_correct = false;
            }
        }

        let recorded_set = BTreeMap::from([
            (
                "q1".to_string(),
                recorded(ResponsePayload::Choice { selected: vec!["a".to_string()] }),
            ),
            ("q2".to_string(), recorded(ResponsePayload::Boolean { value: true })),
        ]);

        let scored = score_answer_set(&quiz, &recorded_set);
        assert_eq!(scored.score, 5);
        assert_eq!(scored.answers.len(), 1);
        assert_eq!(scored.answers[0].question_id, "q2");
        assert_eq!(scored.anomalies.len(), 1);
        assert_eq!(scored.anomalies[0].question_id, "q1");
    }

    #[test]
    fn set_score_equals_sum_of_answer_points_and_is_stable() {
        let quiz = test_support::full_quiz();
        let recorded_set = BTreeMap::from([
            (
                "q1".to_string(),
                recorded(ResponsePayload::Choice { selected: vec!["b".to_string()] }),
            ),
            ("q2".to_string(), recorded(ResponsePayload::Boolean { value: true })),
            (
                "q5".to_string(),
                recorded(ResponsePayload::Blanks {
                    entries: BTreeMap::from([("b1".to_string(), "oxygen".to_string())]),
                }),
            ),
        ]);

        let first = score_answer_set(&quiz, &recorded_set);
        let summed: u32 = first.answers.iter().map(|answer| answer.points_earned).sum();
        assert_eq!(first.score, summed);

        let second = score_answer_set(&quiz, &recorded_set);
        assert_eq!(first.score, second.score);
        assert_eq!(first.answers.len(), second.answers.len());
    }

    #[test]
    fn extra_correct_option_changes_the_key() {
        let mut question = test_support::multiple_choice("q1", 10, &["b"]);
        if let crate::model::quiz::QuestionBody::MultipleChoice { options } = &mut question.body {
            options.push(ChoiceOption {
                id: "e".to_string(),
                text: "Also right".to_string(),
                is_correct: true,
            });
        }
        let outcome = score_response(
            &question,
            &ResponsePayload::Choice { selected: vec!["b".to_string()] },
        )
        .unwrap();
        assert_eq!(outcome.is_correct, Some(false));
    }

    #[test]
    fn summarize_derives_percentage_and_pass() {
        let summary = summarize(20, 20, Some(60));
        assert_eq!(summary.percentage, 100);
        assert!(summary.passed);

        let summary = summarize(5, 20, Some(60));
        assert_eq!(summary.percentage, 25);
        assert!(!summary.passed);

        let summary = summarize(0, 20, None);
        assert!(summary.passed, "no threshold means every submission passes");
    }
}
