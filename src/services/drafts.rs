use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use time::PrimitiveDateTime;
use tracing::warn;
use uuid::Uuid;
use validator::Validate;

use crate::model::quiz::{
    BlankSlot, ChoiceOption, MatchPair, Question, QuestionBody, Quiz, QuizError,
};
use crate::model::types::DifficultyLevel;

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("draft generation failed: {0}")]
    Generation(String),
}

#[derive(Debug, Validate)]
pub struct DraftRequest {
    #[validate(length(min = 1, message = "topic must not be empty"))]
    pub topic: String,
    /// Lesson transcript, when the draft is grounded in a recording.
    pub transcript: Option<String>,
    #[validate(range(min = 1, max = 50, message = "question_count must be 1..=50"))]
    pub question_count: u32,
    pub difficulty: DifficultyLevel,
}

/// Black-box candidate-question producer backed by a generative AI service.
#[async_trait]
pub trait DraftGenerator: Send + Sync {
    async fn generate_draft(&self, request: &DraftRequest)
        -> Result<Vec<QuestionDraft>, DraftError>;
}

#[derive(Debug, Deserialize)]
pub struct ChoiceOptionDraft {
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    #[serde(default, alias = "isCorrect")]
    pub is_correct: bool,
}

#[derive(Debug, Deserialize)]
pub struct MatchPairDraft {
    pub left: String,
    pub right: String,
}

#[derive(Debug, Deserialize)]
pub struct BlankSlotDraft {
    pub answer: String,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default, alias = "caseSensitive")]
    pub case_sensitive: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionBodyDraft {
    MultipleChoice { options: Vec<ChoiceOptionDraft> },
    TrueFalse { answer: bool },
    OpenEnded {
        #[serde(default, alias = "sampleAnswer")]
        sample_answer: Option<String>,
    },
    Matching { pairs: Vec<MatchPairDraft> },
    FillBlank { blanks: Vec<BlankSlotDraft> },
}

/// A generated candidate question as it comes off the wire. Generators are
/// not trusted to produce well-formed questions; `admit_drafts` is the gate.
#[derive(Debug, Deserialize, Validate)]
pub struct QuestionDraft {
    #[validate(length(min = 1, message = "prompt must not be empty"))]
    pub prompt: String,
    #[serde(default = "default_points")]
    #[validate(range(min = 1, message = "points must be positive"))]
    pub points: u32,
    #[serde(default = "default_difficulty")]
    pub difficulty: DifficultyLevel,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(flatten)]
    pub body: QuestionBodyDraft,
}

fn default_points() -> u32 {
    10
}

fn default_difficulty() -> DifficultyLevel {
    DifficultyLevel::Medium
}

#[derive(Debug)]
pub struct RejectedDraft {
    pub index: usize,
    pub prompt: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct DraftAdmission {
    pub accepted: Vec<Question>,
    pub rejected: Vec<RejectedDraft>,
}

/// Repairs what is safely repairable, validates the rest, and converts the
/// survivors into real questions. Malformed drafts are reported, never
/// inserted.
pub fn admit_drafts(drafts: Vec<QuestionDraft>) -> DraftAdmission {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();

    for (index, draft) in drafts.into_iter().enumerate() {
        let prompt = draft.prompt.trim().to_string();
        if let Err(err) = draft.validate() {
            warn!(index, error = %err, "rejecting malformed question draft");
            rejected.push(RejectedDraft { index, prompt, reason: err.to_string() });
            continue;
        }
        match convert_draft(draft) {
            Ok(question) => accepted.push(question),
            Err(reason) => {
                warn!(index, reason = %reason, "rejecting malformed question draft");
                rejected.push(RejectedDraft { index, prompt, reason });
            }
        }
    }

    DraftAdmission { accepted, rejected }
}

/// Pushes admitted questions into a draft quiz through the guarded mutation
/// API, recomputing the derived totals.
pub fn append_drafts(
    quiz: &mut Quiz,
    admitted: Vec<Question>,
    now: PrimitiveDateTime,
) -> Result<(), QuizError> {
    for question in admitted {
        quiz.push_question(question, now)?;
    }
    Ok(())
}

fn convert_draft(draft: QuestionDraft) -> Result<Question, String> {
    let body = match draft.body {
        QuestionBodyDraft::MultipleChoice { options } => {
            let options: Vec<ChoiceOption> = options
                .into_iter()
                .filter(|option| !option.text.trim().is_empty())
                .map(|option| ChoiceOption {
                    id: option.id.filter(|id| !id.trim().is_empty()).unwrap_or_else(new_id),
                    text: option.text.trim().to_string(),
                    is_correct: option.is_correct,
                })
                .collect();
            QuestionBody::MultipleChoice { options }
        }
        QuestionBodyDraft::TrueFalse { answer } => QuestionBody::TrueFalse { answer },
        QuestionBodyDraft::OpenEnded { sample_answer } => QuestionBody::OpenEnded {
            sample_answer: sample_answer
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty()),
        },
        QuestionBodyDraft::Matching { pairs } => {
            let pairs: Vec<MatchPair> = pairs
                .into_iter()
                .filter(|pair| !pair.left.trim().is_empty() && !pair.right.trim().is_empty())
                .map(|pair| MatchPair {
                    left_id: new_id(),
                    left: pair.left.trim().to_string(),
                    right_id: new_id(),
                    right: pair.right.trim().to_string(),
                })
                .collect();
            QuestionBody::Matching { pairs }
        }
        QuestionBodyDraft::FillBlank { blanks } => {
            let blanks: Vec<BlankSlot> = blanks
                .into_iter()
                .map(|blank| BlankSlot {
                    id: new_id(),
                    answer: blank.answer.trim().to_string(),
                    alternatives: blank
                        .alternatives
                        .into_iter()
                        .map(|alternative| alternative.trim().to_string())
                        .filter(|alternative| !alternative.is_empty())
                        .collect(),
                    case_sensitive: blank.case_sensitive,
                })
                .collect();
            QuestionBody::FillBlank { blanks }
        }
    };

    let question = Question {
        id: new_id(),
        prompt: draft.prompt.trim().to_string(),
        points: draft.points,
        difficulty: draft.difficulty,
        explanation: draft.explanation.map(|text| text.trim().to_string()),
        hint: draft.hint.map(|text| text.trim().to_string()),
        order_index: 0,
        body,
    };
    question.validate().map_err(|err| err.to_string())?;
    Ok(question)
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::primitive_now_utc;
    use crate::model::quiz::QuizSettings;
    use serde_json::json;

    fn draft_from(value: serde_json::Value) -> QuestionDraft {
        serde_json::from_value(value).expect("draft json")
    }

    #[test]
    fn well_formed_draft_is_admitted_and_repaired() {
        let draft = draft_from(json!({
            "prompt": "  Which gas do plants release?  ",
            "type": "multiple_choice",
            "options": [
                {"text": " Oxygen ", "isCorrect": true},
                {"text": "Nitrogen"},
                {"text": "   "},
            ]
        }));

        let admission = admit_drafts(vec![draft]);
        assert!(admission.rejected.is_empty());
        assert_eq!(admission.accepted.len(), 1);

        let question = &admission.accepted[0];
        assert_eq!(question.prompt, "Which gas do plants release?");
        assert_eq!(question.points, 10);
        if let QuestionBody::MultipleChoice { options } = &question.body {
            assert_eq!(options.len(), 2, "the blank option is dropped");
            assert_eq!(options[0].text, "Oxygen");
            assert!(!options[0].id.is_empty());
        } else {
            panic!("expected multiple_choice body");
        }
    }

    #[test]
    fn degenerate_drafts_are_rejected_with_reasons() {
        let single_option = draft_from(json!({
            "prompt": "Pick one",
            "type": "multiple_choice",
            "options": [{"text": "Only", "isCorrect": true}]
        }));
        let empty_prompt = draft_from(json!({
            "prompt": "   ",
            "type": "true_false",
            "answer": true
        }));

        let admission = admit_drafts(vec![single_option, empty_prompt]);
        assert!(admission.accepted.is_empty());
        assert_eq!(admission.rejected.len(), 2);
        assert_eq!(admission.rejected[0].index, 0);
        assert!(admission.rejected[0].reason.contains("options"));
    }

    #[test]
    fn admitted_drafts_enter_the_quiz_with_recomputed_totals() {
        let now = primitive_now_utc();
        let mut quiz = Quiz::new("quiz-1", "Biology", QuizSettings::default(), now);

        let drafts = vec![
            draft_from(json!({
                "prompt": "Water is H2O",
                "points": 5,
                "type": "true_false",
                "answer": true
            })),
            draft_from(json!({
                "prompt": "Fill it in",
                "type": "fill_blank",
                "blanks": [{"answer": " photosynthesis ", "alternatives": ["", "light reaction"]}]
            })),
        ];

        let admission = admit_drafts(drafts);
        assert_eq!(admission.accepted.len(), 2);
        append_drafts(&mut quiz, admission.accepted, now).unwrap();

        assert_eq!(quiz.question_count(), 2);
        assert_eq!(quiz.total_points, 15);
        if let QuestionBody::FillBlank { blanks } = &quiz.questions[1].body {
            assert_eq!(blanks[0].answer, "photosynthesis");
            assert_eq!(blanks[0].alternatives, vec!["light reaction".to_string()]);
        } else {
            panic!("expected fill_blank body");
        }
    }

    #[test]
    fn draft_request_bounds_are_validated() {
        let request = DraftRequest {
            topic: String::new(),
            transcript: None,
            question_count: 0,
            difficulty: DifficultyLevel::Easy,
        };
        assert!(request.validate().is_err());
    }

    struct CannedGenerator;

    #[async_trait]
    impl DraftGenerator for CannedGenerator {
        async fn generate_draft(
            &self,
            _request: &DraftRequest,
        ) -> Result<Vec<QuestionDraft>, DraftError> {
            Ok(vec![draft_from(json!({
                "prompt": "Water is H2O",
                "type": "true_false",
                "answer": true
            }))])
        }
    }

    #[tokio::test]
    async fn generator_output_flows_through_admission() {
        let request = DraftRequest {
            topic: "Chemistry basics".to_string(),
            transcript: None,
            question_count: 1,
            difficulty: DifficultyLevel::Easy,
        };
        request.validate().unwrap();

        let generated = CannedGenerator.generate_draft(&request).await.unwrap();
        let admission = admit_drafts(generated);
        assert_eq!(admission.accepted.len(), 1);
        assert_eq!(admission.accepted[0].points, 10, "default points applied");
    }
}
