use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::model::types::{AnswerVisibility, DifficultyLevel, QuestionKind, QuizStatus};

pub const MIN_CHOICE_OPTIONS: usize = 2;
pub const MAX_CHOICE_OPTIONS: usize = 8;
pub const MIN_MATCH_PAIRS: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuizError {
    #[error("questions cannot be edited once a quiz is {status}")]
    Immutable { status: &'static str },
    #[error("question '{question_id}' is malformed: {reason}")]
    MalformedQuestion { question_id: String, reason: String },
    #[error("question '{0}' not found")]
    UnknownQuestion(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizSettings {
    /// Countdown budget for one attempt. None means untimed.
    pub time_limit_minutes: Option<u32>,
    /// Pass threshold as a percentage. None means every submission passes.
    pub passing_score: Option<u8>,
    pub answer_visibility: AnswerVisibility,
    pub max_attempts: Option<u32>,
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            time_limit_minutes: None,
            passing_score: None,
            answer_visibility: AnswerVisibility::AfterSubmission,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchPair {
    pub left_id: String,
    pub left: String,
    pub right_id: String,
    pub right: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlankSlot {
    pub id: String,
    pub answer: String,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub case_sensitive: bool,
}

/// Closed set of answer-key shapes. Exactly one scoring key representation
/// per question type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionBody {
    MultipleChoice { options: Vec<ChoiceOption> },
    TrueFalse { answer: bool },
    OpenEnded {
        #[serde(default)]
        sample_answer: Option<String>,
    },
    Matching { pairs: Vec<MatchPair> },
    FillBlank { blanks: Vec<BlankSlot> },
}

impl QuestionBody {
    pub fn kind(&self) -> QuestionKind {
        match self {
            QuestionBody::MultipleChoice { .. } => QuestionKind::MultipleChoice,
            QuestionBody::TrueFalse { .. } => QuestionKind::TrueFalse,
            QuestionBody::OpenEnded { .. } => QuestionKind::OpenEnded,
            QuestionBody::Matching { .. } => QuestionKind::Matching,
            QuestionBody::FillBlank { .. } => QuestionKind::FillBlank,
        }
    }

    /// Edit-time shape checks. Counts are enforced here, never at score time.
    fn check(&self) -> Result<(), String> {
        match self {
            QuestionBody::MultipleChoice { options } => {
                if options.len() < MIN_CHOICE_OPTIONS || options.len() > MAX_CHOICE_OPTIONS {
                    return Err(format!(
                        "multiple_choice requires {MIN_CHOICE_OPTIONS}..={MAX_CHOICE_OPTIONS} options, got {}",
                        options.len()
                    ));
                }
                if !options.iter().any(|option| option.is_correct) {
                    return Err("multiple_choice requires at least one correct option".to_string());
                }
                if options.iter().any(|option| option.text.trim().is_empty()) {
                    return Err("option text must not be empty".to_string());
                }
                let mut ids: Vec<&str> = options.iter().map(|option| option.id.as_str()).collect();
                ids.sort_unstable();
                ids.dedup();
                if ids.len() != options.len() {
                    return Err("option ids must be unique".to_string());
                }
                Ok(())
            }
            QuestionBody::TrueFalse { .. } | QuestionBody::OpenEnded { .. } => Ok(()),
            QuestionBody::Matching { pairs } => {
                if pairs.len() < MIN_MATCH_PAIRS {
                    return Err(format!(
                        "matching requires at least {MIN_MATCH_PAIRS} pairs, got {}",
                        pairs.len()
                    ));
                }
                let mut lefts: Vec<&str> = pairs.iter().map(|pair| pair.left_id.as_str()).collect();
                lefts.sort_unstable();
                lefts.dedup();
                if lefts.len() != pairs.len() {
                    return Err("pair left ids must be unique".to_string());
                }
                Ok(())
            }
            QuestionBody::FillBlank { blanks } => {
                if blanks.is_empty() {
                    return Err("fill_blank requires at least one blank".to_string());
                }
                if blanks.iter().any(|blank| blank.answer.trim().is_empty()) {
                    return Err("blank answers must not be empty".to_string());
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    pub points: u32,
    pub difficulty: DifficultyLevel,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
    pub order_index: u32,
    #[serde(flatten)]
    pub body: QuestionBody,
}

impl Question {
    pub fn kind(&self) -> QuestionKind {
        self.body.kind()
    }

    pub fn validate(&self) -> Result<(), QuizError> {
        if self.prompt.trim().is_empty() {
            return Err(QuizError::MalformedQuestion {
                question_id: self.id.clone(),
                reason: "prompt must not be empty".to_string(),
            });
        }
        self.body.check().map_err(|reason| QuizError::MalformedQuestion {
            question_id: self.id.clone(),
            reason,
        })
    }

    fn estimated_minutes(&self) -> u32 {
        match self.kind() {
            QuestionKind::MultipleChoice | QuestionKind::TrueFalse => 1,
            QuestionKind::Matching | QuestionKind::FillBlank => 2,
            QuestionKind::OpenEnded => 3,
        }
    }
}

/// A versioned assessment authored by a teacher. `total_points` and
/// `estimated_minutes` are derived and recomputed on every question
/// mutation; question edits are rejected once the quiz is published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub questions: Vec<Question>,
    pub settings: QuizSettings,
    pub status: QuizStatus,
    #[serde(default)]
    pub class_ids: Vec<String>,
    pub total_points: u32,
    pub estimated_minutes: u32,
    pub created_at: PrimitiveDateTime,
    pub updated_at: PrimitiveDateTime,
}

impl Quiz {
    pub fn new(id: &str, title: &str, settings: QuizSettings, now: PrimitiveDateTime) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: None,
            questions: Vec::new(),
            settings,
            status: QuizStatus::Draft,
            class_ids: Vec::new(),
            total_points: 0,
            estimated_minutes: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|question| question.id == question_id)
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn push_question(
        &mut self,
        mut question: Question,
        now: PrimitiveDateTime,
    ) -> Result<(), QuizError> {
        self.ensure_editable()?;
        question.validate()?;
        question.order_index = self.questions.len() as u32;
        self.questions.push(question);
        self.recompute_derived(now);
        Ok(())
    }

    pub fn replace_question(
        &mut self,
        question: Question,
        now: PrimitiveDateTime,
    ) -> Result<(), QuizError> {
        self.ensure_editable()?;
        question.validate()?;
        let slot = self
            .questions
            .iter_mut()
            .find(|existing| existing.id == question.id)
            .ok_or_else(|| QuizError::UnknownQuestion(question.id.clone()))?;
        let order_index = slot.order_index;
        *slot = question;
        slot.order_index = order_index;
        self.recompute_derived(now);
        Ok(())
    }

    pub fn remove_question(
        &mut self,
        question_id: &str,
        now: PrimitiveDateTime,
    ) -> Result<Question, QuizError> {
        self.ensure_editable()?;
        let position = self
            .questions
            .iter()
            .position(|question| question.id == question_id)
            .ok_or_else(|| QuizError::UnknownQuestion(question_id.to_string()))?;
        let removed = self.questions.remove(position);
        for (index, question) in self.questions.iter_mut().enumerate() {
            question.order_index = index as u32;
        }
        self.recompute_derived(now);
        Ok(removed)
    }

    fn ensure_editable(&self) -> Result<(), QuizError> {
        match self.status {
            QuizStatus::Draft | QuizStatus::Approved => Ok(()),
            status => Err(QuizError::Immutable { status: status.as_str() }),
        }
    }

    fn recompute_derived(&mut self, now: PrimitiveDateTime) {
        self.total_points = self.questions.iter().map(|question| question.points).sum();
        self.estimated_minutes =
            self.questions.iter().map(|question| question.estimated_minutes()).sum();
        self.updated_at = now;
    }
}
