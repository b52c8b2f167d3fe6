pub mod aggregate;
pub mod lifecycle;
pub mod models;
pub mod schema;
pub mod submission;
pub mod update;

use models::SurveyStatus;
use thiserror::Error;

/// Rule violations raised by the survey core. Each one is the caller's to fix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurveyError {
    #[error("{0}")]
    Validation(String),
    #[error("{}", .0.rejection_message())]
    NotAcceptingResponses(SurveyStatus),
    #[error("This survey has reached its response limit")]
    ResponseLimitReached,
    #[error("Invalid question IDs found: {}", .0.join(", "))]
    InvalidQuestionReference(Vec<String>),
    #[error("Missing answers for required questions")]
    MissingRequiredAnswers(Vec<String>),
    #[error("Invalid email format")]
    InvalidEmail,
    #[error("An email address is required for this survey")]
    EmailRequired,
    #[error("Question not found")]
    UnknownQuestion(String),
}

impl SurveyError {
    pub fn validation(message: impl Into<String>) -> Self {
        SurveyError::Validation(message.into())
    }
}
