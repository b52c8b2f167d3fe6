use crate::domain::lifecycle;
use crate::domain::models::{Answer, ResponseMetadata, Survey};
use crate::domain::SurveyError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

/// Respondents send answers as text; choice widgets may send a list and
/// rating widgets a bare number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Text(String),
    Number(serde_json::Number),
    Choices(Vec<String>),
}

impl AnswerValue {
    pub fn into_text(self) -> String {
        match self {
            AnswerValue::Text(text) => text,
            AnswerValue::Number(number) => number.to_string(),
            AnswerValue::Choices(choices) => choices
                .iter()
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerDraft {
    pub question_id: String,
    pub answer: AnswerValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionDraft {
    #[serde(default)]
    pub answers: Vec<AnswerDraft>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSubmission {
    pub answers: Vec<Answer>,
    pub email: Option<String>,
    pub metadata: ResponseMetadata,
}

/// Decides whether `draft` may be stored against `survey`, given how many
/// responses the survey already holds.
///
/// Checks run in a fixed order: status, response limit, unknown question ids,
/// missing required answers, empty submission, email. An answer that is
/// blank after trimming counts as not given.
pub fn validate_submission(
    survey: &Survey,
    stored_responses: i64,
    draft: SubmissionDraft,
    metadata: ResponseMetadata,
) -> Result<ValidatedSubmission, SurveyError> {
    lifecycle::ensure_accepting(survey, stored_responses)?;

    let answers: Vec<Answer> = draft
        .answers
        .into_iter()
        .map(|a| Answer {
            question_id: a.question_id,
            answer: a.answer.into_text().trim().to_string(),
        })
        .collect();

    let invalid = invalid_question_ids(survey, &answers);
    if !invalid.is_empty() {
        return Err(SurveyError::InvalidQuestionReference(invalid));
    }

    let answers: Vec<Answer> = answers.into_iter().filter(|a| !a.answer.is_empty()).collect();

    let missing = missing_required_questions(survey, &answers);
    if !missing.is_empty() {
        return Err(SurveyError::MissingRequiredAnswers(missing));
    }

    if answers.is_empty() {
        return Err(SurveyError::validation("At least one answer is required"));
    }

    let email = normalize_email(draft.email.as_deref(), survey.settings.require_email)?;

    Ok(ValidatedSubmission {
        answers,
        email,
        metadata,
    })
}

/// Unknown ids, each once, in the order they were first submitted.
pub fn invalid_question_ids(survey: &Survey, answers: &[Answer]) -> Vec<String> {
    let known: HashSet<&str> = survey.questions.iter().map(|q| q.id.as_str()).collect();
    let mut reported = HashSet::new();
    answers
        .iter()
        .map(|a| a.question_id.as_str())
        .filter(|id| !known.contains(id) && reported.insert(*id))
        .map(String::from)
        .collect()
}

/// Texts of required questions without an answer, in survey order.
pub fn missing_required_questions(survey: &Survey, answers: &[Answer]) -> Vec<String> {
    let answered: HashSet<&str> = answers.iter().map(|a| a.question_id.as_str()).collect();
    let mut required: Vec<_> = survey.questions.iter().filter(|q| q.required).collect();
    required.sort_by_key(|q| q.order);
    required
        .into_iter()
        .filter(|q| !answered.contains(q.id.as_str()))
        .map(|q| q.text.clone())
        .collect()
}

pub fn normalize_email(raw: Option<&str>, required: bool) -> Result<Option<String>, SurveyError> {
    let email = raw
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty());
    match email {
        None if required => Err(SurveyError::EmailRequired),
        None => Ok(None),
        Some(email) if EMAIL_RE.is_match(&email) => Ok(Some(email)),
        Some(_) => Err(SurveyError::InvalidEmail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        Question, QuestionType, ResponseLimit, Settings, SurveyStatus,
    };
    use uuid::Uuid;

    fn question(id: &str, kind: QuestionType, text: &str, required: bool, order: i32) -> Question {
        Question {
            id: id.to_string(),
            question_type: kind,
            text: text.to_string(),
            options: kind.default_options(),
            required,
            order,
        }
    }

    fn survey(status: SurveyStatus, settings: Settings) -> Survey {
        let mut survey = Survey::new_draft(
            Uuid::new_v4(),
            "Service feedback".to_string(),
            None,
            vec![
                question("q1", QuestionType::Text, "What went well?", true, 0),
                question("q2", QuestionType::Rating, "Rate the service", false, 1),
            ],
            settings,
        );
        survey.status = status;
        survey
    }

    fn answers(pairs: &[(&str, &str)]) -> SubmissionDraft {
        SubmissionDraft {
            answers: pairs
                .iter()
                .map(|(id, text)| AnswerDraft {
                    question_id: id.to_string(),
                    answer: AnswerValue::Text(text.to_string()),
                })
                .collect(),
            email: None,
        }
    }

    #[test]
    fn test_accepts_required_answer() {
        let s = survey(SurveyStatus::Published, Settings::default());
        let accepted = validate_submission(&s, 0, answers(&[("q1", "  ok  ")]), ResponseMetadata::default()).unwrap();
        assert_eq!(
            accepted.answers,
            vec![Answer {
                question_id: "q1".to_string(),
                answer: "ok".to_string()
            }]
        );
        assert_eq!(accepted.email, None);
    }

    #[test]
    fn test_missing_required_lists_texts() {
        let s = survey(SurveyStatus::Published, Settings::default());
        let err = validate_submission(&s, 0, answers(&[("q2", "3")]), ResponseMetadata::default()).unwrap_err();
        assert_eq!(err, SurveyError::MissingRequiredAnswers(vec!["What went well?".to_string()]));
    }

    #[test]
    fn test_missing_required_follow_survey_order() {
        let mut s = survey(SurveyStatus::Published, Settings::default());
        s.questions.push(question("q3", QuestionType::Text, "Anything to add?", true, 2));
        s.questions.swap(0, 2);

        let err = validate_submission(&s, 0, answers(&[("q2", "4")]), ResponseMetadata::default()).unwrap_err();
        assert_eq!(
            err,
            SurveyError::MissingRequiredAnswers(vec![
                "What went well?".to_string(),
                "Anything to add?".to_string()
            ])
        );
    }

    #[test]
    fn test_blank_answer_counts_as_missing() {
        let s = survey(SurveyStatus::Published, Settings::default());
        let err = validate_submission(&s, 0, answers(&[("q1", "   "), ("q2", "5")]), ResponseMetadata::default())
            .unwrap_err();
        assert_eq!(err, SurveyError::MissingRequiredAnswers(vec!["What went well?".to_string()]));
    }

    #[test]
    fn test_invalid_ids_listed_once_each() {
        let s = survey(SurveyStatus::Published, Settings::default());
        let err = validate_submission(
            &s,
            0,
            answers(&[("q1", "fine"), ("nope", "x"), ("q9", "y"), ("nope", "z")]),
            ResponseMetadata::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            SurveyError::InvalidQuestionReference(vec!["nope".to_string(), "q9".to_string()])
        );
        assert_eq!(err.to_string(), "Invalid question IDs found: nope, q9");
    }

    #[test]
    fn test_draft_rejected_regardless_of_answers() {
        let s = survey(SurveyStatus::Draft, Settings::default());
        for draft in [answers(&[("q1", "ok")]), answers(&[]), answers(&[("bogus", "1")])] {
            let err = validate_submission(&s, 0, draft, ResponseMetadata::default()).unwrap_err();
            assert_eq!(err.to_string(), "This survey is not published yet");
        }
    }

    #[test]
    fn test_closed_rejected() {
        let s = survey(SurveyStatus::Closed, Settings::default());
        let err = validate_submission(&s, 0, answers(&[("q1", "ok")]), ResponseMetadata::default()).unwrap_err();
        assert_eq!(err, SurveyError::NotAcceptingResponses(SurveyStatus::Closed));
    }

    #[test]
    fn test_limit_reached() {
        let settings = Settings {
            response_limit: ResponseLimit::capped(1),
            ..Settings::default()
        };
        let s = survey(SurveyStatus::Published, settings);
        assert!(validate_submission(&s, 0, answers(&[("q1", "ok")]), ResponseMetadata::default()).is_ok());
        let err = validate_submission(&s, 1, answers(&[("q1", "ok")]), ResponseMetadata::default()).unwrap_err();
        assert_eq!(err.to_string(), "This survey has reached its response limit");
    }

    #[test]
    fn test_empty_submission_rejected() {
        let mut s = survey(SurveyStatus::Published, Settings::default());
        s.questions[0].required = false;
        let err = validate_submission(&s, 0, answers(&[]), ResponseMetadata::default()).unwrap_err();
        assert_eq!(err.to_string(), "At least one answer is required");
    }

    #[test]
    fn test_email_rules() {
        assert_eq!(
            normalize_email(Some("  Someone@Example.COM "), false).unwrap().as_deref(),
            Some("someone@example.com")
        );
        assert_eq!(normalize_email(Some("not-an-email"), false), Err(SurveyError::InvalidEmail));
        assert_eq!(normalize_email(Some("a b@c.d"), false), Err(SurveyError::InvalidEmail));
        assert_eq!(normalize_email(None, false), Ok(None));
        assert_eq!(normalize_email(Some("   "), true), Err(SurveyError::EmailRequired));
    }

    #[test]
    fn test_email_checked_on_submission() {
        let settings = Settings {
            require_email: true,
            ..Settings::default()
        };
        let s = survey(SurveyStatus::Published, settings);
        let err = validate_submission(&s, 0, answers(&[("q1", "ok")]), ResponseMetadata::default()).unwrap_err();
        assert_eq!(err, SurveyError::EmailRequired);

        let mut draft = answers(&[("q1", "ok")]);
        draft.email = Some("me@example.org".to_string());
        let metadata = ResponseMetadata {
            user_agent: Some("curl/8.0".to_string()),
            ip: Some("203.0.113.9".to_string()),
        };
        let accepted = validate_submission(&s, 0, draft, metadata.clone()).unwrap();
        assert_eq!(accepted.email.as_deref(), Some("me@example.org"));
        assert_eq!(accepted.metadata, metadata);
    }

    #[test]
    fn test_answer_value_shapes() {
        let parsed: SubmissionDraft = serde_json::from_str(
            r#"{"answers":[{"questionId":"q1","answer":"text"},{"questionId":"q2","answer":4},{"questionId":"q3","answer":["Red"," Blue "]}]}"#,
        )
        .unwrap();
        let texts: Vec<String> = parsed.answers.into_iter().map(|a| a.answer.into_text()).collect();
        assert_eq!(texts, vec!["text", "4", "Red, Blue"]);
    }
}
