//! Structural rules for survey content: question lists, titles and settings.
//!
//! `normalize_questions` turns author input into stored questions (ids,
//! orders, default options). `validate_survey` is the last check before a
//! survey is written and must pass for every insert and update.

use crate::domain::models::{Question, QuestionType, ResponseLimit, Settings, Survey};
use crate::domain::SurveyError;
use serde::Deserialize;
use std::collections::HashSet;
use uuid::Uuid;

pub const MIN_CHOICE_OPTIONS: usize = 2;
const TITLE_MIN_CHARS: usize = 3;
const TITLE_MAX_CHARS: usize = 200;
const DESCRIPTION_MAX_CHARS: usize = 1000;
const QUESTION_MIN_CHARS: usize = 2;
const QUESTION_MAX_CHARS: usize = 500;
const OPTION_MAX_CHARS: usize = 200;

/// A question as submitted by an author, before normalization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuestionDraft {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub question_type: Option<String>,
    #[serde(rename = "question", default)]
    pub text: Option<String>,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub required: bool,
}

impl From<&Question> for QuestionDraft {
    fn from(question: &Question) -> Self {
        Self {
            id: Some(question.id.clone()),
            question_type: Some(question.question_type.as_str().to_string()),
            text: Some(question.text.clone()),
            options: Some(question.options.clone()),
            required: question.required,
        }
    }
}

/// Settings as accepted on input. Older clients send `limitResponses` either
/// as a flag next to `maxResponses` or as the cap itself; both collapse into
/// `responseLimit`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsInput {
    pub allow_anonymous: Option<bool>,
    pub require_email: Option<bool>,
    pub response_limit: Option<ResponseLimit>,
    pub limit_responses: Option<LegacyLimit>,
    pub max_responses: Option<i64>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum LegacyLimit {
    Flag(bool),
    Cap(i64),
}

impl SettingsInput {
    /// Overlays the supplied fields on `base`; absent fields keep their value.
    pub fn apply_to(self, base: Settings) -> Settings {
        let mut settings = base;
        if let Some(allow) = self.allow_anonymous {
            settings.allow_anonymous = allow;
        }
        if let Some(require) = self.require_email {
            settings.require_email = require;
        }

        let mut limit = self.response_limit.unwrap_or(settings.response_limit);
        match self.limit_responses {
            Some(LegacyLimit::Flag(enabled)) => limit.enabled = enabled,
            Some(LegacyLimit::Cap(cap)) => {
                limit.enabled = cap > 0;
                limit.max = (cap > 0).then_some(cap);
            }
            None => {}
        }
        if let Some(max) = self.max_responses {
            limit.max = Some(max);
        }
        if !limit.enabled && limit.max.is_some_and(|max| max <= 0) {
            limit.max = None;
        }
        settings.response_limit = limit;
        settings
    }
}

pub fn normalize_questions(drafts: Vec<QuestionDraft>) -> Result<Vec<Question>, SurveyError> {
    if drafts.is_empty() {
        return Err(SurveyError::validation("At least one question is required"));
    }

    let questions = drafts
        .into_iter()
        .enumerate()
        .map(|(index, draft)| normalize_question(index, draft))
        .collect::<Result<Vec<_>, _>>()?;

    ensure_unique_ids(&questions)?;
    ensure_unique_orders(&questions)?;
    Ok(questions)
}

fn normalize_question(index: usize, draft: QuestionDraft) -> Result<Question, SurveyError> {
    let text = draft.text.as_deref().map(str::trim).unwrap_or_default();
    let raw_type = draft
        .question_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let Some(raw_type) = raw_type.filter(|_| !text.is_empty()) else {
        return Err(SurveyError::validation(format!(
            "Question {} must have a type and question text",
            index + 1
        )));
    };

    let question_type = QuestionType::try_from(raw_type).map_err(|_| {
        SurveyError::validation(format!(
            "Question \"{text}\" has an invalid type. Must be one of: text, multiple_choice, single_choice, rating, scale"
        ))
    })?;

    check_question_text(text)?;

    let options: Vec<String> = draft
        .options
        .unwrap_or_default()
        .into_iter()
        .map(|option| option.trim().to_string())
        .filter(|option| !option.is_empty())
        .collect();

    let options = match question_type {
        QuestionType::Text => Vec::new(),
        kind if kind.is_graded() && options.is_empty() => kind.default_options(),
        _ => options,
    };

    let id = draft
        .id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let question = Question {
        id,
        question_type,
        text: text.to_string(),
        options,
        required: draft.required,
        order: index as i32,
    };
    check_options(&question)?;
    Ok(question)
}

fn check_question_text(text: &str) -> Result<(), SurveyError> {
    let len = text.chars().count();
    if len < QUESTION_MIN_CHARS {
        return Err(SurveyError::validation(format!(
            "Question \"{text}\" must be at least {QUESTION_MIN_CHARS} characters long"
        )));
    }
    if len > QUESTION_MAX_CHARS {
        return Err(SurveyError::validation(format!(
            "Question cannot exceed {QUESTION_MAX_CHARS} characters"
        )));
    }
    Ok(())
}

fn check_options(question: &Question) -> Result<(), SurveyError> {
    let text = &question.text;
    let kind = question.question_type;
    if kind.is_choice() && question.options.len() < MIN_CHOICE_OPTIONS {
        return Err(SurveyError::validation(format!(
            "Question \"{text}\" requires at least {MIN_CHOICE_OPTIONS} options"
        )));
    }
    if kind.is_graded() && question.options.is_empty() {
        return Err(SurveyError::validation(format!(
            "Question \"{text}\" requires at least 1 rating/scale option"
        )));
    }
    if kind == QuestionType::Text && !question.options.is_empty() {
        return Err(SurveyError::validation(format!(
            "Question \"{text}\" is a text question and cannot have options"
        )));
    }

    if question
        .options
        .iter()
        .any(|option| option.chars().count() > OPTION_MAX_CHARS)
    {
        return Err(SurveyError::validation(format!(
            "Option text cannot exceed {OPTION_MAX_CHARS} characters (question \"{text}\")"
        )));
    }
    Ok(())
}

pub fn ensure_unique_orders(questions: &[Question]) -> Result<(), SurveyError> {
    let mut seen = HashSet::with_capacity(questions.len());
    if questions.iter().all(|q| seen.insert(q.order)) {
        Ok(())
    } else {
        Err(SurveyError::validation("Question orders must be unique"))
    }
}

pub fn ensure_unique_ids(questions: &[Question]) -> Result<(), SurveyError> {
    let mut seen = HashSet::with_capacity(questions.len());
    if questions.iter().all(|q| seen.insert(q.id.as_str())) {
        Ok(())
    } else {
        Err(SurveyError::validation("Question ids must be unique"))
    }
}

pub fn normalize_title(raw: &str) -> Result<String, SurveyError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(SurveyError::validation("Title is required"));
    }
    let len = title.chars().count();
    if len < TITLE_MIN_CHARS {
        return Err(SurveyError::validation(format!(
            "Title must be at least {TITLE_MIN_CHARS} characters long"
        )));
    }
    if len > TITLE_MAX_CHARS {
        return Err(SurveyError::validation(format!(
            "Title cannot exceed {TITLE_MAX_CHARS} characters"
        )));
    }
    Ok(title.to_string())
}

pub fn normalize_description(raw: Option<&str>) -> Result<Option<String>, SurveyError> {
    let Some(description) = raw.map(str::trim).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    if description.chars().count() > DESCRIPTION_MAX_CHARS {
        return Err(SurveyError::validation(format!(
            "Description cannot exceed {DESCRIPTION_MAX_CHARS} characters"
        )));
    }
    Ok(Some(description.to_string()))
}

pub fn validate_settings(settings: &Settings) -> Result<(), SurveyError> {
    let limit = settings.response_limit;
    if limit.enabled && !limit.max.is_some_and(|max| max > 0) {
        return Err(SurveyError::validation(
            "Maximum responses must be greater than 0 when response limiting is enabled",
        ));
    }
    Ok(())
}

/// Question-level rules for an already normalized list.
pub fn validate_questions(questions: &[Question]) -> Result<(), SurveyError> {
    if questions.is_empty() {
        return Err(SurveyError::validation("At least one question is required"));
    }
    ensure_unique_orders(questions)?;
    ensure_unique_ids(questions)?;
    for question in questions {
        if question.order < 0 {
            return Err(SurveyError::validation("Order must be a non-negative number"));
        }
        check_question_text(question.text.trim())?;
        check_options(question)?;
    }
    Ok(())
}

/// Runs before every survey write.
pub fn validate_survey(survey: &Survey) -> Result<(), SurveyError> {
    normalize_title(&survey.title)?;
    normalize_description(survey.description.as_deref())?;
    validate_questions(&survey.questions)?;
    validate_settings(&survey.settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn draft(kind: &str, text: &str, options: Option<Vec<&str>>) -> QuestionDraft {
        QuestionDraft {
            id: None,
            question_type: Some(kind.to_string()),
            text: Some(text.to_string()),
            options: options.map(|opts| opts.into_iter().map(String::from).collect()),
            required: false,
        }
    }

    #[test]
    fn test_orders_follow_input_position() {
        let questions = normalize_questions(vec![
            draft("text", "Anything else?", None),
            draft("rating", "Rate us", None),
            draft("single_choice", "Pick one", Some(vec!["yes", "no"])),
        ])
        .unwrap();

        let orders: Vec<i32> = questions.iter().map(|q| q.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert!(ensure_unique_orders(&questions).is_ok());

        let ids: HashSet<&str> = questions.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_round_trip_keeps_content() {
        let input = vec![
            draft("multiple_choice", "Which features?", Some(vec!["Search", "Export", "Sharing"])),
            draft("scale", "How likely?", Some(vec!["0", "1", "2"])),
            draft("text", "Comments", None),
        ];
        let questions = normalize_questions(input.clone()).unwrap();

        assert_eq!(questions.len(), input.len());
        for (index, (question, original)) in questions.iter().zip(&input).enumerate() {
            assert_eq!(Some(question.text.as_str()), original.text.as_deref());
            assert_eq!(Some(question.question_type.as_str()), original.question_type.as_deref());
            assert_eq!(question.options, original.options.clone().unwrap_or_default());
            assert_eq!(question.order, index as i32);
        }
    }

    #[test]
    fn test_choice_needs_two_options() {
        let err = normalize_questions(vec![draft("single_choice", "Favourite colour?", Some(vec!["red"]))])
            .unwrap_err();
        assert_eq!(
            err,
            SurveyError::validation("Question \"Favourite colour?\" requires at least 2 options")
        );

        let err = normalize_questions(vec![draft("multiple_choice", "Toppings?", None)]).unwrap_err();
        assert!(err.to_string().contains("\"Toppings?\""));

        let err = normalize_questions(vec![draft("multiple_choice", "Toppings?", Some(vec!["  ", "ham"]))])
            .unwrap_err();
        assert!(err.to_string().contains("at least 2 options"));
    }

    #[test]
    fn test_rating_and_scale_defaults() {
        let questions = normalize_questions(vec![
            draft("rating", "Rate the venue", None),
            draft("rating", "Rate the food", Some(vec![])),
            draft("scale", "How likely to recommend?", None),
        ])
        .unwrap();

        assert_eq!(questions[0].options, vec!["1", "2", "3", "4", "5"]);
        assert_eq!(questions[1].options, vec!["1", "2", "3", "4", "5"]);
        assert_eq!(questions[2].options.len(), 10);
    }

    #[test]
    fn test_text_options_are_dropped() {
        let questions =
            normalize_questions(vec![draft("text", "Tell us more", Some(vec!["ignored", "also"]))]).unwrap();
        assert!(questions[0].options.is_empty());
    }

    #[test]
    fn test_missing_type_or_text() {
        let err = normalize_questions(vec![
            draft("text", "Fine question", None),
            QuestionDraft {
                question_type: Some("rating".to_string()),
                text: Some("   ".to_string()),
                ..QuestionDraft::default()
            },
        ])
        .unwrap_err();
        assert_eq!(err.to_string(), "Question 2 must have a type and question text");

        let err = normalize_questions(vec![QuestionDraft {
            text: Some("No type here".to_string()),
            ..QuestionDraft::default()
        }])
        .unwrap_err();
        assert_eq!(err.to_string(), "Question 1 must have a type and question text");
    }

    #[test]
    fn test_unknown_type_and_empty_list() {
        let err = normalize_questions(vec![draft("dropdown", "Pick", None)]).unwrap_err();
        assert!(err.to_string().contains("invalid type"));

        let err = normalize_questions(Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "At least one question is required");
    }

    #[test]
    fn test_supplied_ids_kept_and_must_be_unique() {
        let mut first = draft("text", "First one", None);
        first.id = Some("q1".to_string());
        let questions = normalize_questions(vec![first.clone()]).unwrap();
        assert_eq!(questions[0].id, "q1");

        let err = normalize_questions(vec![first.clone(), first]).unwrap_err();
        assert_eq!(err.to_string(), "Question ids must be unique");
    }

    #[test]
    fn test_duplicate_order_fails_before_save() {
        let mut survey = Survey::new_draft(
            Uuid::new_v4(),
            "Quarterly check".to_string(),
            None,
            normalize_questions(vec![
                draft("text", "First question", None),
                draft("text", "Second question", None),
            ])
            .unwrap(),
            Settings::default(),
        );
        assert!(validate_survey(&survey).is_ok());

        survey.questions[1].order = 0;
        assert_eq!(
            validate_survey(&survey),
            Err(SurveyError::validation("Question orders must be unique"))
        );
    }

    #[test]
    fn test_title_and_description_limits() {
        assert_eq!(normalize_title("  Hello  ").unwrap(), "Hello");
        assert_eq!(normalize_title("  ").unwrap_err().to_string(), "Title is required");
        assert!(normalize_title("ab").is_err());
        assert!(normalize_title(&"x".repeat(201)).is_err());

        assert_eq!(normalize_description(Some("   ")).unwrap(), None);
        assert_eq!(normalize_description(Some(" hi ")).unwrap().as_deref(), Some("hi"));
        assert!(normalize_description(Some(&"y".repeat(1001))).is_err());
    }

    #[test]
    fn test_settings_limit_shapes() {
        let from_flag = SettingsInput {
            limit_responses: Some(LegacyLimit::Flag(true)),
            max_responses: Some(50),
            ..SettingsInput::default()
        }
        .apply_to(Settings::default());
        assert_eq!(from_flag.response_limit, ResponseLimit::capped(50));

        let from_cap = SettingsInput {
            limit_responses: Some(LegacyLimit::Cap(20)),
            ..SettingsInput::default()
        }
        .apply_to(Settings::default());
        assert_eq!(from_cap.response_limit, ResponseLimit::capped(20));

        let disabled = SettingsInput {
            limit_responses: Some(LegacyLimit::Cap(0)),
            ..SettingsInput::default()
        }
        .apply_to(from_cap);
        assert_eq!(disabled.response_limit, ResponseLimit::default());

        let parsed: SettingsInput =
            serde_json::from_str(r#"{"requireEmail":true,"responseLimit":{"enabled":true,"max":3}}"#).unwrap();
        let settings = parsed.apply_to(Settings::default());
        assert!(settings.require_email);
        assert!(!settings.allow_anonymous);
        assert_eq!(settings.response_limit, ResponseLimit::capped(3));
    }

    #[test]
    fn test_enabled_limit_requires_positive_max() {
        let settings = SettingsInput {
            limit_responses: Some(LegacyLimit::Flag(true)),
            ..SettingsInput::default()
        }
        .apply_to(Settings::default());
        assert!(validate_settings(&settings).is_err());

        let settings = SettingsInput {
            limit_responses: Some(LegacyLimit::Flag(true)),
            max_responses: Some(0),
            ..SettingsInput::default()
        }
        .apply_to(Settings::default());
        assert!(validate_settings(&settings).is_err());

        assert!(validate_settings(&Settings::default()).is_ok());
    }

    #[test]
    fn test_settings_merge_keeps_absent_fields() {
        let base = Settings {
            allow_anonymous: true,
            require_email: true,
            response_limit: ResponseLimit::capped(10),
        };
        let merged = SettingsInput {
            require_email: Some(false),
            ..SettingsInput::default()
        }
        .apply_to(base);
        assert!(merged.allow_anonymous);
        assert!(!merged.require_email);
        assert_eq!(merged.response_limit, ResponseLimit::capped(10));
    }
}
