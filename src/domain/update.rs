use crate::domain::lifecycle::{self, StatusChange};
use crate::domain::models::{Survey, SurveyStatus};
use crate::domain::schema::{self, QuestionDraft, SettingsInput};
use crate::domain::SurveyError;
use serde::{Deserialize, Deserializer};

/// Partial survey update as sent by the editor. An explicit `"description":
/// null` clears the description; an absent field leaves it alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SurveyPatch {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    pub settings: Option<SettingsInput>,
    pub status: Option<SurveyStatus>,
    pub questions: Option<Vec<QuestionDraft>>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone)]
pub enum SurveyChange {
    Title(String),
    Description(Option<String>),
    Settings(SettingsInput),
    Status(SurveyStatus),
    Questions(Vec<QuestionDraft>),
}

impl SurveyPatch {
    pub fn into_changes(self) -> Vec<SurveyChange> {
        let mut changes = Vec::new();
        if let Some(title) = self.title {
            changes.push(SurveyChange::Title(title));
        }
        if let Some(description) = self.description {
            changes.push(SurveyChange::Description(description));
        }
        if let Some(settings) = self.settings {
            changes.push(SurveyChange::Settings(settings));
        }
        if let Some(questions) = self.questions {
            changes.push(SurveyChange::Questions(questions));
        }
        if let Some(status) = self.status {
            changes.push(SurveyChange::Status(status));
        }
        changes
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppliedChanges {
    pub status: Option<StatusChange>,
    pub questions_replaced: bool,
}

/// Applies `changes` in order and re-checks the whole survey. On error the
/// survey may be partially modified and must not be saved.
pub fn apply_changes(survey: &mut Survey, changes: Vec<SurveyChange>) -> Result<AppliedChanges, SurveyError> {
    let mut applied = AppliedChanges::default();
    for change in changes {
        match change {
            SurveyChange::Title(raw) => survey.title = schema::normalize_title(&raw)?,
            SurveyChange::Description(raw) => {
                survey.description = schema::normalize_description(raw.as_deref())?
            }
            SurveyChange::Settings(input) => survey.settings = input.apply_to(survey.settings),
            SurveyChange::Status(status) => {
                applied.status = Some(lifecycle::transition(survey, status));
            }
            SurveyChange::Questions(drafts) => {
                survey.questions = schema::normalize_questions(drafts)?;
                applied.questions_replaced = true;
            }
        }
    }
    schema::validate_survey(survey)?;
    Ok(applied)
}

/// Edit of a single question field, `{"field": "...", "value": ...}` on the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum QuestionChange {
    Question(String),
    Type(String),
    Options(Vec<String>),
    Required(bool),
}

/// Rewrites one question and renormalizes the list, so ids and positions of
/// every question are kept and type rules are enforced again.
pub fn apply_question_change(
    survey: &mut Survey,
    question_id: &str,
    change: QuestionChange,
) -> Result<(), SurveyError> {
    let mut drafts: Vec<QuestionDraft> = survey.questions.iter().map(QuestionDraft::from).collect();
    let target = drafts
        .iter_mut()
        .find(|d| d.id.as_deref() == Some(question_id))
        .ok_or_else(|| SurveyError::UnknownQuestion(question_id.to_string()))?;

    match change {
        QuestionChange::Question(text) => target.text = Some(text),
        QuestionChange::Type(kind) => target.question_type = Some(kind),
        QuestionChange::Options(options) => target.options = Some(options),
        QuestionChange::Required(required) => target.required = required,
    }

    survey.questions = schema::normalize_questions(drafts)?;
    schema::validate_survey(survey)
}
