use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }
}

impl TryFrom<&str> for UserRole {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(UserRole::User),
            "admin" => Ok(UserRole::Admin),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Text,
    MultipleChoice,
    SingleChoice,
    Rating,
    Scale,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Text => "text",
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::SingleChoice => "single_choice",
            QuestionType::Rating => "rating",
            QuestionType::Scale => "scale",
        }
    }

    pub fn is_choice(&self) -> bool {
        matches!(self, QuestionType::MultipleChoice | QuestionType::SingleChoice)
    }

    pub fn is_graded(&self) -> bool {
        matches!(self, QuestionType::Rating | QuestionType::Scale)
    }

    /// Options a rating or scale question gets when the author leaves them out.
    pub fn default_options(&self) -> Vec<String> {
        let upper = match self {
            QuestionType::Rating => 5,
            QuestionType::Scale => 10,
            _ => return Vec::new(),
        };
        (1..=upper).map(|n: u32| n.to_string()).collect()
    }
}

impl TryFrom<&str> for QuestionType {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "text" => Ok(QuestionType::Text),
            "multiple_choice" => Ok(QuestionType::MultipleChoice),
            "single_choice" => Ok(QuestionType::SingleChoice),
            "rating" => Ok(QuestionType::Rating),
            "scale" => Ok(QuestionType::Scale),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(rename = "question")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default)]
    pub required: bool,
    pub order: i32,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseLimit {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
}

impl ResponseLimit {
    pub fn capped(max: i64) -> Self {
        Self {
            enabled: true,
            max: Some(max),
        }
    }

    pub fn is_reached(&self, stored_responses: i64) -> bool {
        match (self.enabled, self.max) {
            (true, Some(max)) => stored_responses >= max,
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub allow_anonymous: bool,
    #[serde(default)]
    pub require_email: bool,
    #[serde(default)]
    pub response_limit: ResponseLimit,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "survey_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SurveyStatus {
    #[default]
    Draft,
    Published,
    Closed,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total_responses: i64,
    pub last_response_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Survey {
    pub id: Uuid,
    #[serde(rename = "createdBy")]
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub questions: Vec<Question>,
    pub settings: Settings,
    pub status: SurveyStatus,
    pub analytics: Analytics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Survey {
    pub fn new_draft(
        owner_id: Uuid,
        title: String,
        description: Option<String>,
        questions: Vec<Question>,
        settings: Settings,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            title,
            description,
            questions,
            settings,
            status: SurveyStatus::Draft,
            analytics: Analytics::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_id: String,
    pub answer: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyResponse {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub answers: Vec<Answer>,
    pub email: Option<String>,
    pub metadata: ResponseMetadata,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "template_category", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TemplateCategory {
    CustomerSatisfaction,
    EmployeeFeedback,
    MarketResearch,
    ProductFeedback,
    Nps,
    EventFeedback,
    UserExperience,
    TrainingEvaluation,
    Demographic,
    ExitSurvey,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category: TemplateCategory,
    pub questions: Vec<Question>,
    pub settings: Settings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
