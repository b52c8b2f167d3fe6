use crate::db;
use crate::domain::lifecycle::ResponseRetention;
use crate::domain::models::{Question, Settings, Survey, SurveyStatus};
use crate::domain::schema::{self, QuestionDraft, SettingsInput};
use crate::domain::update::{self, QuestionChange, SurveyPatch};
use crate::domain::SurveyError;
use crate::error::{parse_id, ApiError, ApiJson, ApiQuery};
use crate::state::SharedState;
use crate::web::session::UserSession;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct CreateSurveyRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub questions: Vec<QuestionDraft>,
    #[serde(default)]
    pub settings: Option<SettingsInput>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyListItem {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub settings: Settings,
    pub status: SurveyStatus,
    pub total_responses: i64,
    pub created_at: DateTime<Utc>,
}

impl From<Survey> for SurveyListItem {
    fn from(survey: Survey) -> Self {
        Self {
            id: survey.id,
            title: survey.title,
            description: survey.description,
            settings: survey.settings,
            status: survey.status,
            total_responses: survey.analytics.total_responses,
            created_at: survey.created_at,
        }
    }
}

/// What respondents see: no owner, no analytics.
#[derive(Serialize)]
pub struct PublicSurvey {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub questions: Vec<Question>,
    pub settings: Settings,
}

#[derive(Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub responses: ResponseRetention,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_surveys).post(create_survey))
        .route("/:id", get(get_survey).put(update_survey).delete(delete_survey))
        .route("/:id/questions/:question_id", patch(update_question))
        .route("/:id/public", get(public_survey))
        .with_state(state)
}

/// Loads a survey owned by the caller; anything else is reported as missing.
pub(crate) async fn owned_survey(state: &SharedState, session: &UserSession, raw_id: &str) -> Result<Survey, ApiError> {
    let id = parse_id(raw_id, "survey")?;
    db::find_owned_survey(&state.pool, id, session.user_id)
        .await?
        .ok_or(ApiError::NotFound("Survey"))
}

async fn create_survey(
    session: UserSession,
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<CreateSurveyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = schema::normalize_title(&payload.title)?;
    let description = schema::normalize_description(payload.description.as_deref())?;
    let questions = schema::normalize_questions(payload.questions)?;
    let settings = payload
        .settings
        .map(|input| input.apply_to(Settings::default()))
        .unwrap_or_default();

    let survey = Survey::new_draft(session.user_id, title, description, questions, settings);
    db::insert_survey(&state.pool, &survey).await?;

    tracing::info!(
        "Survey {} created by {} with {} questions",
        survey.id,
        session.user_id,
        survey.questions.len()
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Survey created successfully", "survey": survey })),
    ))
}

async fn list_surveys(session: UserSession, State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let surveys: Vec<SurveyListItem> = db::list_surveys_by_owner(&state.pool, session.user_id)
        .await?
        .into_iter()
        .map(SurveyListItem::from)
        .collect();
    Ok(Json(json!({ "surveys": surveys })))
}

async fn get_survey(
    session: UserSession,
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let survey = owned_survey(&state, &session, &id).await?;
    Ok(Json(json!({ "survey": survey })))
}

async fn update_survey(
    session: UserSession,
    State(state): State<SharedState>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<SurveyPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "survey")?;

    let mut tx = state.pool.begin().await?;
    let mut survey = db::lock_survey(&mut *tx, id)
        .await?
        .filter(|s| s.owner_id == session.user_id)
        .ok_or(ApiError::NotFound("Survey"))?;

    let applied = update::apply_changes(&mut survey, patch.into_changes())?;
    db::save_survey(&mut *tx, &mut survey).await?;
    tx.commit().await?;

    if let Some(change) = applied.status.filter(|c| !c.is_noop()) {
        tracing::info!(
            "Survey {} status changed: {} -> {}",
            survey.id,
            change.from.as_str(),
            change.to.as_str()
        );
    }
    if applied.questions_replaced {
        tracing::info!("Survey {} questions replaced ({} total)", survey.id, survey.questions.len());
    }

    Ok(Json(json!({ "message": "Survey updated successfully", "survey": survey })))
}

async fn update_question(
    session: UserSession,
    State(state): State<SharedState>,
    Path((id, question_id)): Path<(String, String)>,
    ApiJson(change): ApiJson<QuestionChange>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "survey")?;

    let mut tx = state.pool.begin().await?;
    let mut survey = db::lock_survey(&mut *tx, id)
        .await?
        .filter(|s| s.owner_id == session.user_id)
        .ok_or(ApiError::NotFound("Survey"))?;

    update::apply_question_change(&mut survey, &question_id, change)?;
    db::save_survey(&mut *tx, &mut survey).await?;
    tx.commit().await?;

    let question = survey
        .question(&question_id)
        .cloned()
        .ok_or_else(|| SurveyError::UnknownQuestion(question_id.clone()))?;
    Ok(Json(json!({ "message": "Question updated successfully", "question": question })))
}

async fn delete_survey(
    session: UserSession,
    State(state): State<SharedState>,
    Path(id): Path<String>,
    ApiQuery(params): ApiQuery<DeleteParams>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "survey")?;
    let retention = params.responses;

    let removed = db::delete_survey(&state.pool, id, session.user_id, retention)
        .await?
        .ok_or(ApiError::NotFound("Survey"))?;

    tracing::info!(
        "Survey {} deleted by {} ({:?} responses, {} removed)",
        id,
        session.user_id,
        retention,
        removed
    );
    Ok(Json(json!({ "message": "Survey deleted successfully", "responsesDeleted": removed })))
}

async fn public_survey(State(state): State<SharedState>, Path(id): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id, "survey")?;
    let survey = db::find_survey(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("Survey"))?;
    if !survey.status.accepts_responses() {
        return Err(SurveyError::NotAcceptingResponses(survey.status).into());
    }

    let survey = PublicSurvey {
        id: survey.id,
        title: survey.title,
        description: survey.description,
        questions: survey.questions,
        settings: survey.settings,
    };
    Ok(Json(json!({ "survey": survey })))
}
