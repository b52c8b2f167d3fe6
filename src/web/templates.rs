use crate::db;
use crate::domain::models::{Settings, Survey, Template, TemplateCategory};
use crate::domain::schema::{self, QuestionDraft, SettingsInput};
use crate::error::{parse_id, ApiError, ApiJson};
use crate::state::SharedState;
use crate::web::session::UserSession;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct CreateTemplateRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: Option<TemplateCategory>,
    #[serde(default)]
    pub questions: Vec<QuestionDraft>,
    #[serde(default)]
    pub settings: Option<SettingsInput>,
}

#[derive(Deserialize, Default)]
pub struct UseTemplateRequest {
    pub title: Option<String>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_templates).post(create_template))
        .route("/:id", get(get_template))
        .route("/:id/surveys", post(create_survey_from_template))
        .with_state(state)
}

async fn find_template(state: &SharedState, raw_id: &str) -> Result<Template, ApiError> {
    let id = parse_id(raw_id, "template")?;
    db::find_template(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("Template"))
}

async fn list_templates(_session: UserSession, State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let templates = db::list_templates(&state.pool).await?;
    Ok(Json(json!({ "templates": templates })))
}

async fn get_template(
    _session: UserSession,
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let template = find_template(&state, &id).await?;
    Ok(Json(json!({ "template": template })))
}

async fn create_template(
    session: UserSession,
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<CreateTemplateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    session.require_admin()?;

    let name = payload.name.trim();
    let description = payload.description.trim();
    let (false, false, Some(category)) = (name.is_empty(), description.is_empty(), payload.category) else {
        return Err(ApiError::BadRequest(
            "Name, description, and category are required".to_string(),
        ));
    };

    let questions = schema::normalize_questions(payload.questions)?;
    let settings = payload
        .settings
        .map(|input| input.apply_to(Settings::default()))
        .unwrap_or_default();
    schema::validate_settings(&settings)?;

    let now = Utc::now();
    let template = Template {
        id: Uuid::new_v4(),
        name: name.to_string(),
        description: description.to_string(),
        category,
        questions,
        settings,
        created_at: now,
        updated_at: now,
    };
    if !db::insert_template(&state.pool, &template).await? {
        return Err(ApiError::Conflict("A template with this name already exists".to_string()));
    }

    tracing::info!("Template {} ({}) created by {}", template.id, template.name, session.user_id);
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Template created successfully", "template": template })),
    ))
}

/// Copies the template's questions into a fresh draft owned by the caller.
/// Question ids are regenerated so the survey never shares them.
async fn create_survey_from_template(
    session: UserSession,
    State(state): State<SharedState>,
    Path(id): Path<String>,
    payload: Option<ApiJson<UseTemplateRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let template = find_template(&state, &id).await?;
    let request = payload.map(|ApiJson(p)| p).unwrap_or_default();

    let title = schema::normalize_title(request.title.as_deref().unwrap_or(&template.name))?;
    let drafts = template
        .questions
        .iter()
        .map(|question| QuestionDraft {
            id: None,
            ..QuestionDraft::from(question)
        })
        .collect();
    let questions = schema::normalize_questions(drafts)?;

    let survey = Survey::new_draft(
        session.user_id,
        title,
        schema::normalize_description(Some(&template.description))?,
        questions,
        template.settings,
    );
    db::insert_survey(&state.pool, &survey).await?;

    tracing::info!("Survey {} created from template {} by {}", survey.id, template.id, session.user_id);
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Survey created successfully", "survey": survey })),
    ))
}
