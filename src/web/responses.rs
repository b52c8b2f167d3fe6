use crate::db;
use crate::domain::aggregate::{self, AnnotatedAnswer};
use crate::domain::lifecycle;
use crate::domain::models::{ResponseMetadata, SurveyResponse};
use crate::domain::submission::{self, SubmissionDraft};
use crate::error::{parse_id, ApiError, ApiJson};
use crate::middleware::client_ip;
use crate::state::SharedState;
use crate::web::session::UserSession;
use crate::web::surveys::owned_survey;
use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use uuid::Uuid;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseView {
    pub id: Uuid,
    pub answers: Vec<AnnotatedAnswer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub metadata: ResponseMetadata,
    pub submitted_at: DateTime<Utc>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/:id/responses", post(submit_response).get(list_responses))
        .route("/:id/responses/:response_id", delete(delete_response))
        .route("/:id/summary", get(survey_summary))
        .route("/:id/analytics/reconcile", post(reconcile_analytics))
        .with_state(state)
}

fn request_metadata(headers: &HeaderMap, ip: String) -> ResponseMetadata {
    ResponseMetadata {
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        ip: Some(ip),
    }
}

/// Public submission. The survey row stays locked from the limit check until
/// the response and the new analytics are committed.
async fn submit_response(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    ApiJson(draft): ApiJson<SubmissionDraft>,
) -> Result<impl IntoResponse, ApiError> {
    let survey_id = parse_id(&id, "survey")?;

    let ip = client_ip(addr, &headers, state.trust_proxy);
    if !state.submit_limiter.check(&ip).await {
        tracing::warn!("Submission rate limit exceeded for IP: {}", ip);
        return Err(ApiError::TooManyRequests);
    }
    let metadata = request_metadata(&headers, ip);

    let mut tx = state.pool.begin().await?;
    let survey = db::lock_survey(&mut *tx, survey_id)
        .await?
        .ok_or(ApiError::NotFound("Survey"))?;
    let stored = db::count_responses(&mut *tx, survey_id).await?;

    let accepted = submission::validate_submission(&survey, stored, draft, metadata)?;

    let now = Utc::now();
    let response = SurveyResponse {
        id: Uuid::new_v4(),
        survey_id,
        answers: accepted.answers,
        email: accepted.email,
        metadata: accepted.metadata,
        submitted_at: now,
    };
    db::insert_response(&mut *tx, &state.cipher, &response).await?;

    let analytics = lifecycle::record_submission(&survey, stored, now)?;
    db::update_analytics(&mut *tx, survey_id, &analytics).await?;
    tx.commit().await?;

    tracing::info!(
        "Response {} recorded for survey {} ({} total)",
        response.id,
        survey_id,
        analytics.total_responses
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Response submitted successfully",
            "response": { "id": response.id },
        })),
    ))
}

async fn list_responses(
    session: UserSession,
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let survey = owned_survey(&state, &session, &id).await?;
    let responses = db::list_responses(&state.pool, &state.cipher, survey.id).await?;

    let summary = aggregate::summarize(&survey.questions, &responses);
    let views: Vec<ResponseView> = responses
        .iter()
        .map(|response| ResponseView {
            id: response.id,
            answers: aggregate::annotate(&survey.questions, response),
            email: response.email.clone(),
            metadata: response.metadata.clone(),
            submitted_at: response.submitted_at,
        })
        .collect();

    Ok(Json(json!({
        "responses": views,
        "survey": {
            "id": survey.id,
            "title": survey.title,
            "description": survey.description,
            "totalResponses": survey.analytics.total_responses,
            "lastResponseAt": survey.analytics.last_response_at,
        },
        "summary": summary,
    })))
}

async fn survey_summary(
    session: UserSession,
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let survey = owned_survey(&state, &session, &id).await?;
    let responses = db::list_responses(&state.pool, &state.cipher, survey.id).await?;
    Ok(Json(json!({ "summary": aggregate::summarize(&survey.questions, &responses) })))
}

async fn delete_response(
    session: UserSession,
    State(state): State<SharedState>,
    Path((id, response_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let survey_id = parse_id(&id, "survey")?;
    let response_id = parse_id(&response_id, "response")?;

    let mut tx = state.pool.begin().await?;
    let mut survey = db::lock_survey(&mut *tx, survey_id)
        .await?
        .filter(|s| s.owner_id == session.user_id)
        .ok_or(ApiError::NotFound("Survey"))?;

    if !db::delete_response(&mut *tx, survey_id, response_id).await? {
        return Err(ApiError::NotFound("Response"));
    }
    survey.analytics.remove_response();
    db::update_analytics(&mut *tx, survey_id, &survey.analytics).await?;
    tx.commit().await?;

    tracing::info!("Response {} deleted from survey {}", response_id, survey_id);
    Ok(Json(json!({
        "message": "Response deleted successfully",
        "analytics": survey.analytics,
    })))
}

async fn reconcile_analytics(
    session: UserSession,
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let survey = owned_survey(&state, &session, &id).await?;
    let analytics = db::reconcile_analytics(&state.pool, survey.id, session.user_id)
        .await?
        .ok_or(ApiError::NotFound("Survey"))?;
    tracing::info!(
        "Analytics reconciled for survey {}: {} responses (drift {})",
        survey.id,
        analytics.total_responses,
        survey.analytics.drift(analytics.total_responses)
    );
    Ok(Json(json!({ "analytics": analytics })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_request_metadata() {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.4"));

        let metadata = request_metadata(&headers, "203.0.113.9".to_string());
        assert_eq!(metadata.user_agent.as_deref(), Some("curl/8.4"));
        assert_eq!(metadata.ip.as_deref(), Some("203.0.113.9"));

        let bare = request_metadata(&HeaderMap::new(), "192.0.2.1".to_string());
        assert_eq!(bare.user_agent, None);
    }
}
