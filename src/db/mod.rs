pub mod seed;

use crate::crypto::PiiCipher;
use crate::domain::lifecycle::ResponseRetention;
use crate::domain::models::{
    Analytics, Answer, Question, ResponseMetadata, Settings, Survey, SurveyResponse, SurveyStatus, Template,
    TemplateCategory, UserRole,
};
use crate::domain::schema;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct DbUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub hash: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

pub async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<DbUser>> {
    let user = sqlx::query_as::<_, DbUser>(
        r#"
        SELECT id, name, email, hash, role, created_at
        FROM users
        WHERE email = $1
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn find_user_by_id(pool: &PgPool, id: Uuid) -> Result<Option<DbUser>> {
    let user = sqlx::query_as::<_, DbUser>(
        r#"
        SELECT id, name, email, hash, role, created_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

/// Returns `None` when the email is already registered.
pub async fn insert_user(pool: &PgPool, name: &str, email: &str, hash: &str) -> Result<Option<DbUser>> {
    let user = sqlx::query_as::<_, DbUser>(
        r#"
        INSERT INTO users (id, name, email, hash, role)
        VALUES ($1, $2, $3, $4, 'user')
        ON CONFLICT (email) DO NOTHING
        RETURNING id, name, email, hash, role, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .bind(hash)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

// ---------------------------------------------------------------------------
// Surveys
// ---------------------------------------------------------------------------

#[derive(FromRow)]
struct SurveyRow {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    description: Option<String>,
    questions: Json<Vec<Question>>,
    settings: Json<Settings>,
    status: SurveyStatus,
    total_responses: i64,
    last_response_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SurveyRow> for Survey {
    fn from(row: SurveyRow) -> Self {
        Survey {
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            description: row.description,
            questions: row.questions.0,
            settings: row.settings.0,
            status: row.status,
            analytics: Analytics {
                total_responses: row.total_responses,
                last_response_at: row.last_response_at,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub async fn insert_survey(pool: &PgPool, survey: &Survey) -> Result<()> {
    schema::validate_survey(survey)?;
    sqlx::query(
        r#"
        INSERT INTO surveys
            (id, owner_id, title, description, questions, settings, status,
             total_responses, last_response_at, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(survey.id)
    .bind(survey.owner_id)
    .bind(&survey.title)
    .bind(&survey.description)
    .bind(Json(&survey.questions))
    .bind(Json(&survey.settings))
    .bind(survey.status)
    .bind(survey.analytics.total_responses)
    .bind(survey.analytics.last_response_at)
    .bind(survey.created_at)
    .bind(survey.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_surveys_by_owner(pool: &PgPool, owner_id: Uuid) -> Result<Vec<Survey>> {
    let rows = sqlx::query_as::<_, SurveyRow>(
        r#"
        SELECT id, owner_id, title, description, questions, settings, status,
               total_responses, last_response_at, created_at, updated_at
        FROM surveys
        WHERE owner_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Survey::from).collect())
}

pub async fn find_survey(pool: &PgPool, id: Uuid) -> Result<Option<Survey>> {
    let row = sqlx::query_as::<_, SurveyRow>(
        r#"
        SELECT id, owner_id, title, description, questions, settings, status,
               total_responses, last_response_at, created_at, updated_at
        FROM surveys
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Survey::from))
}

/// A survey the caller owns. Someone else's survey reads as missing.
pub async fn find_owned_survey(pool: &PgPool, id: Uuid, owner_id: Uuid) -> Result<Option<Survey>> {
    Ok(find_survey(pool, id).await?.filter(|s| s.owner_id == owner_id))
}

/// Loads the survey with a row lock held until the surrounding transaction ends.
/// Every writer that touches responses or analytics goes through this first.
pub async fn lock_survey(conn: &mut PgConnection, id: Uuid) -> Result<Option<Survey>> {
    let row = sqlx::query_as::<_, SurveyRow>(
        r#"
        SELECT id, owner_id, title, description, questions, settings, status,
               total_responses, last_response_at, created_at, updated_at
        FROM surveys
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(Survey::from))
}

/// Writes the author-editable fields and bumps `updated_at`. Analytics are
/// left to `update_analytics`.
pub async fn save_survey(conn: &mut PgConnection, survey: &mut Survey) -> Result<()> {
    schema::validate_survey(survey)?;
    survey.updated_at = Utc::now();
    sqlx::query(
        r#"
        UPDATE surveys
        SET title = $2, description = $3, questions = $4, settings = $5, status = $6, updated_at = $7
        WHERE id = $1
        "#,
    )
    .bind(survey.id)
    .bind(&survey.title)
    .bind(&survey.description)
    .bind(Json(&survey.questions))
    .bind(Json(&survey.settings))
    .bind(survey.status)
    .bind(survey.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn update_analytics(conn: &mut PgConnection, survey_id: Uuid, analytics: &Analytics) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE surveys
        SET total_responses = $2, last_response_at = $3
        WHERE id = $1
        "#,
    )
    .bind(survey_id)
    .bind(analytics.total_responses)
    .bind(analytics.last_response_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Deletes an owned survey. Returns `None` when there was nothing to delete,
/// otherwise how many responses were removed with it.
pub async fn delete_survey(
    pool: &PgPool,
    id: Uuid,
    owner_id: Uuid,
    retention: ResponseRetention,
) -> Result<Option<u64>> {
    let mut tx = pool.begin().await?;

    let deleted = sqlx::query("DELETE FROM surveys WHERE id = $1 AND owner_id = $2")
        .bind(id)
        .bind(owner_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Ok(None);
    }

    let removed = match retention {
        ResponseRetention::Delete => sqlx::query("DELETE FROM responses WHERE survey_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected(),
        ResponseRetention::Keep => 0,
    };

    tx.commit().await?;
    Ok(Some(removed))
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(FromRow)]
struct ResponseRow {
    id: Uuid,
    survey_id: Uuid,
    answers: Json<Vec<Answer>>,
    enc_email: Option<String>,
    user_agent: Option<String>,
    enc_ip: Option<String>,
    created_at: DateTime<Utc>,
}

impl ResponseRow {
    fn open(self, cipher: &PiiCipher) -> SurveyResponse {
        SurveyResponse {
            id: self.id,
            survey_id: self.survey_id,
            answers: self.answers.0,
            email: cipher.open_lossy(self.enc_email.as_deref(), "email"),
            metadata: ResponseMetadata {
                user_agent: self.user_agent,
                ip: cipher.open_lossy(self.enc_ip.as_deref(), "ip"),
            },
            submitted_at: self.created_at,
        }
    }
}

pub async fn count_responses(conn: &mut PgConnection, survey_id: Uuid) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM responses WHERE survey_id = $1")
        .bind(survey_id)
        .fetch_one(conn)
        .await?;
    Ok(count)
}

/// Email and IP are sealed before they reach the table.
pub async fn insert_response(conn: &mut PgConnection, cipher: &PiiCipher, response: &SurveyResponse) -> Result<()> {
    let enc_email = cipher.seal_opt(response.email.as_deref())?;
    let enc_ip = cipher.seal_opt(response.metadata.ip.as_deref())?;
    sqlx::query(
        r#"
        INSERT INTO responses (id, survey_id, answers, enc_email, user_agent, enc_ip, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(response.id)
    .bind(response.survey_id)
    .bind(Json(&response.answers))
    .bind(enc_email)
    .bind(&response.metadata.user_agent)
    .bind(enc_ip)
    .bind(response.submitted_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn list_responses(pool: &PgPool, cipher: &PiiCipher, survey_id: Uuid) -> Result<Vec<SurveyResponse>> {
    let rows = sqlx::query_as::<_, ResponseRow>(
        r#"
        SELECT id, survey_id, answers, enc_email, user_agent, enc_ip, created_at
        FROM responses
        WHERE survey_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(survey_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|row| row.open(cipher)).collect())
}

pub async fn delete_response(conn: &mut PgConnection, survey_id: Uuid, response_id: Uuid) -> Result<bool> {
    let deleted = sqlx::query("DELETE FROM responses WHERE id = $1 AND survey_id = $2")
        .bind(response_id)
        .bind(survey_id)
        .execute(conn)
        .await?
        .rows_affected();
    Ok(deleted > 0)
}

/// Recomputes one owned survey's analytics from its responses.
pub async fn reconcile_analytics(pool: &PgPool, survey_id: Uuid, owner_id: Uuid) -> Result<Option<Analytics>> {
    let row: Option<(i64, Option<DateTime<Utc>>)> = sqlx::query_as(
        r#"
        UPDATE surveys s
        SET total_responses = c.total, last_response_at = c.last_at
        FROM (
            SELECT COUNT(*) AS total, MAX(created_at) AS last_at
            FROM responses
            WHERE survey_id = $1
        ) c
        WHERE s.id = $1 AND s.owner_id = $2
        RETURNING s.total_responses, s.last_response_at
        "#,
    )
    .bind(survey_id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(total, last)| Analytics::reconciled(total, last)))
}

/// Repairs every survey whose stored analytics disagree with its responses.
/// Returns the number of surveys corrected.
pub async fn reconcile_all_analytics(pool: &PgPool) -> Result<u64> {
    let fixed = sqlx::query(
        r#"
        WITH counts AS (
            SELECT s.id, COUNT(r.id) AS total, MAX(r.created_at) AS last_at
            FROM surveys s
            LEFT JOIN responses r ON r.survey_id = s.id
            GROUP BY s.id
        )
        UPDATE surveys s
        SET total_responses = counts.total, last_response_at = counts.last_at
        FROM counts
        WHERE s.id = counts.id
          AND (s.total_responses <> counts.total
               OR s.last_response_at IS DISTINCT FROM counts.last_at)
        "#,
    )
    .execute(pool)
    .await?
    .rows_affected();
    Ok(fixed)
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[derive(FromRow)]
struct TemplateRow {
    id: Uuid,
    name: String,
    description: String,
    category: TemplateCategory,
    questions: Json<Vec<Question>>,
    settings: Json<Settings>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TemplateRow> for Template {
    fn from(row: TemplateRow) -> Self {
        Template {
            id: row.id,
            name: row.name,
            description: row.description,
            category: row.category,
            questions: row.questions.0,
            settings: row.settings.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub async fn list_templates(pool: &PgPool) -> Result<Vec<Template>> {
    let rows = sqlx::query_as::<_, TemplateRow>(
        r#"
        SELECT id, name, description, category, questions, settings, created_at, updated_at
        FROM templates
        ORDER BY category::text, name
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Template::from).collect())
}

pub async fn find_template(pool: &PgPool, id: Uuid) -> Result<Option<Template>> {
    let row = sqlx::query_as::<_, TemplateRow>(
        r#"
        SELECT id, name, description, category, questions, settings, created_at, updated_at
        FROM templates
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(Template::from))
}

/// Returns `false` when a template with the same name already exists.
pub async fn insert_template(pool: &PgPool, template: &Template) -> Result<bool> {
    schema::validate_questions(&template.questions)?;
    schema::validate_settings(&template.settings)?;
    let inserted = sqlx::query(
        r#"
        INSERT INTO templates (id, name, description, category, questions, settings, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (name) DO NOTHING
        "#,
    )
    .bind(template.id)
    .bind(&template.name)
    .bind(&template.description)
    .bind(template.category)
    .bind(Json(&template.questions))
    .bind(Json(&template.settings))
    .bind(template.created_at)
    .bind(template.updated_at)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(inserted > 0)
}
