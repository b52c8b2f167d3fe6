use crate::db;
use crate::domain::models::{QuestionType, ResponseLimit, Settings, Template, TemplateCategory};
use crate::domain::schema::{self, QuestionDraft};
use anyhow::Result;
use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2,
};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

struct SeedTemplate<'a> {
    name: &'a str,
    description: &'a str,
    category: TemplateCategory,
    questions: Vec<SeedQuestion<'a>>,
    settings: Settings,
}

struct SeedQuestion<'a> {
    kind: QuestionType,
    text: &'a str,
    options: &'a [&'a str],
    required: bool,
}

const fn ask<'a>(kind: QuestionType, text: &'a str, options: &'a [&'a str], required: bool) -> SeedQuestion<'a> {
    SeedQuestion {
        kind,
        text,
        options,
        required,
    }
}

pub struct AdminSeed<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

pub async fn seed_all(pool: &PgPool, admin: Option<AdminSeed<'_>>) -> Result<()> {
    seed_templates(pool).await?;
    if let Some(admin) = admin {
        seed_admin(pool, admin).await?;
    }
    Ok(())
}

/// Creates the admin account, or promotes an existing user with that email.
async fn seed_admin(pool: &PgPool, admin: AdminSeed<'_>) -> Result<()> {
    let salt = SaltString::generate(rand_core::OsRng);
    let hash = Argon2::default()
        .hash_password(admin.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    let email = admin.email.trim().to_lowercase();
    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, hash, role)
        VALUES ($1, $2, $3, $4, 'admin')
        ON CONFLICT (email) DO UPDATE SET role = 'admin'
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(admin.name)
    .bind(&email)
    .bind(hash)
    .execute(pool)
    .await?;
    tracing::info!("Admin account ensured for {}", email);
    Ok(())
}

fn builtin_templates() -> Vec<SeedTemplate<'static>> {
    use QuestionType::*;
    const AGREEMENT: &[&str] = &["Strongly disagree", "Disagree", "Neutral", "Agree", "Strongly agree"];

    vec![
        SeedTemplate {
            name: "Customer Satisfaction",
            description: "Measure how happy customers are with your product or service.",
            category: TemplateCategory::CustomerSatisfaction,
            questions: vec![
                ask(Rating, "How satisfied are you with our service overall?", &[], true),
                ask(SingleChoice, "How likely are you to buy from us again?", &["Very likely", "Maybe", "Unlikely"], true),
                ask(MultipleChoice, "What did you like most?", &["Quality", "Price", "Support", "Delivery speed"], false),
                ask(Text, "What could we do better?", &[], false),
            ],
            settings: Settings {
                allow_anonymous: true,
                ..Settings::default()
            },
        },
        SeedTemplate {
            name: "Employee Engagement",
            description: "Understand how engaged and supported your team feels.",
            category: TemplateCategory::EmployeeFeedback,
            questions: vec![
                ask(SingleChoice, "I feel valued at work.", AGREEMENT, true),
                ask(SingleChoice, "I have the tools I need to do my job well.", AGREEMENT, true),
                ask(Scale, "How would you rate your work-life balance?", &[], true),
                ask(Text, "What is one thing leadership should change?", &[], false),
            ],
            settings: Settings {
                allow_anonymous: true,
                ..Settings::default()
            },
        },
        SeedTemplate {
            name: "Net Promoter Score",
            description: "The classic single-question loyalty survey with a follow-up.",
            category: TemplateCategory::Nps,
            questions: vec![
                ask(
                    Scale,
                    "How likely are you to recommend us to a friend or colleague?",
                    &["0", "1", "2", "3", "4", "5", "6", "7", "8", "9", "10"],
                    true,
                ),
                ask(Text, "What is the main reason for your score?", &[], false),
            ],
            settings: Settings::default(),
        },
        SeedTemplate {
            name: "Event Feedback",
            description: "Collect attendee impressions right after an event.",
            category: TemplateCategory::EventFeedback,
            questions: vec![
                ask(Rating, "How would you rate the event overall?", &[], true),
                ask(MultipleChoice, "Which sessions did you attend?", &["Keynote", "Workshops", "Panel", "Networking"], false),
                ask(SingleChoice, "Was the event length right?", &["Too short", "About right", "Too long"], true),
                ask(Text, "Any suggestions for next time?", &[], false),
            ],
            settings: Settings {
                allow_anonymous: true,
                ..Settings::default()
            },
        },
        SeedTemplate {
            name: "Product Feedback",
            description: "Learn which features matter and where the product falls short.",
            category: TemplateCategory::ProductFeedback,
            questions: vec![
                ask(SingleChoice, "How often do you use the product?", &["Daily", "Weekly", "Monthly", "Rarely"], true),
                ask(MultipleChoice, "Which features do you use most?", &["Dashboard", "Reports", "Integrations", "Mobile app"], false),
                ask(Rating, "How easy is the product to use?", &[], true),
                ask(Text, "Which feature should we build next?", &[], false),
            ],
            settings: Settings {
                require_email: true,
                ..Settings::default()
            },
        },
        SeedTemplate {
            name: "Training Evaluation",
            description: "Evaluate a course or workshop from the participant's view.",
            category: TemplateCategory::TrainingEvaluation,
            questions: vec![
                ask(Rating, "How useful was the training?", &[], true),
                ask(SingleChoice, "The trainer explained topics clearly.", AGREEMENT, true),
                ask(Text, "What will you apply in your work?", &[], false),
            ],
            settings: Settings {
                response_limit: ResponseLimit::capped(500),
                ..Settings::default()
            },
        },
    ]
}

impl SeedTemplate<'_> {
    fn build(self) -> Result<Template> {
        let drafts = self
            .questions
            .iter()
            .map(|q| QuestionDraft {
                id: None,
                question_type: Some(q.kind.as_str().to_string()),
                text: Some(q.text.to_string()),
                options: Some(q.options.iter().map(|o| o.to_string()).collect()),
                required: q.required,
            })
            .collect();
        let now = Utc::now();
        Ok(Template {
            id: Uuid::new_v4(),
            name: self.name.to_string(),
            description: self.description.to_string(),
            category: self.category,
            questions: schema::normalize_questions(drafts)?,
            settings: self.settings,
            created_at: now,
            updated_at: now,
        })
    }
}

async fn seed_templates(pool: &PgPool) -> Result<()> {
    let mut created = 0;
    for template in builtin_templates() {
        if db::insert_template(pool, &template.build()?).await? {
            created += 1;
        }
    }
    tracing::info!("Seeded {} built-in templates", created);
    Ok(())
}
