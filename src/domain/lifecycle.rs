use crate::domain::models::{Analytics, Survey, SurveyStatus};
use crate::domain::SurveyError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

impl SurveyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SurveyStatus::Draft => "draft",
            SurveyStatus::Published => "published",
            SurveyStatus::Closed => "closed",
        }
    }

    /// Only published surveys take submissions.
    pub fn accepts_responses(&self) -> bool {
        matches!(self, SurveyStatus::Published)
    }

    pub fn rejection_message(&self) -> &'static str {
        match self {
            SurveyStatus::Draft => "This survey is not published yet",
            SurveyStatus::Closed => "This survey is no longer accepting responses",
            SurveyStatus::Published => "This survey is accepting responses",
        }
    }
}

impl TryFrom<&str> for SurveyStatus {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "draft" => Ok(SurveyStatus::Draft),
            "published" => Ok(SurveyStatus::Published),
            "closed" => Ok(SurveyStatus::Closed),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub from: SurveyStatus,
    pub to: SurveyStatus,
}

impl StatusChange {
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

/// Moves a survey to `to`. Owners may pick any status, including reopening a
/// closed survey; nothing here changes status on its own.
pub fn transition(survey: &mut Survey, to: SurveyStatus) -> StatusChange {
    let change = StatusChange {
        from: survey.status,
        to,
    };
    survey.status = to;
    change
}

/// Gate applied before any answer is looked at.
pub fn ensure_accepting(survey: &Survey, stored_responses: i64) -> Result<(), SurveyError> {
    if !survey.status.accepts_responses() {
        return Err(SurveyError::NotAcceptingResponses(survey.status));
    }
    if survey.settings.response_limit.is_reached(stored_responses) {
        return Err(SurveyError::ResponseLimitReached);
    }
    Ok(())
}

/// Counters after one more accepted submission. `stored_responses` is the
/// locked row count, so drifted counters are corrected on the way.
pub fn record_submission(
    survey: &Survey,
    stored_responses: i64,
    at: DateTime<Utc>,
) -> Result<Analytics, SurveyError> {
    ensure_accepting(survey, stored_responses)?;
    let mut analytics = Analytics::reconciled(stored_responses, survey.analytics.last_response_at);
    analytics.record_response(at);
    Ok(analytics)
}

impl Analytics {
    pub fn reconciled(total_responses: i64, last_response_at: Option<DateTime<Utc>>) -> Self {
        let total_responses = total_responses.max(0);
        Self {
            total_responses,
            last_response_at: if total_responses == 0 {
                None
            } else {
                last_response_at
            },
        }
    }

    pub fn record_response(&mut self, at: DateTime<Utc>) {
        self.total_responses += 1;
        self.last_response_at = Some(at);
    }

    pub fn remove_response(&mut self) {
        self.total_responses = (self.total_responses - 1).max(0);
        if self.total_responses == 0 {
            self.last_response_at = None;
        }
    }

    /// Stored counter minus the real number of responses.
    pub fn drift(&self, actual: i64) -> i64 {
        self.total_responses - actual
    }
}

/// What happens to a survey's responses when the survey is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseRetention {
    #[default]
    Delete,
    Keep,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ResponseLimit, Settings};
    use uuid::Uuid;

    fn survey(status: SurveyStatus, settings: Settings) -> Survey {
        let mut survey = Survey::new_draft(Uuid::new_v4(), "Team pulse".to_string(), None, Vec::new(), settings);
        survey.status = status;
        survey
    }

    #[test]
    fn test_only_published_accepts() {
        let draft = survey(SurveyStatus::Draft, Settings::default());
        assert_eq!(
            ensure_accepting(&draft, 0),
            Err(SurveyError::NotAcceptingResponses(SurveyStatus::Draft))
        );

        let closed = survey(SurveyStatus::Closed, Settings::default());
        let err = ensure_accepting(&closed, 0).unwrap_err();
        assert_eq!(err.to_string(), "This survey is no longer accepting responses");

        let published = survey(SurveyStatus::Published, Settings::default());
        assert!(ensure_accepting(&published, 10_000).is_ok());
    }

    #[test]
    fn test_draft_and_closed_messages_differ() {
        assert_ne!(
            SurveyStatus::Draft.rejection_message(),
            SurveyStatus::Closed.rejection_message()
        );
        assert_eq!(
            SurveyError::NotAcceptingResponses(SurveyStatus::Draft).to_string(),
            "This survey is not published yet"
        );
    }

    #[test]
    fn test_limit_checked_after_status() {
        let settings = Settings {
            response_limit: ResponseLimit::capped(1),
            ..Settings::default()
        };
        let published = survey(SurveyStatus::Published, settings);
        assert!(ensure_accepting(&published, 0).is_ok());
        assert_eq!(ensure_accepting(&published, 1), Err(SurveyError::ResponseLimitReached));

        let draft = survey(SurveyStatus::Draft, settings);
        assert_eq!(
            ensure_accepting(&draft, 1),
            Err(SurveyError::NotAcceptingResponses(SurveyStatus::Draft))
        );
    }

    #[test]
    fn test_transitions_are_unconstrained() {
        let mut s = survey(SurveyStatus::Closed, Settings::default());
        let change = transition(&mut s, SurveyStatus::Published);
        assert_eq!(change.from, SurveyStatus::Closed);
        assert_eq!(s.status, SurveyStatus::Published);
        assert!(transition(&mut s, SurveyStatus::Published).is_noop());
        transition(&mut s, SurveyStatus::Draft);
        assert_eq!(s.status, SurveyStatus::Draft);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(SurveyStatus::try_from(" Published "), Ok(SurveyStatus::Published));
        assert!(SurveyStatus::try_from("archived").is_err());
    }

    #[test]
    fn test_removing_sole_response_clears_last_response() {
        let mut analytics = Analytics::default();
        analytics.record_response(Utc::now());
        assert_eq!(analytics.total_responses, 1);
        assert!(analytics.last_response_at.is_some());

        analytics.remove_response();
        assert_eq!(analytics.total_responses, 0);
        assert_eq!(analytics.last_response_at, None);

        analytics.remove_response();
        assert_eq!(analytics.total_responses, 0);
    }

    #[test]
    fn test_remove_keeps_last_response_while_nonzero() {
        let at = Utc::now();
        let mut analytics = Analytics::reconciled(3, Some(at));
        analytics.remove_response();
        assert_eq!(analytics.total_responses, 2);
        assert_eq!(analytics.last_response_at, Some(at));
    }

    #[test]
    fn test_first_submission_counts_one() {
        let mut s = survey(SurveyStatus::Published, Settings::default());
        let at = Utc::now();
        s.analytics = record_submission(&s, 0, at).unwrap();
        assert_eq!(s.analytics.total_responses, 1);
        assert_eq!(s.analytics.last_response_at, Some(at));
    }

    #[test]
    fn test_limit_reached_leaves_total() {
        let settings = Settings {
            response_limit: ResponseLimit::capped(1),
            ..Settings::default()
        };
        let mut s = survey(SurveyStatus::Published, settings);
        s.analytics = record_submission(&s, 0, Utc::now()).unwrap();

        assert_eq!(
            record_submission(&s, 1, Utc::now()),
            Err(SurveyError::ResponseLimitReached)
        );
        assert_eq!(s.analytics.total_responses, 1);
    }

    #[test]
    fn test_submission_corrects_drifted_counter() {
        let mut s = survey(SurveyStatus::Published, Settings::default());
        s.analytics.total_responses = 9;
        let analytics = record_submission(&s, 4, Utc::now()).unwrap();
        assert_eq!(analytics.total_responses, 5);
    }

    #[test]
    fn test_reconciled_and_drift() {
        let analytics = Analytics::reconciled(0, Some(Utc::now()));
        assert_eq!(analytics.last_response_at, None);

        let stored = Analytics {
            total_responses: 7,
            last_response_at: None,
        };
        assert_eq!(stored.drift(5), 2);
        assert_eq!(stored.drift(9), -2);
    }
}
