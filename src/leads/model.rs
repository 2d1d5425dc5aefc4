//! Lead data model: captured visitors, statuses, and assessment answers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a lead. Only changed by administrative action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// Just captured.
    #[default]
    New,
    /// An advisor reached out.
    Contacted,
    /// Fits the program.
    Qualified,
    /// Enrolled.
    Converted,
    /// Went cold.
    Inactive,
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Contacted => write!(f, "contacted"),
            Self::Qualified => write!(f, "qualified"),
            Self::Converted => write!(f, "converted"),
            Self::Inactive => write!(f, "inactive"),
        }
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "contacted" => Ok(Self::Contacted),
            "qualified" => Ok(Self::Qualified),
            "converted" => Ok(Self::Converted),
            "inactive" => Ok(Self::Inactive),
            _ => Err(format!("Unknown lead status: {}", s)),
        }
    }
}

/// Answers from the assessment questionnaire.
///
/// An open map: the well-known keys are `career_goal`, `experience`,
/// `interest`, `background` and `context`, but anything the landing page
/// sends is kept. Non-string values are preserved as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssessmentAnswers(BTreeMap<String, serde_json::Value>);

impl AssessmentAnswers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert of a string answer.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0
            .insert(key.into(), serde_json::Value::String(value.into()));
        self
    }

    /// String value of an answer, if present and a string.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    pub fn interest(&self) -> Option<&str> {
        self.get("interest")
    }

    pub fn experience(&self) -> Option<&str> {
        self.get("experience")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Input for creating a lead. Validated by [`crate::leads::LeadCapture`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLead {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub assessment_answers: Option<AssessmentAnswers>,
    #[serde(default)]
    pub source: Option<String>,
}

/// A captured lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub lead_id: Uuid,
    pub name: String,
    /// Always trimmed and lowercased.
    pub email: String,
    pub phone: Option<String>,
    pub assessment_answers: AssessmentAnswers,
    pub status: LeadStatus,
    pub source: String,
    pub created_at: DateTime<Utc>,
    /// Legacy duplicate of `created_at`, kept for dashboard consumers.
    pub timestamp: DateTime<Utc>,
}

impl Lead {
    /// Create a fresh lead with status `new`.
    pub fn new(
        name: impl Into<String>,
        email: &str,
        phone: Option<String>,
        assessment_answers: AssessmentAnswers,
        source: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            lead_id: Uuid::new_v4(),
            name: name.into(),
            email: normalize_email(email),
            phone: phone.filter(|p| !p.trim().is_empty()),
            assessment_answers,
            status: LeadStatus::New,
            source: source.into(),
            created_at: now,
            timestamp: now,
        }
    }
}

/// Canonical form of an email address for storage and uniqueness checks.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_lead_defaults() {
        let lead = Lead::new("Ada", "  Ada@Example.COM ", None, AssessmentAnswers::new(), "funnel");
        assert_eq!(lead.email, "ada@example.com");
        assert_eq!(lead.status, LeadStatus::New);
        assert_eq!(lead.created_at, lead.timestamp);
    }

    #[test]
    fn blank_phone_is_dropped() {
        let lead = Lead::new("Ada", "a@b.c", Some("  ".into()), AssessmentAnswers::new(), "f");
        assert!(lead.phone.is_none());
    }

    #[test]
    fn status_roundtrips_through_str() {
        for status in [
            LeadStatus::New,
            LeadStatus::Contacted,
            LeadStatus::Qualified,
            LeadStatus::Converted,
            LeadStatus::Inactive,
        ] {
            assert_eq!(status.to_string().parse::<LeadStatus>().unwrap(), status);
        }
        assert!("archived".parse::<LeadStatus>().is_err());
    }

    #[test]
    fn answers_ignore_non_string_values() {
        let answers: AssessmentAnswers =
            serde_json::from_value(serde_json::json!({"interest": "mlops", "score": 7})).unwrap();
        assert_eq!(answers.interest(), Some("mlops"));
        assert_eq!(answers.get("score"), None);
    }

    #[test]
    fn new_lead_deserializes_camel_case() {
        let input: NewLead = serde_json::from_value(serde_json::json!({
            "name": "Ada",
            "email": "ada@example.com",
            "assessmentAnswers": {"experience": "expert"}
        }))
        .unwrap();
        assert_eq!(input.assessment_answers.unwrap().experience(), Some("expert"));
        assert!(input.phone.is_none());
    }
}
