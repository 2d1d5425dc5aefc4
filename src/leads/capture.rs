//! Lead capture flow: validate → save → count → start the email sequence.
//!
//! Only validation and persistence failures reach the caller. Counter and
//! email problems are logged and swallowed.

use std::sync::Arc;

use crate::error::CaptureError;
use crate::sequence::SequenceScheduler;
use crate::store::{AnalyticsField, LeadStore};

use super::model::{Lead, NewLead, normalize_email};

/// Captures leads from the landing page.
pub struct LeadCapture {
    store: Arc<dyn LeadStore>,
    scheduler: Arc<SequenceScheduler>,
    default_source: String,
}

impl LeadCapture {
    pub fn new(
        store: Arc<dyn LeadStore>,
        scheduler: Arc<SequenceScheduler>,
        default_source: impl Into<String>,
    ) -> Self {
        Self {
            store,
            scheduler,
            default_source: default_source.into(),
        }
    }

    /// Capture a lead. Returns the stored record.
    pub async fn capture(&self, input: NewLead) -> Result<Lead, CaptureError> {
        let lead = self.validate(input)?;

        self.store.save_lead(&lead).await?;
        tracing::info!(
            lead_id = %lead.lead_id,
            source = %lead.source,
            storage = %self.store.kind(),
            "Lead captured"
        );

        if let Err(e) = self
            .store
            .increment_analytics(AnalyticsField::LeadCaptures)
            .await
        {
            tracing::warn!(lead_id = %lead.lead_id, error = %e, "Failed to count lead capture");
        }

        self.scheduler.start(&lead).await;
        Ok(lead)
    }

    fn validate(&self, input: NewLead) -> Result<Lead, CaptureError> {
        let name = input
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let email = input
            .email
            .map(|e| normalize_email(&e))
            .filter(|e| !e.is_empty());

        let (Some(name), Some(email)) = (name, email) else {
            return Err(CaptureError::Validation(
                "Name and email are required".to_string(),
            ));
        };

        if !looks_like_email(&email) {
            return Err(CaptureError::Validation(format!(
                "Invalid email address: {email}"
            )));
        }

        let source = input
            .source
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.default_source.clone());

        Ok(Lead::new(
            name,
            &email,
            input.phone,
            input.assessment_answers.unwrap_or_default(),
            source,
        ))
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}
