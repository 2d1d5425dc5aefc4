//! Sequence scheduler: welcome email now, the rest on timers.
//!
//! Each deferred stage is a spawned task sleeping until its offset. Armed
//! sends are tracked in memory for status queries and are lost on restart.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::email::{DispatchResult, Dispatcher, EmailRenderer, OutgoingEmail};
use crate::leads::model::{AssessmentAnswers, Lead};

use super::Stage;

/// An armed, not yet fired, stage send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledSend {
    pub lead_id: Uuid,
    pub stage: Stage,
    pub fire_at: DateTime<Utc>,
}

struct TrackedSend {
    send: ScheduledSend,
    handle: JoinHandle<()>,
}

/// Who a sequence is addressed to.
#[derive(Debug, Clone)]
struct Recipient {
    lead_id: Uuid,
    name: String,
    email: String,
    answers: AssessmentAnswers,
}

impl From<&Lead> for Recipient {
    fn from(lead: &Lead) -> Self {
        Self {
            lead_id: lead.lead_id,
            name: lead.name.clone(),
            email: lead.email.clone(),
            answers: lead.assessment_answers.clone(),
        }
    }
}

/// Runs the email sequence for captured leads.
pub struct SequenceScheduler {
    renderer: Arc<EmailRenderer>,
    dispatcher: Dispatcher,
    /// Armed sends keyed by entry id.
    pending: Arc<RwLock<HashMap<Uuid, TrackedSend>>>,
}

impl SequenceScheduler {
    pub fn new(renderer: Arc<EmailRenderer>, dispatcher: Dispatcher) -> Self {
        Self {
            renderer,
            dispatcher,
            pending: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Send the welcome email and arm every deferred stage.
    ///
    /// Never fails: a failed send is already substituted by the dispatcher.
    pub async fn start(&self, lead: &Lead) -> DispatchResult {
        let recipient = Arc::new(Recipient::from(lead));
        // Offsets count from capture, not from when the welcome send returns.
        let started = Instant::now();
        let armed_at = Utc::now();

        let welcome = send_stage(
            &self.renderer,
            &self.dispatcher,
            &recipient,
            Stage::Welcome.as_str(),
        )
        .await;
        tracing::info!(
            lead_id = %recipient.lead_id,
            message_id = %welcome.message_id,
            mock = welcome.mock,
            "Welcome email dispatched"
        );

        let mut pending = self.pending.write().await;
        for stage in Stage::DEFERRED {
            let entry_id = Uuid::new_v4();
            let fire_at = armed_at
                + chrono::Duration::from_std(stage.offset()).unwrap_or(chrono::Duration::zero());
            let handle = tokio::spawn(run_deferred(
                entry_id,
                started + stage.offset(),
                stage,
                Arc::clone(&recipient),
                Arc::clone(&self.renderer),
                self.dispatcher.clone(),
                Arc::clone(&self.pending),
            ));
            pending.insert(
                entry_id,
                TrackedSend {
                    send: ScheduledSend {
                        lead_id: recipient.lead_id,
                        stage,
                        fire_at,
                    },
                    handle,
                },
            );
            tracing::debug!(lead_id = %recipient.lead_id, %stage, %fire_at, "Armed sequence email");
        }
        tracing::info!(
            lead_id = %recipient.lead_id,
            stages = Stage::DEFERRED.len(),
            "Email sequence scheduled"
        );

        welcome
    }

    /// Render and send one stage right away, outside any sequence.
    pub async fn send_now(
        &self,
        email: &str,
        name: &str,
        answers: &AssessmentAnswers,
        stage: &str,
    ) -> DispatchResult {
        let recipient = Recipient {
            lead_id: Uuid::nil(),
            name: name.to_string(),
            email: email.to_string(),
            answers: answers.clone(),
        };
        send_stage(&self.renderer, &self.dispatcher, &recipient, stage).await
    }

    /// Whether a real email transport is configured.
    pub fn email_configured(&self) -> bool {
        self.dispatcher.is_configured()
    }

    /// Armed sends, soonest first.
    pub async fn pending(&self) -> Vec<ScheduledSend> {
        let mut sends: Vec<ScheduledSend> = self
            .pending
            .read()
            .await
            .values()
            .map(|t| t.send.clone())
            .collect();
        sends.sort_by_key(|s| s.fire_at);
        sends
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }

    /// Abort every armed send. Used on shutdown.
    pub async fn stop_all(&self) {
        let mut pending = self.pending.write().await;
        let count = pending.len();
        for (_, tracked) in pending.drain() {
            tracked.handle.abort();
        }
        if count > 0 {
            tracing::warn!(count, "Dropped armed sequence emails on shutdown");
        }
    }
}

async fn run_deferred(
    entry_id: Uuid,
    due: Instant,
    stage: Stage,
    recipient: Arc<Recipient>,
    renderer: Arc<EmailRenderer>,
    dispatcher: Dispatcher,
    pending: Arc<RwLock<HashMap<Uuid, TrackedSend>>>,
) {
    tokio::time::sleep_until(due).await;

    pending.write().await.remove(&entry_id);
    let result = send_stage(&renderer, &dispatcher, &recipient, stage.as_str()).await;
    tracing::info!(
        lead_id = %recipient.lead_id,
        %stage,
        message_id = %result.message_id,
        mock = result.mock,
        "Sequence email fired"
    );
}

async fn send_stage(
    renderer: &EmailRenderer,
    dispatcher: &Dispatcher,
    recipient: &Recipient,
    stage: &str,
) -> DispatchResult {
    let rendered = renderer
        .render(stage, &recipient.answers, &recipient.name)
        .await;
    let email = OutgoingEmail {
        to: recipient.email.clone(),
        name: recipient.name.clone(),
        subject: rendered.subject,
        html: rendered.content,
        text: rendered.text,
        email_type: stage.to_string(),
    };
    dispatcher.dispatch(&email).await
}
