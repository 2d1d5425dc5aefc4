//! REST endpoints for the funnel: lead capture, admin listing, analytics,
//! manual email trigger, health and status.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::CaptureError;
use crate::leads::{AssessmentAnswers, Lead, LeadCapture, LeadStatus, NewLead};
use crate::sequence::{SequenceScheduler, Stage};
use crate::store::traits::percentage;
use crate::store::{Analytics, AnalyticsField, LeadQuery, LeadStore, SourceCount, StorageKind};

/// Default page size for `GET /api/leads`.
const DEFAULT_PAGE_SIZE: u32 = 50;
/// Upper bound on `limit` for `GET /api/leads`.
const MAX_PAGE_SIZE: u32 = 500;
/// Leads shown on the analytics dashboard.
const RECENT_LEADS: usize = 5;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LeadStore>,
    pub capture: Arc<LeadCapture>,
    pub scheduler: Arc<SequenceScheduler>,
}

/// Build the Axum router with every funnel route.
pub fn funnel_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api/leads", post(capture_lead).get(list_leads))
        .route("/api/leads/{lead_id}/status", patch(update_status))
        .route("/api/email/trigger", post(trigger_email))
        .route("/api/analytics", get(analytics))
        .route("/api/analytics/track", post(track_event))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Parse a JSON request body regardless of content type, mapping failures
/// to a 400 with the usual `{error}` shape.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| {
        debug!(error = %e, "Rejected request body");
        error_response(StatusCode::BAD_REQUEST, format!("Invalid request body: {e}"))
    })
}

// ── Leads ───────────────────────────────────────────────────────────────

async fn capture_lead(State(state): State<AppState>, body: Bytes) -> Response {
    let input: NewLead = match parse_body(&body) {
        Ok(input) => input,
        Err(rejection) => return rejection,
    };
    match state.capture.capture(input).await {
        Ok(lead) => (
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "leadId": lead.lead_id,
                "message": "Lead captured successfully",
            })),
        )
            .into_response(),
        Err(CaptureError::Validation(msg)) => error_response(StatusCode::BAD_REQUEST, msg),
        Err(CaptureError::DuplicateEmail(email)) => {
            debug!(%email, "Rejected duplicate lead");
            error_response(StatusCode::BAD_REQUEST, "Email already exists")
        }
        Err(e @ CaptureError::Storage(_)) => {
            error!(error = %e, "Lead capture failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save lead")
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListParams {
    page: Option<u32>,
    limit: Option<u32>,
    search: Option<String>,
}

#[derive(Serialize)]
struct LeadList {
    total: u64,
    page: u32,
    limit: u32,
    leads: Vec<Lead>,
    storage: StorageKind,
}

async fn list_leads(State(state): State<AppState>, Query(params): Query<ListParams>) -> Response {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let mut query = LeadQuery::new(params.page.unwrap_or(1), limit);
    if let Some(search) = params.search {
        query = query.with_search(search);
    }

    match state.store.list_leads(&query).await {
        Ok(page) => Json(LeadList {
            total: page.total,
            page: query.page,
            limit,
            leads: page.items,
            storage: page.storage,
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to list leads");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch leads")
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusUpdate {
    status: String,
}

async fn update_status(
    State(state): State<AppState>,
    Path(lead_id): Path<String>,
    body: Bytes,
) -> Response {
    let body: StatusUpdate = match parse_body(&body) {
        Ok(body) => body,
        Err(rejection) => return rejection,
    };
    let Ok(lead_id) = Uuid::parse_str(&lead_id) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid lead id");
    };
    let status: LeadStatus = match body.status.parse() {
        Ok(s) => s,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, msg),
    };

    match state.store.update_lead_status(lead_id, status).await {
        Ok(true) => {
            info!(%lead_id, %status, "Lead status updated");
            Json(json!({ "success": true, "leadId": lead_id, "status": status })).into_response()
        }
        Ok(false) => error_response(StatusCode::NOT_FOUND, "Lead not found"),
        Err(e) => {
            error!(%lead_id, error = %e, "Failed to update lead status");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update lead")
        }
    }
}

// ── Email ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerRequest {
    email: Option<String>,
    name: Option<String>,
    #[serde(default)]
    assessment_data: Option<AssessmentAnswers>,
    sequence_type: Option<String>,
}

async fn trigger_email(State(state): State<AppState>, body: Bytes) -> Response {
    let req: TriggerRequest = match parse_body(&body) {
        Ok(req) => req,
        Err(rejection) => return rejection,
    };
    let Some(email) = req.email.filter(|e| !e.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Email is required");
    };
    let stage = req
        .sequence_type
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| Stage::Welcome.as_str().to_string());
    let name = req.name.unwrap_or_default();
    let answers = req.assessment_data.unwrap_or_default();

    let result = state
        .scheduler
        .send_now(email.trim(), &name, &answers, &stage)
        .await;

    Json(json!({
        "success": result.success,
        "emailId": result.message_id,
        "provider": result.provider,
        "mock": result.mock,
    }))
    .into_response()
}

// ── Analytics ───────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecentLead {
    name: String,
    email: String,
    phone: Option<String>,
    created_at: DateTime<Utc>,
    source: String,
}

impl From<Lead> for RecentLead {
    fn from(lead: Lead) -> Self {
        Self {
            name: lead.name,
            email: lead.email,
            phone: lead.phone,
            created_at: lead.created_at,
            source: lead.source,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FunnelRates {
    /// Completions per start.
    completion_rate: f64,
    /// Captures per page view.
    conversion_rate: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyticsReport {
    #[serde(flatten)]
    counters: Analytics,
    total_leads: u64,
    recent_leads: Vec<RecentLead>,
    leads_by_source: Vec<SourceCount>,
    funnel: FunnelRates,
    storage: StorageKind,
}

async fn analytics(State(state): State<AppState>) -> Response {
    match build_report(state.store.as_ref()).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to build analytics report");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch analytics")
        }
    }
}

async fn build_report(
    store: &dyn LeadStore,
) -> Result<AnalyticsReport, crate::error::DatabaseError> {
    let counters = store.analytics_snapshot().await?;
    let total_leads = store.count_leads().await?;
    let recent_leads = store
        .recent_leads(RECENT_LEADS)
        .await?
        .into_iter()
        .map(RecentLead::from)
        .collect();
    let leads_by_source = store.leads_by_source().await?;

    let funnel = FunnelRates {
        completion_rate: percentage(counters.assessment_completions, counters.assessment_starts),
        conversion_rate: percentage(counters.lead_captures, counters.page_views),
    };

    Ok(AnalyticsReport {
        counters,
        total_leads,
        recent_leads,
        leads_by_source,
        funnel,
        storage: store.kind(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct TrackRequest {
    #[serde(default)]
    event: String,
}

/// Always 200: tracking must never break the landing page.
async fn track_event(State(state): State<AppState>, body: Bytes) -> Response {
    let req: TrackRequest = serde_json::from_slice(&body).unwrap_or_default();
    let tracked = match AnalyticsField::from_event(&req.event) {
        Some(field) => match state.store.increment_analytics(field).await {
            Ok(()) => true,
            Err(e) => {
                warn!(event = %req.event, error = %e, "Failed to track event");
                false
            }
        },
        None => {
            debug!(event = %req.event, "Ignoring untracked event");
            false
        }
    };

    Json(json!({ "success": true, "tracked": tracked })).into_response()
}

// ── Health / Status ─────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Response {
    let timestamp = Utc::now();
    match state.store.count_leads().await {
        Ok(total_leads) => Json(json!({
            "status": "healthy",
            "storage": state.store.kind(),
            "connected": state.store.is_connected(),
            "totalLeads": total_leads,
            "timestamp": timestamp,
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "error": e.to_string(),
                    "timestamp": timestamp,
                })),
            )
                .into_response()
        }
    }
}

async fn status(State(state): State<AppState>) -> Response {
    let store = state.store.as_ref();
    let (total_leads, analytics) = match (store.count_leads().await, store.analytics_snapshot().await)
    {
        (Ok(total), Ok(analytics)) => (total, analytics),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Status check failed");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "error": e.to_string(),
                    "timestamp": Utc::now(),
                })),
            )
                .into_response();
        }
    };

    Json(json!({
        "status": "ok",
        "storage": store.kind(),
        "connected": store.is_connected(),
        "totalLeads": total_leads,
        "analytics": analytics,
        "scheduledEmails": state.scheduler.pending_count().await,
        "emailTransport": if state.scheduler.email_configured() { "smtp" } else { "mock" },
        "timestamp": Utc::now(),
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::{Dispatcher, EmailRenderer, TemplateStore};
    use crate::recommend::RecommendationEngine;
    use crate::store::FallbackStore;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        let store: Arc<dyn LeadStore> = Arc::new(FallbackStore::memory_only());
        let renderer = EmailRenderer::new(
            Arc::new(TemplateStore::embedded()),
            Arc::new(RecommendationEngine::rules_only()),
            "https://example.com",
            "Sarah",
        );
        let scheduler = Arc::new(SequenceScheduler::new(
            Arc::new(renderer),
            Dispatcher::mock_only(),
        ));
        let capture = Arc::new(LeadCapture::new(
            Arc::clone(&store),
            Arc::clone(&scheduler),
            "ai_career_funnel",
        ));
        funnel_routes(AppState {
            store,
            capture,
            scheduler,
        })
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        match body {
            Some(v) => send_raw(app, method, uri, Some("application/json"), v.to_string()).await,
            None => send_raw(app, method, uri, None, String::new()).await,
        }
    }

    async fn send_raw(
        app: &Router,
        method: &str,
        uri: &str,
        content_type: Option<&str>,
        body: String,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        let body = Body::from(body);
        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn capture_then_duplicate() {
        let app = app();
        let lead = json!({"name": "Ada", "email": "ada@example.com"});

        let (status, body) = send(&app, "POST", "/api/leads", Some(lead.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
        assert!(body["leadId"].as_str().is_some());

        let (status, body) = send(&app, "POST", "/api/leads", Some(lead)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Email already exists");
    }

    #[tokio::test]
    async fn capture_requires_name_and_email() {
        let (status, body) = send(&app(), "POST", "/api/leads", Some(json!({"name": "Ada"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("required"));
    }

    #[tokio::test]
    async fn malformed_capture_body_is_json_400() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/leads",
            Some(json!({"name": "Ada", "email": "ada@example.com", "phone": 5551234})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));

        let (status, body) =
            send_raw(&app, "POST", "/api/leads", None, "{not json".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn capture_accepts_body_without_content_type() {
        let body = json!({"name": "Ada", "email": "ada@example.com"}).to_string();
        let (status, body) = send_raw(&app(), "POST", "/api/leads", None, body).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn list_caps_limit_and_reports_storage() {
        let app = app();
        for i in 0..3 {
            let lead = json!({"name": format!("Lead {i}"), "email": format!("l{i}@example.com")});
            send(&app, "POST", "/api/leads", Some(lead)).await;
        }

        let (status, body) = send(&app, "GET", "/api/leads?limit=9999&search=L1@", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["limit"], 500);
        assert_eq!(body["total"], 1);
        assert_eq!(body["storage"], "in-memory");
        assert_eq!(body["leads"][0]["email"], "l1@example.com");
    }

    #[tokio::test]
    async fn status_update_flow() {
        let app = app();
        let (_, body) = send(
            &app,
            "POST",
            "/api/leads",
            Some(json!({"name": "Ada", "email": "ada@example.com"})),
        )
        .await;
        let id = body["leadId"].as_str().unwrap().to_string();

        let uri = format!("/api/leads/{id}/status");
        let (status, body) = send(&app, "PATCH", &uri, Some(json!({"status": "qualified"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "qualified");

        let (status, _) = send(&app, "PATCH", &uri, Some(json!({"status": "archived"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let missing = format!("/api/leads/{}/status", Uuid::new_v4());
        let (status, _) = send(&app, "PATCH", &missing, Some(json!({"status": "contacted"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn tracking_feeds_analytics() {
        let app = app();
        for event in ["page_view", "page_view", "assessment_started", "assessment_completed"] {
            let (status, body) =
                send(&app, "POST", "/api/analytics/track", Some(json!({"event": event}))).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["tracked"], true);
        }
        let (status, body) =
            send(&app, "POST", "/api/analytics/track", Some(json!({"event": "scroll"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tracked"], false);

        let (status, body) = send(&app, "POST", "/api/analytics/track", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        send(
            &app,
            "POST",
            "/api/leads",
            Some(json!({"name": "Ada", "email": "ada@example.com", "source": "webinar"})),
        )
        .await;

        let (status, body) = send(&app, "GET", "/api/analytics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pageViews"], 2);
        assert_eq!(body["leadCaptures"], 1);
        assert_eq!(body["conversionRate"], 100.0);
        assert_eq!(body["totalLeads"], 1);
        assert_eq!(body["recentLeads"][0]["email"], "ada@example.com");
        assert_eq!(body["leadsBySource"][0]["source"], "webinar");
        assert_eq!(body["funnel"]["completionRate"], 100.0);
        assert_eq!(body["funnel"]["conversionRate"], 50.0);
    }

    #[tokio::test]
    async fn trigger_requires_email() {
        let app = app();
        let (status, _) = send(&app, "POST", "/api/email/trigger", Some(json!({"name": "Ada"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            "POST",
            "/api/email/trigger",
            Some(json!({
                "email": "ada@example.com",
                "name": "Ada",
                "assessmentData": {"interest": "ai_research"},
                "sequenceType": "course_deep_dive"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(body["emailId"].as_str().unwrap().starts_with("mock_"));
    }

    #[tokio::test]
    async fn trigger_treats_null_answers_as_empty() {
        let (status, body) = send(
            &app(),
            "POST",
            "/api/email/trigger",
            Some(json!({"email": "ada@example.com", "assessmentData": null})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["mock"], true);
    }

    #[tokio::test]
    async fn health_and_status() {
        let app = app();
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["storage"], "in-memory");
        assert_eq!(body["connected"], false);

        send(
            &app,
            "POST",
            "/api/leads",
            Some(json!({"name": "Ada", "email": "ada@example.com"})),
        )
        .await;
        let (status, body) = send(&app, "GET", "/api/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalLeads"], 1);
        assert_eq!(body["scheduledEmails"], 5);
        assert_eq!(body["emailTransport"], "mock");
    }
}
