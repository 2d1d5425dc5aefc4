//! `LeadStore` trait: single async interface over the persistent and in-memory backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::leads::model::{Lead, LeadStatus};

/// Which backend served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageKind {
    #[serde(rename = "persistent")]
    Persistent,
    #[serde(rename = "in-memory")]
    InMemory,
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Persistent => write!(f, "persistent"),
            Self::InMemory => write!(f, "in-memory"),
        }
    }
}

/// One of the four funnel counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsField {
    PageViews,
    AssessmentStarts,
    AssessmentCompletions,
    LeadCaptures,
}

impl AnalyticsField {
    /// Column name in the `analytics` table.
    pub fn column(&self) -> &'static str {
        match self {
            Self::PageViews => "page_views",
            Self::AssessmentStarts => "assessment_starts",
            Self::AssessmentCompletions => "assessment_completions",
            Self::LeadCaptures => "lead_captures",
        }
    }

    /// Map a tracked client event name to a counter. Unknown events map to `None`.
    pub fn from_event(event: &str) -> Option<Self> {
        match event {
            "page_view" => Some(Self::PageViews),
            "assessment_started" => Some(Self::AssessmentStarts),
            "assessment_completed" => Some(Self::AssessmentCompletions),
            _ => None,
        }
    }

    /// Whether bumping this counter changes the conversion rate.
    pub fn affects_conversion(&self) -> bool {
        matches!(self, Self::LeadCaptures | Self::AssessmentCompletions)
    }
}

/// The global analytics singleton.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub page_views: u64,
    pub assessment_starts: u64,
    pub assessment_completions: u64,
    pub lead_captures: u64,
    /// `lead_captures / assessment_starts * 100`, two decimals.
    pub conversion_rate: f64,
    pub last_updated: DateTime<Utc>,
}

impl Analytics {
    /// A fresh singleton with all counters at zero.
    pub fn zero() -> Self {
        Self {
            page_views: 0,
            assessment_starts: 0,
            assessment_completions: 0,
            lead_captures: 0,
            conversion_rate: 0.0,
            last_updated: Utc::now(),
        }
    }

    /// Bump one counter, recomputing the conversion rate when it depends on it.
    pub fn increment(&mut self, field: AnalyticsField) {
        match field {
            AnalyticsField::PageViews => self.page_views += 1,
            AnalyticsField::AssessmentStarts => self.assessment_starts += 1,
            AnalyticsField::AssessmentCompletions => self.assessment_completions += 1,
            AnalyticsField::LeadCaptures => self.lead_captures += 1,
        }
        if field.affects_conversion() {
            self.conversion_rate = conversion_rate(self.lead_captures, self.assessment_starts);
        }
        self.last_updated = Utc::now();
    }
}

/// `captures / starts * 100` rounded to two decimals; zero when nobody started.
pub fn conversion_rate(captures: u64, starts: u64) -> f64 {
    percentage(captures, starts)
}

/// `part / whole * 100` rounded to two decimals; zero for an empty whole.
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    let pct = part as f64 / whole as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

/// Filter and pagination for lead listings.
#[derive(Debug, Clone)]
pub struct LeadQuery {
    /// Case-insensitive substring matched against name and email.
    pub search: Option<String>,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
}

impl LeadQuery {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            search: None,
            page: page.max(1),
            page_size,
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        let search = search.into();
        self.search = if search.trim().is_empty() {
            None
        } else {
            Some(search.trim().to_lowercase())
        };
        self
    }

    pub fn offset(&self) -> u64 {
        (self.page.saturating_sub(1) as u64) * self.page_size as u64
    }
}

/// One page of leads plus the total matching count.
#[derive(Debug, Clone)]
pub struct LeadPage {
    pub items: Vec<Lead>,
    pub total: u64,
    pub storage: StorageKind,
}

/// Number of leads captured from one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCount {
    pub source: String,
    pub count: u64,
}

/// Backend-agnostic lead storage.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> StorageKind;

    /// Last known connectivity state. Cheap; does no I/O.
    fn is_connected(&self) -> bool;

    /// Actively check connectivity and refresh the cached state.
    async fn ping(&self) -> bool {
        self.is_connected()
    }

    /// Record that an operation failed for connectivity reasons. The next
    /// successful `ping` clears it.
    fn mark_unavailable(&self) {}

    // ── Leads ───────────────────────────────────────────────────────

    /// Insert a new lead. Fails with [`DatabaseError::Duplicate`] if the email exists.
    async fn save_lead(&self, lead: &Lead) -> Result<(), DatabaseError>;

    /// Look up a lead by (normalized) email.
    async fn find_lead_by_email(&self, email: &str) -> Result<Option<Lead>, DatabaseError>;

    /// Change a lead's status. Returns false if no such lead exists.
    async fn update_lead_status(&self, id: Uuid, status: LeadStatus)
    -> Result<bool, DatabaseError>;

    /// Newest-first page of leads matching the query.
    async fn list_leads(&self, query: &LeadQuery) -> Result<LeadPage, DatabaseError>;

    /// Total number of leads.
    async fn count_leads(&self) -> Result<u64, DatabaseError>;

    /// The `limit` most recently captured leads.
    async fn recent_leads(&self, limit: usize) -> Result<Vec<Lead>, DatabaseError>;

    /// Lead counts grouped by source, largest first.
    async fn leads_by_source(&self) -> Result<Vec<SourceCount>, DatabaseError>;

    // ── Analytics ───────────────────────────────────────────────────

    /// Bump one counter on the singleton, creating it if needed.
    async fn increment_analytics(&self, field: AnalyticsField) -> Result<(), DatabaseError>;

    /// Read the singleton, creating it with zero counters if absent.
    async fn analytics_snapshot(&self) -> Result<Analytics, DatabaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_rate_recomputed_on_capture() {
        let mut analytics = Analytics::zero();
        for _ in 0..10 {
            analytics.increment(AnalyticsField::AssessmentStarts);
        }
        assert_eq!(analytics.conversion_rate, 0.0);
        analytics.increment(AnalyticsField::LeadCaptures);
        analytics.increment(AnalyticsField::LeadCaptures);
        assert_eq!(analytics.conversion_rate, 20.0);
    }

    #[test]
    fn page_views_leave_rate_alone() {
        let mut analytics = Analytics::zero();
        analytics.increment(AnalyticsField::PageViews);
        assert_eq!(analytics.page_views, 1);
        assert_eq!(analytics.conversion_rate, 0.0);
    }

    #[test]
    fn percentage_rounds_to_two_decimals() {
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(5, 0), 0.0);
    }

    #[test]
    fn event_names_map_to_counters() {
        assert_eq!(AnalyticsField::from_event("page_view"), Some(AnalyticsField::PageViews));
        assert_eq!(
            AnalyticsField::from_event("assessment_completed"),
            Some(AnalyticsField::AssessmentCompletions)
        );
        assert_eq!(AnalyticsField::from_event("button_click"), None);
    }

    #[test]
    fn query_offset_and_search() {
        let query = LeadQuery::new(3, 20).with_search("  ADA ");
        assert_eq!(query.offset(), 40);
        assert_eq!(query.search.as_deref(), Some("ada"));
        assert_eq!(LeadQuery::new(0, 20).offset(), 0);
        assert!(LeadQuery::new(1, 20).with_search("   ").search.is_none());
    }

    #[test]
    fn storage_kind_serializes_with_dash() {
        assert_eq!(
            serde_json::to_value(StorageKind::InMemory).unwrap(),
            serde_json::json!("in-memory")
        );
    }
}
