//! libSQL backend: persistent `LeadStore` implementation.
//!
//! Supports local file and in-memory databases. Tracks a connectivity flag
//! that the fallback router consults before every operation.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::leads::model::{AssessmentAnswers, Lead, LeadStatus, normalize_email};
use crate::store::migrations;
use crate::store::traits::{
    Analytics, AnalyticsField, LeadPage, LeadQuery, LeadStore, SourceCount, StorageKind,
};

/// Primary key of the analytics singleton row.
const ANALYTICS_ID: &str = "global";

const LEAD_COLUMNS: &str =
    "lead_id, name, email, phone, assessment_answers, status, source, created_at, timestamp";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    connected: AtomicBool,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        Ok(Self {
            db: Arc::new(db),
            conn,
            connected: AtomicBool::new(true),
        })
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    /// Force the connectivity flag. Used by operators and tests.
    pub fn set_connected(&self, connected: bool) {
        let was = self.connected.swap(connected, Ordering::SeqCst);
        if was != connected {
            if connected {
                info!("Persistent store connection restored");
            } else {
                warn!("Persistent store marked disconnected");
            }
        }
    }

    async fn ensure_analytics_row(&self) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO analytics (id, last_updated) VALUES (?1, ?2)",
                params![ANALYTICS_ID, format_datetime(&Utc::now())],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("ensure_analytics_row: {e}")))?;
        Ok(())
    }

    async fn query_count(&self, sql: &str, op: &str) -> Result<u64, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, ())
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0).max(0) as u64),
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }

    async fn collect_leads(
        &self,
        sql: &str,
        params: Vec<libsql::Value>,
        op: &str,
    ) -> Result<Vec<Lead>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut leads = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_lead(&row) {
                Ok(lead) => leads.push(lead),
                Err(e) => {
                    tracing::warn!("Skipping lead row: {e}");
                }
            }
        }
        Ok(leads)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Escape `LIKE` metacharacters so a search term matches literally.
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn is_unique_violation(err: &libsql::Error) -> bool {
    err.to_string().contains("UNIQUE constraint failed")
}

/// Map a libsql Row to a Lead. Column order matches LEAD_COLUMNS.
fn row_to_lead(row: &libsql::Row) -> Result<Lead, DatabaseError> {
    let id_str: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("lead_id: {e}")))?;
    let lead_id = Uuid::parse_str(&id_str)
        .map_err(|e| DatabaseError::Serialization(format!("lead_id {id_str}: {e}")))?;
    let answers_str: String = row.get(4).unwrap_or_else(|_| "{}".to_string());
    let assessment_answers: AssessmentAnswers =
        serde_json::from_str(&answers_str).unwrap_or_default();
    let status_str: String = row.get(5).unwrap_or_else(|_| "new".to_string());
    let created_str: String = row
        .get(7)
        .map_err(|e| DatabaseError::Query(format!("created_at: {e}")))?;
    let timestamp_str: String = row.get(8).unwrap_or_else(|_| created_str.clone());

    Ok(Lead {
        lead_id,
        name: row
            .get(1)
            .map_err(|e| DatabaseError::Query(format!("name: {e}")))?,
        email: row
            .get(2)
            .map_err(|e| DatabaseError::Query(format!("email: {e}")))?,
        phone: row.get(3).ok(),
        assessment_answers,
        status: status_str.parse().unwrap_or_default(),
        source: row.get(6).unwrap_or_default(),
        created_at: parse_datetime(&created_str),
        timestamp: parse_datetime(&timestamp_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl LeadStore for LibSqlBackend {
    fn kind(&self) -> StorageKind {
        StorageKind::Persistent
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn ping(&self) -> bool {
        let ok = self.conn().query("SELECT 1", ()).await.is_ok();
        self.set_connected(ok);
        ok
    }

    fn mark_unavailable(&self) {
        self.set_connected(false);
    }

    // ── Leads ───────────────────────────────────────────────────────

    async fn save_lead(&self, lead: &Lead) -> Result<(), DatabaseError> {
        let email = normalize_email(&lead.email);
        let answers = serde_json::to_string(&lead.assessment_answers)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        let result = self
            .conn()
            .execute(
                &format!("INSERT INTO leads ({LEAD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
                params![
                    lead.lead_id.to_string(),
                    lead.name.clone(),
                    email.clone(),
                    opt_text(lead.phone.as_deref()),
                    answers,
                    lead.status.to_string(),
                    lead.source.clone(),
                    format_datetime(&lead.created_at),
                    format_datetime(&lead.timestamp),
                ],
            )
            .await;

        match result {
            Ok(_) => {
                debug!(lead_id = %lead.lead_id, "Lead inserted into DB");
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => Err(DatabaseError::Duplicate { email }),
            Err(e) => Err(DatabaseError::Query(format!("save_lead: {e}"))),
        }
    }

    async fn find_lead_by_email(&self, email: &str) -> Result<Option<Lead>, DatabaseError> {
        let leads = self
            .collect_leads(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE email = ?1"),
                vec![libsql::Value::Text(normalize_email(email))],
                "find_lead_by_email",
            )
            .await?;
        Ok(leads.into_iter().next())
    }

    async fn update_lead_status(
        &self,
        id: Uuid,
        status: LeadStatus,
    ) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE leads SET status = ?1 WHERE lead_id = ?2",
                params![status.to_string(), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_lead_status: {e}")))?;

        debug!(lead_id = %id, status = %status, "Lead status updated in DB");
        Ok(count > 0)
    }

    async fn list_leads(&self, query: &LeadQuery) -> Result<LeadPage, DatabaseError> {
        let (filter, mut args) = match &query.search {
            Some(term) => (
                "WHERE lower(name) LIKE ?1 ESCAPE '\\' OR lower(email) LIKE ?1 ESCAPE '\\'",
                vec![libsql::Value::Text(format!("%{}%", escape_like(term)))],
            ),
            None => ("", Vec::new()),
        };

        let total = {
            let mut rows = self
                .conn()
                .query(&format!("SELECT COUNT(*) FROM leads {filter}"), args.clone())
                .await
                .map_err(|e| DatabaseError::Query(format!("list_leads count: {e}")))?;
            match rows.next().await {
                Ok(Some(row)) => row.get::<i64>(0).unwrap_or(0).max(0) as u64,
                _ => 0,
            }
        };

        let limit_idx = args.len() + 1;
        let offset_idx = args.len() + 2;
        args.push(libsql::Value::Integer(query.page_size as i64));
        args.push(libsql::Value::Integer(query.offset() as i64));

        let items = self
            .collect_leads(
                &format!(
                    "SELECT {LEAD_COLUMNS} FROM leads {filter} ORDER BY created_at DESC, rowid DESC LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
                ),
                args,
                "list_leads",
            )
            .await?;

        Ok(LeadPage {
            items,
            total,
            storage: StorageKind::Persistent,
        })
    }

    async fn count_leads(&self) -> Result<u64, DatabaseError> {
        self.query_count("SELECT COUNT(*) FROM leads", "count_leads")
            .await
    }

    async fn recent_leads(&self, limit: usize) -> Result<Vec<Lead>, DatabaseError> {
        self.collect_leads(
            &format!("SELECT {LEAD_COLUMNS} FROM leads ORDER BY created_at DESC, rowid DESC LIMIT ?1"),
            vec![libsql::Value::Integer(limit as i64)],
            "recent_leads",
        )
        .await
    }

    async fn leads_by_source(&self) -> Result<Vec<SourceCount>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT source, COUNT(*) AS c FROM leads GROUP BY source ORDER BY c DESC, source ASC",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("leads_by_source: {e}")))?;

        let mut grouped = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let source: String = row.get(0).unwrap_or_default();
            let count: i64 = row.get(1).unwrap_or(0);
            grouped.push(SourceCount {
                source,
                count: count.max(0) as u64,
            });
        }
        Ok(grouped)
    }

    // ── Analytics ───────────────────────────────────────────────────

    async fn increment_analytics(&self, field: AnalyticsField) -> Result<(), DatabaseError> {
        self.ensure_analytics_row().await?;
        let column = field.column();
        let now = format_datetime(&Utc::now());

        self.conn()
            .execute(
                &format!(
                    "UPDATE analytics SET {column} = {column} + 1, last_updated = ?1 WHERE id = ?2"
                ),
                params![now, ANALYTICS_ID],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("increment_analytics: {e}")))?;

        if field.affects_conversion() {
            self.conn()
                .execute(
                    "UPDATE analytics SET conversion_rate = CASE
                        WHEN assessment_starts > 0
                        THEN ROUND(lead_captures * 100.0 / assessment_starts, 2)
                        ELSE 0 END
                     WHERE id = ?1",
                    params![ANALYTICS_ID],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("recompute conversion_rate: {e}")))?;
        }

        debug!(field = column, "Analytics incremented in DB");
        Ok(())
    }

    async fn analytics_snapshot(&self) -> Result<Analytics, DatabaseError> {
        self.ensure_analytics_row().await?;
        let mut rows = self
            .conn()
            .query(
                "SELECT page_views, assessment_starts, assessment_completions, lead_captures,
                        conversion_rate, last_updated
                 FROM analytics WHERE id = ?1",
                params![ANALYTICS_ID],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("analytics_snapshot: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let counter = |idx: i32| row.get::<i64>(idx).unwrap_or(0).max(0) as u64;
                let updated: String = row.get(5).unwrap_or_default();
                Ok(Analytics {
                    page_views: counter(0),
                    assessment_starts: counter(1),
                    assessment_completions: counter(2),
                    lead_captures: counter(3),
                    conversion_rate: row.get::<f64>(4).unwrap_or(0.0),
                    last_updated: parse_datetime(&updated),
                })
            }
            Ok(None) => Ok(Analytics::zero()),
            Err(e) => Err(DatabaseError::Query(format!("analytics_snapshot: {e}"))),
        }
    }
}
