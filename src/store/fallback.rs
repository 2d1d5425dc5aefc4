//! Fallback router: sends every operation to the persistent backend while it
//! reports a connection, and to the in-memory mirror otherwise.
//!
//! Callers only ever see one `LeadStore`. Any persistent failure other than a
//! duplicate email marks the backend unavailable and the operation is served
//! by the mirror, as are all later ones until a ping succeeds.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::leads::model::{Lead, LeadStatus};
use crate::store::memory::MemoryStore;
use crate::store::traits::{
    Analytics, AnalyticsField, LeadPage, LeadQuery, LeadStore, SourceCount, StorageKind,
};

/// `LeadStore` that picks a backend per call based on connectivity.
pub struct FallbackStore {
    primary: Option<Arc<dyn LeadStore>>,
    memory: Arc<MemoryStore>,
}

impl FallbackStore {
    /// Route to `primary` when connected, otherwise to a fresh in-memory mirror.
    pub fn new(primary: Option<Arc<dyn LeadStore>>) -> Self {
        Self {
            primary,
            memory: Arc::new(MemoryStore::new()),
        }
    }

    /// A store that never had a persistent backend.
    pub fn memory_only() -> Self {
        Self::new(None)
    }

    /// The persistent backend, if it is currently connected.
    fn active_primary(&self) -> Option<&Arc<dyn LeadStore>> {
        self.primary.as_ref().filter(|p| p.is_connected())
    }

    /// Take the persistent backend out of rotation after a failed call.
    fn demote(&self, primary: &Arc<dyn LeadStore>, op: &str, error: &DatabaseError) {
        warn!(op, error = %error, "Persistent store failed, switching to in-memory mirror");
        primary.mark_unavailable();
    }

    /// Backend that would serve the next call.
    pub fn active_kind(&self) -> StorageKind {
        match self.active_primary() {
            Some(_) => StorageKind::Persistent,
            None => StorageKind::InMemory,
        }
    }

    /// The in-memory mirror, exposed for status reporting.
    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }
}

#[async_trait]
impl LeadStore for FallbackStore {
    fn kind(&self) -> StorageKind {
        self.active_kind()
    }

    fn is_connected(&self) -> bool {
        self.active_primary().is_some()
    }

    async fn ping(&self) -> bool {
        match &self.primary {
            Some(primary) => primary.ping().await,
            None => false,
        }
    }

    async fn save_lead(&self, lead: &Lead) -> Result<(), DatabaseError> {
        if let Some(primary) = self.active_primary() {
            match primary.save_lead(lead).await {
                Ok(()) => return Ok(()),
                Err(e @ DatabaseError::Duplicate { .. }) => return Err(e),
                Err(e) => self.demote(primary, "save_lead", &e),
            }
        }
        self.memory.save_lead(lead).await
    }

    async fn find_lead_by_email(&self, email: &str) -> Result<Option<Lead>, DatabaseError> {
        if let Some(primary) = self.active_primary() {
            match primary.find_lead_by_email(email).await {
                Ok(found) => return Ok(found),
                Err(e) => self.demote(primary, "find_lead_by_email", &e),
            }
        }
        self.memory.find_lead_by_email(email).await
    }

    async fn update_lead_status(
        &self,
        id: Uuid,
        status: LeadStatus,
    ) -> Result<bool, DatabaseError> {
        if let Some(primary) = self.active_primary() {
            match primary.update_lead_status(id, status).await {
                Ok(updated) => return Ok(updated),
                Err(e) => self.demote(primary, "update_lead_status", &e),
            }
        }
        self.memory.update_lead_status(id, status).await
    }

    async fn list_leads(&self, query: &LeadQuery) -> Result<LeadPage, DatabaseError> {
        if let Some(primary) = self.active_primary() {
            match primary.list_leads(query).await {
                Ok(page) => return Ok(page),
                Err(e) => self.demote(primary, "list_leads", &e),
            }
        }
        self.memory.list_leads(query).await
    }

    async fn count_leads(&self) -> Result<u64, DatabaseError> {
        if let Some(primary) = self.active_primary() {
            match primary.count_leads().await {
                Ok(count) => return Ok(count),
                Err(e) => self.demote(primary, "count_leads", &e),
            }
        }
        self.memory.count_leads().await
    }

    async fn recent_leads(&self, limit: usize) -> Result<Vec<Lead>, DatabaseError> {
        if let Some(primary) = self.active_primary() {
            match primary.recent_leads(limit).await {
                Ok(leads) => return Ok(leads),
                Err(e) => self.demote(primary, "recent_leads", &e),
            }
        }
        self.memory.recent_leads(limit).await
    }

    async fn leads_by_source(&self) -> Result<Vec<SourceCount>, DatabaseError> {
        if let Some(primary) = self.active_primary() {
            match primary.leads_by_source().await {
                Ok(grouped) => return Ok(grouped),
                Err(e) => self.demote(primary, "leads_by_source", &e),
            }
        }
        self.memory.leads_by_source().await
    }

    async fn increment_analytics(&self, field: AnalyticsField) -> Result<(), DatabaseError> {
        if let Some(primary) = self.active_primary() {
            match primary.increment_analytics(field).await {
                Ok(()) => return Ok(()),
                Err(e) => self.demote(primary, "increment_analytics", &e),
            }
        }
        self.memory.increment_analytics(field).await
    }

    async fn analytics_snapshot(&self) -> Result<Analytics, DatabaseError> {
        if let Some(primary) = self.active_primary() {
            match primary.analytics_snapshot().await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => self.demote(primary, "analytics_snapshot", &e),
            }
        }
        self.memory.analytics_snapshot().await
    }
}

/// Periodically ping the persistent backend so the router can switch back
/// once connectivity is restored.
pub fn spawn_connectivity_probe(
    store: Arc<dyn LeadStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip immediate first tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let connected = store.ping().await;
            debug!(connected, "Persistent store probe");
        }
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Persistent backend that claims a connection until told otherwise.
    /// Writes always fail; reads succeed only when `readable` is set.
    pub struct FlakyStore {
        connected: AtomicBool,
        readable: bool,
    }

    impl FlakyStore {
        pub fn broken() -> Arc<Self> {
            Arc::new(Self {
                connected: AtomicBool::new(true),
                readable: false,
            })
        }

        pub fn write_failing() -> Arc<Self> {
            Arc::new(Self {
                connected: AtomicBool::new(true),
                readable: true,
            })
        }

        fn read<T>(&self, value: T) -> Result<T, DatabaseError> {
            if self.readable {
                Ok(value)
            } else {
                Err(DatabaseError::Query("db down".into()))
            }
        }
    }

    #[async_trait]
    impl LeadStore for FlakyStore {
        fn kind(&self) -> StorageKind {
            StorageKind::Persistent
        }
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
        fn mark_unavailable(&self) {
            self.connected.store(false, Ordering::SeqCst);
        }
        async fn save_lead(&self, _lead: &Lead) -> Result<(), DatabaseError> {
            Err(DatabaseError::Query("db down".into()))
        }
        async fn find_lead_by_email(&self, _email: &str) -> Result<Option<Lead>, DatabaseError> {
            self.read(None)
        }
        async fn update_lead_status(
            &self,
            _id: Uuid,
            _status: LeadStatus,
        ) -> Result<bool, DatabaseError> {
            Err(DatabaseError::Query("db down".into()))
        }
        async fn list_leads(&self, _query: &LeadQuery) -> Result<LeadPage, DatabaseError> {
            self.read(LeadPage {
                items: Vec::new(),
                total: 0,
                storage: StorageKind::Persistent,
            })
        }
        async fn count_leads(&self) -> Result<u64, DatabaseError> {
            self.read(0)
        }
        async fn recent_leads(&self, _limit: usize) -> Result<Vec<Lead>, DatabaseError> {
            self.read(Vec::new())
        }
        async fn leads_by_source(&self) -> Result<Vec<SourceCount>, DatabaseError> {
            self.read(Vec::new())
        }
        async fn increment_analytics(&self, _field: AnalyticsField) -> Result<(), DatabaseError> {
            Err(DatabaseError::Query("db down".into()))
        }
        async fn analytics_snapshot(&self) -> Result<Analytics, DatabaseError> {
            self.read(Analytics::zero())
        }
    }
}
