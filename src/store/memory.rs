//! In-memory mirror: non-persistent backend used while the database is unreachable.
//!
//! Same shapes and semantics as the libSQL backend, including email
//! uniqueness. State is lost when the process exits.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::leads::model::{Lead, LeadStatus, normalize_email};
use crate::store::traits::{
    Analytics, AnalyticsField, LeadPage, LeadQuery, LeadStore, SourceCount, StorageKind,
};

/// Process-local lead list and analytics counters.
pub struct MemoryStore {
    /// Insertion order == capture order.
    leads: RwLock<Vec<Lead>>,
    analytics: Mutex<Option<Analytics>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            leads: RwLock::new(Vec::new()),
            analytics: Mutex::new(None),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_search(lead: &Lead, search: Option<&str>) -> bool {
    match search {
        Some(term) => {
            lead.name.to_lowercase().contains(term) || lead.email.to_lowercase().contains(term)
        }
        None => true,
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    fn kind(&self) -> StorageKind {
        StorageKind::InMemory
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn save_lead(&self, lead: &Lead) -> Result<(), DatabaseError> {
        let mut leads = self.leads.write().await;
        let email = normalize_email(&lead.email);
        if leads.iter().any(|l| l.email == email) {
            return Err(DatabaseError::Duplicate { email });
        }
        let mut stored = lead.clone();
        stored.email = email;
        leads.push(stored);
        debug!(lead_id = %lead.lead_id, "Lead saved to in-memory store");
        Ok(())
    }

    async fn find_lead_by_email(&self, email: &str) -> Result<Option<Lead>, DatabaseError> {
        let email = normalize_email(email);
        let leads = self.leads.read().await;
        Ok(leads.iter().find(|l| l.email == email).cloned())
    }

    async fn update_lead_status(
        &self,
        id: Uuid,
        status: LeadStatus,
    ) -> Result<bool, DatabaseError> {
        let mut leads = self.leads.write().await;
        match leads.iter_mut().find(|l| l.lead_id == id) {
            Some(lead) => {
                lead.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_leads(&self, query: &LeadQuery) -> Result<LeadPage, DatabaseError> {
        let leads = self.leads.read().await;
        let matching: Vec<&Lead> = leads
            .iter()
            .rev()
            .filter(|l| matches_search(l, query.search.as_deref()))
            .collect();

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.page_size as usize)
            .cloned()
            .collect();

        Ok(LeadPage {
            items,
            total,
            storage: StorageKind::InMemory,
        })
    }

    async fn count_leads(&self) -> Result<u64, DatabaseError> {
        Ok(self.leads.read().await.len() as u64)
    }

    async fn recent_leads(&self, limit: usize) -> Result<Vec<Lead>, DatabaseError> {
        let leads = self.leads.read().await;
        Ok(leads.iter().rev().take(limit).cloned().collect())
    }

    async fn leads_by_source(&self) -> Result<Vec<SourceCount>, DatabaseError> {
        let leads = self.leads.read().await;
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for lead in leads.iter() {
            *counts.entry(lead.source.as_str()).or_default() += 1;
        }
        let mut grouped: Vec<SourceCount> = counts
            .into_iter()
            .map(|(source, count)| SourceCount {
                source: source.to_string(),
                count,
            })
            .collect();
        grouped.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.source.cmp(&b.source)));
        Ok(grouped)
    }

    async fn increment_analytics(&self, field: AnalyticsField) -> Result<(), DatabaseError> {
        let mut guard = self.analytics.lock().await;
        guard.get_or_insert_with(Analytics::zero).increment(field);
        debug!(field = field.column(), "In-memory analytics incremented");
        Ok(())
    }

    async fn analytics_snapshot(&self) -> Result<Analytics, DatabaseError> {
        let mut guard = self.analytics.lock().await;
        Ok(guard.get_or_insert_with(Analytics::zero).clone())
    }
}
