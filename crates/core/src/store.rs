//! Lead store port and an in-memory implementation.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::lead::{normalize_email, EmailStep, Lead, LeadId, LeadStatus, TimezoneBucket};
use crate::errors::StoreError;

/// Selection of leads eligible for a stage. Results are ordered by `created_at` ascending.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeadQuery {
    pub status: LeadStatus,
    pub limit: u32,
    /// Leads with `error_count >= max_error_count` are excluded (quarantine).
    pub max_error_count: Option<u32>,
    pub exclude_replied: bool,
    /// Only leads whose delivery of `step` happened before the instant.
    pub sent_before: Option<(EmailStep, DateTime<Utc>)>,
    /// Only leads in one of these buckets. A lead without a bucket counts as `Local`.
    pub buckets: Option<Vec<TimezoneBucket>>,
}

impl LeadQuery {
    pub fn new(status: LeadStatus, limit: u32) -> Self {
        Self {
            status,
            limit,
            max_error_count: None,
            exclude_replied: false,
            sent_before: None,
            buckets: None,
        }
    }

    pub fn excluding_quarantined(mut self, threshold: u32) -> Self {
        self.max_error_count = Some(threshold);
        self
    }

    pub fn excluding_replied(mut self) -> Self {
        self.exclude_replied = true;
        self
    }

    pub fn sent_before(mut self, step: EmailStep, cutoff: DateTime<Utc>) -> Self {
        self.sent_before = Some((step, cutoff));
        self
    }

    pub fn in_buckets(mut self, buckets: Vec<TimezoneBucket>) -> Self {
        self.buckets = Some(buckets);
        self
    }

    pub fn matches(&self, lead: &Lead) -> bool {
        if lead.status != self.status {
            return false;
        }
        if let Some(buckets) = &self.buckets {
            if !buckets.contains(&lead.timezone_bucket.unwrap_or(TimezoneBucket::Local)) {
                return false;
            }
        }
        if self.max_error_count.is_some_and(|threshold| lead.error_count >= threshold) {
            return false;
        }
        if self.exclude_replied && lead.replied_at.is_some() {
            return false;
        }
        match self.sent_before {
            Some((step, cutoff)) => {
                lead.deliveries.get(step).is_some_and(|delivery| delivery.sent_at < cutoff)
            }
            None => true,
        }
    }
}

#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn find_by_id(&self, id: &LeadId) -> Result<Option<Lead>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Lead>, StoreError>;

    /// Inserts unless a lead with the same normalized email or profile URL exists.
    /// Returns whether a row was inserted.
    async fn insert_if_absent(&self, lead: &Lead) -> Result<bool, StoreError>;

    async fn select(&self, query: &LeadQuery) -> Result<Vec<Lead>, StoreError>;

    /// Persists `lead` if the stored version still equals `lead.version`.
    /// Returns the stored lead with its bumped version, or `StoreError::Conflict`.
    async fn update(&self, lead: &Lead) -> Result<Lead, StoreError>;

    /// Increments the error count and returns the new count.
    async fn record_error(
        &self,
        id: &LeadId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<u32, StoreError>;

    async fn clear_error(
        &self,
        id: &LeadId,
        reset_to: Option<LeadStatus>,
        at: DateTime<Utc>,
    ) -> Result<Lead, StoreError>;

    async fn count_by_status(&self) -> Result<BTreeMap<LeadStatus, u64>, StoreError>;

    async fn count_quarantined(&self, threshold: u32) -> Result<u64, StoreError>;

    /// Leads with a non-zero error count, most errors first.
    async fn find_with_errors(&self, limit: u32) -> Result<Vec<Lead>, StoreError>;
}

#[derive(Clone, Default)]
pub struct InMemoryLeadStore {
    leads: Arc<Mutex<Vec<Lead>>>,
}

impl InMemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Lead> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Lead>> {
        match self.leads.lock() {
            Ok(leads) => leads,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn with_lead<T>(
        &self,
        id: &LeadId,
        mutate: impl FnOnce(&mut Lead) -> T,
    ) -> Result<T, StoreError> {
        let mut leads = self.lock();
        let lead = leads
            .iter_mut()
            .find(|lead| &lead.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(mutate(lead))
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn find_by_id(&self, id: &LeadId) -> Result<Option<Lead>, StoreError> {
        Ok(self.lock().iter().find(|lead| &lead.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Lead>, StoreError> {
        let email = normalize_email(email);
        Ok(self.lock().iter().find(|lead| lead.email == email).cloned())
    }

    async fn insert_if_absent(&self, lead: &Lead) -> Result<bool, StoreError> {
        let mut leads = self.lock();
        let email = normalize_email(&lead.email);
        let duplicate = leads.iter().any(|existing| {
            existing.email == email
                || (lead.profile_url.is_some() && existing.profile_url == lead.profile_url)
        });
        if duplicate {
            return Ok(false);
        }
        let mut stored = lead.clone();
        stored.email = email;
        leads.push(stored);
        Ok(true)
    }

    async fn select(&self, query: &LeadQuery) -> Result<Vec<Lead>, StoreError> {
        let mut selected: Vec<Lead> =
            self.lock().iter().filter(|lead| query.matches(lead)).cloned().collect();
        selected.sort_by_key(|lead| lead.created_at);
        selected.truncate(query.limit as usize);
        Ok(selected)
    }

    async fn update(&self, lead: &Lead) -> Result<Lead, StoreError> {
        self.with_lead(&lead.id, |stored| {
            if stored.version != lead.version {
                return Err(StoreError::Conflict { lead_id: lead.id.to_string() });
            }
            let mut next = lead.clone();
            next.version = lead.version + 1;
            *stored = next.clone();
            Ok(next)
        })?
    }

    async fn record_error(
        &self,
        id: &LeadId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        self.with_lead(id, |lead| {
            lead.error_count += 1;
            lead.last_error = Some(reason.to_owned());
            lead.last_error_at = Some(at);
            lead.updated_at = at;
            lead.version += 1;
            lead.error_count
        })
    }

    async fn clear_error(
        &self,
        id: &LeadId,
        reset_to: Option<LeadStatus>,
        at: DateTime<Utc>,
    ) -> Result<Lead, StoreError> {
        self.with_lead(id, |lead| {
            lead.error_count = 0;
            lead.last_error = None;
            lead.last_error_at = None;
            if let Some(status) = reset_to {
                lead.status = status;
            }
            lead.updated_at = at;
            lead.version += 1;
            lead.clone()
        })
    }

    async fn count_by_status(&self) -> Result<BTreeMap<LeadStatus, u64>, StoreError> {
        let mut counts = BTreeMap::new();
        for lead in self.lock().iter() {
            *counts.entry(lead.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn count_quarantined(&self, threshold: u32) -> Result<u64, StoreError> {
        Ok(self.lock().iter().filter(|lead| lead.is_quarantined(threshold)).count() as u64)
    }

    async fn find_with_errors(&self, limit: u32) -> Result<Vec<Lead>, StoreError> {
        let mut leads: Vec<Lead> =
            self.lock().iter().filter(|lead| lead.error_count > 0).cloned().collect();
        leads.sort_by(|a, b| {
            b.error_count.cmp(&a.error_count).then_with(|| a.created_at.cmp(&b.created_at))
        });
        leads.truncate(limit as usize);
        Ok(leads)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{InMemoryLeadStore, LeadQuery, LeadStore};
    use crate::domain::lead::{Delivery, EmailStep, Lead, LeadStatus};
    use crate::errors::StoreError;

    #[tokio::test]
    async fn duplicate_email_or_profile_is_not_inserted() {
        let store = InMemoryLeadStore::new();
        let now = Utc::now();
        let mut first = Lead::discovered("ada@example.com", "Ada", now);
        first.profile_url = Some("https://profiles.example/ada".to_owned());

        assert!(store.insert_if_absent(&first).await.expect("insert"));
        assert!(!store
            .insert_if_absent(&Lead::discovered("ADA@example.com", "Ada", now))
            .await
            .expect("insert"));

        let mut same_profile = Lead::discovered("ada.l@example.com", "Ada", now);
        same_profile.profile_url = first.profile_url.clone();
        assert!(!store.insert_if_absent(&same_profile).await.expect("insert"));
        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn select_orders_by_creation_and_honors_limit() {
        let store = InMemoryLeadStore::new();
        let now = Utc::now();
        for (offset, email) in [(2, "c@x.com"), (0, "a@x.com"), (1, "b@x.com")] {
            let lead = Lead::discovered(email, "L", now + Duration::seconds(offset));
            store.insert_if_absent(&lead).await.expect("insert");
        }

        let selected = store.select(&LeadQuery::new(LeadStatus::Scraped, 2)).await.expect("select");
        let emails: Vec<_> = selected.iter().map(|lead| lead.email.as_str()).collect();
        assert_eq!(emails, vec!["a@x.com", "b@x.com"]);
    }

    #[tokio::test]
    async fn stale_version_update_conflicts() {
        let store = InMemoryLeadStore::new();
        let lead = Lead::discovered("a@x.com", "A", Utc::now());
        store.insert_if_absent(&lead).await.expect("insert");

        let mut first = lead.clone();
        first.status = LeadStatus::Researched;
        let stored = store.update(&first).await.expect("first writer wins");
        assert_eq!(stored.version, lead.version + 1);

        let mut second = lead.clone();
        second.status = LeadStatus::Invalid;
        assert!(matches!(store.update(&second).await, Err(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn quarantined_leads_drop_out_until_cleared() {
        let store = InMemoryLeadStore::new();
        let now = Utc::now();
        let lead = Lead::discovered("a@x.com", "A", now);
        store.insert_if_absent(&lead).await.expect("insert");
        let query = LeadQuery::new(LeadStatus::Scraped, 10).excluding_quarantined(3);

        for _ in 0..3 {
            store.record_error(&lead.id, "boom", now).await.expect("record");
        }
        assert!(store.select(&query).await.expect("select").is_empty());
        assert_eq!(store.count_quarantined(3).await.expect("count"), 1);
        assert_eq!(store.find_with_errors(5).await.expect("errors").len(), 1);

        store.clear_error(&lead.id, None, now).await.expect("clear");
        assert_eq!(store.select(&query).await.expect("select").len(), 1);
        assert_eq!(store.count_quarantined(3).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn follow_up_query_filters_on_delivery_age_and_replies() {
        let store = InMemoryLeadStore::new();
        let now = Utc::now();
        for (email, days_ago, replied) in
            [("old@x.com", 4, false), ("new@x.com", 1, false), ("replied@x.com", 5, true)]
        {
            let mut lead = Lead::discovered(email, "L", now - Duration::days(10));
            lead.status = LeadStatus::Email1Sent;
            lead.deliveries.set(
                EmailStep::First,
                Delivery { sent_at: now - Duration::days(days_ago), message_id: email.to_owned() },
            );
            if replied {
                lead.replied_at = Some(now);
            }
            store.insert_if_absent(&lead).await.expect("insert");
        }

        let query = LeadQuery::new(LeadStatus::Email1Sent, 10)
            .excluding_replied()
            .sent_before(EmailStep::First, now - Duration::days(3));
        let selected = store.select(&query).await.expect("select");
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].email, "old@x.com");
    }
}
