use async_trait::async_trait;
use outreach_core::chrono::{DateTime, SecondsFormat, Utc};
use outreach_core::domain::event::PipelineEvent;
use outreach_core::domain::lead::LeadId;
use outreach_core::errors::StoreError;
use outreach_core::events::EventSink;
use sqlx::{sqlite::SqliteRow, Row};

use super::RepositoryError;
use crate::DbPool;

/// Append-only writer for `lead_event`.
#[derive(Clone)]
pub struct SqlEventRepository {
    pool: DbPool,
}

impl SqlEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn list_for_lead(&self, lead_id: &LeadId) -> Result<Vec<PipelineEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT lead_id, event_type, event_data, created_at
             FROM lead_event
             WHERE lead_id = ?
             ORDER BY id ASC",
        )
        .bind(&lead_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(event_from_row).collect()
    }

    /// Most recent events first, across all leads and system runs.
    pub async fn recent(&self, limit: u32) -> Result<Vec<PipelineEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT lead_id, event_type, event_data, created_at
             FROM lead_event
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(event_from_row).collect()
    }

    async fn insert(&self, event: &PipelineEvent) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO lead_event (lead_id, event_type, event_data, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(event.lead_id.as_ref().map(|id| id.0.clone()))
        .bind(&event.event_type)
        .bind(event.event_data.to_string())
        .bind(event.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl EventSink for SqlEventRepository {
    async fn append(&self, event: &PipelineEvent) -> Result<(), StoreError> {
        Ok(self.insert(event).await?)
    }
}

fn event_from_row(row: SqliteRow) -> Result<PipelineEvent, RepositoryError> {
    let raw_data = row.try_get::<String, _>("event_data")?;
    let event_data = serde_json::from_str(&raw_data)
        .map_err(|error| RepositoryError::Decode(format!("invalid event_data json: {error}")))?;
    let created_raw = row.try_get::<String, _>("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| {
            RepositoryError::Decode(format!("invalid timestamp in `created_at`: `{created_raw}` ({error})"))
        })?;

    Ok(PipelineEvent {
        lead_id: row.try_get::<Option<String>, _>("lead_id")?.map(LeadId),
        event_type: row.try_get("event_type")?,
        event_data,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use outreach_core::domain::event::PipelineEvent;
    use outreach_core::domain::lead::Lead;
    use outreach_core::events::EventSink;
    use outreach_core::store::LeadStore;
    use serde_json::json;

    use super::SqlEventRepository;
    use crate::repositories::SqlLeadRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    #[tokio::test]
    async fn lead_and_system_events_are_appended_in_order() {
        let pool = setup_pool().await;
        let at = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).single().expect("valid time");
        let lead = Lead::discovered("ada@example.com", "Ada", at);
        SqlLeadRepository::new(pool.clone()).insert_if_absent(&lead).await.expect("insert lead");

        let events = SqlEventRepository::new(pool.clone());
        events
            .append(&PipelineEvent::for_lead(&lead.id, "lead_discovered", json!({"source": "test"}), at))
            .await
            .expect("append lead event");
        events
            .append(&PipelineEvent::for_lead(&lead.id, "research_completed", json!({}), at))
            .await
            .expect("append second lead event");
        events
            .append(&PipelineEvent::system("pipeline_run", json!({"processed": 1}), at))
            .await
            .expect("append system event");

        let for_lead = events.list_for_lead(&lead.id).await.expect("list lead events");
        let types: Vec<&str> = for_lead.iter().map(|event| event.event_type.as_str()).collect();
        assert_eq!(types, vec!["lead_discovered", "research_completed"]);
        assert_eq!(for_lead[0].event_data, json!({"source": "test"}));
        assert_eq!(for_lead[0].created_at, at);

        let recent = events.recent(1).await.expect("recent events");
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].event_type, "pipeline_run");
        assert!(recent[0].lead_id.is_none());

        pool.close().await;
    }
}
