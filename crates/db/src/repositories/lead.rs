use std::collections::BTreeMap;

use async_trait::async_trait;
use outreach_core::chrono::{DateTime, SecondsFormat, Utc};
use outreach_core::domain::lead::{
    Deliveries, Delivery, EmailDraft, EmailSequence, EmailStep, Lead, LeadId, LeadStatus,
    TimezoneBucket,
};
use outreach_core::domain::reply::{MeetingOutcome, ReplyCategory, Sentiment};
use outreach_core::errors::StoreError;
use outreach_core::store::{LeadQuery, LeadStore};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{QueryBuilder, Row};
use tracing::debug;

use super::RepositoryError;
use crate::DbPool;

/// Every column a stage may change, in bind order.
const MUTABLE_COLUMNS: &[&str] = &[
    "email",
    "profile_url",
    "name",
    "company",
    "title",
    "industry",
    "location",
    "country",
    "seniority",
    "status",
    "research_json",
    "researched_at",
    "email_1_subject",
    "email_1_body",
    "email_2_subject",
    "email_2_body",
    "email_3_subject",
    "email_3_body",
    "sender",
    "timezone_bucket",
    "email_1_sent_at",
    "email_1_message_id",
    "email_2_sent_at",
    "email_2_message_id",
    "email_3_sent_at",
    "email_3_message_id",
    "replied_at",
    "reply_category",
    "reply_sentiment",
    "meeting_at",
    "meeting_outcome",
    "error_count",
    "last_error",
    "last_error_at",
    "updated_at",
];

const SELECT_LEAD: &str = "SELECT
    id, email, profile_url, name, company, title, industry, location, country, seniority,
    status, research_json, researched_at,
    email_1_subject, email_1_body, email_2_subject, email_2_body, email_3_subject, email_3_body,
    sender, timezone_bucket,
    email_1_sent_at, email_1_message_id, email_2_sent_at, email_2_message_id,
    email_3_sent_at, email_3_message_id,
    replied_at, reply_category, reply_sentiment, meeting_at, meeting_outcome,
    error_count, last_error, last_error_at, version, created_at, updated_at
 FROM lead";

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Lead table access. Updates are conditional on the version the caller read,
/// so two workers claiming the same lead cannot both commit.
#[derive(Clone)]
pub struct SqlLeadRepository {
    pool: DbPool,
}

impl SqlLeadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        value: String,
    ) -> Result<Option<Lead>, RepositoryError> {
        let sql = format!("{SELECT_LEAD} WHERE {clause}");
        let row = sqlx::query(&sql).bind(value).fetch_optional(&self.pool).await?;
        row.map(lead_from_row).transpose()
    }

    async fn exists(&self, id: &LeadId) -> Result<bool, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lead WHERE id = ?")
            .bind(&id.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn insert_row(&self, lead: &Lead) -> Result<bool, RepositoryError> {
        let columns = MUTABLE_COLUMNS.join(", ");
        let placeholders = vec!["?"; MUTABLE_COLUMNS.len() + 3].join(", ");
        let sql = format!(
            "INSERT OR IGNORE INTO lead (id, {columns}, version, created_at) VALUES ({placeholders})"
        );
        let query = sqlx::query(&sql).bind(lead.id.0.clone());
        let result = bind_mutable(query, lead)?
            .bind(i64::from(lead.version))
            .bind(timestamp(lead.created_at))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_row(&self, lead: &Lead) -> Result<u64, RepositoryError> {
        let assignments =
            MUTABLE_COLUMNS.iter().map(|column| format!("{column} = ?")).collect::<Vec<_>>();
        let sql = format!(
            "UPDATE lead SET {}, version = version + 1 WHERE id = ? AND version = ?",
            assignments.join(", ")
        );
        let result = bind_mutable(sqlx::query(&sql), lead)?
            .bind(lead.id.0.clone())
            .bind(i64::from(lead.version))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn select_rows(&self, query: &LeadQuery) -> Result<Vec<Lead>, RepositoryError> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_LEAD);
        builder.push(" WHERE status = ").push_bind(query.status.as_str());
        if let Some(threshold) = query.max_error_count {
            builder.push(" AND error_count < ").push_bind(i64::from(threshold));
        }
        if query.exclude_replied {
            builder.push(" AND replied_at IS NULL");
        }
        if let Some((step, cutoff)) = query.sent_before {
            let column = sent_at_column(step);
            builder.push(format!(" AND {column} IS NOT NULL AND {column} < "));
            builder.push_bind(timestamp(cutoff));
        }
        if let Some(buckets) = &query.buckets {
            if buckets.is_empty() {
                return Ok(Vec::new());
            }
            builder.push(" AND (timezone_bucket IN (");
            {
                let mut separated = builder.separated(", ");
                for bucket in buckets {
                    separated.push_bind(bucket.as_str());
                }
            }
            builder.push(")");
            if buckets.contains(&TimezoneBucket::Local) {
                builder.push(" OR timezone_bucket IS NULL");
            }
            builder.push(")");
        }
        builder.push(" ORDER BY created_at ASC, id ASC LIMIT ").push_bind(i64::from(query.limit));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter().map(lead_from_row).collect()
    }
}

#[async_trait]
impl LeadStore for SqlLeadRepository {
    async fn find_by_id(&self, id: &LeadId) -> Result<Option<Lead>, StoreError> {
        Ok(self.fetch_one_where("id = ?", id.0.clone()).await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Lead>, StoreError> {
        let normalized = outreach_core::domain::lead::normalize_email(email);
        Ok(self.fetch_one_where("email = ?", normalized).await?)
    }

    async fn insert_if_absent(&self, lead: &Lead) -> Result<bool, StoreError> {
        let mut normalized = lead.clone();
        normalized.email = outreach_core::domain::lead::normalize_email(&lead.email);
        let inserted = self.insert_row(&normalized).await?;
        if !inserted {
            debug!(
                event_name = "db.lead.duplicate_skipped",
                email = %normalized.email,
                "lead already known"
            );
        }
        Ok(inserted)
    }

    async fn select(&self, query: &LeadQuery) -> Result<Vec<Lead>, StoreError> {
        Ok(self.select_rows(query).await?)
    }

    async fn update(&self, lead: &Lead) -> Result<Lead, StoreError> {
        if self.update_row(lead).await? == 0 {
            return if self.exists(&lead.id).await? {
                Err(StoreError::Conflict { lead_id: lead.id.to_string() })
            } else {
                Err(StoreError::NotFound(lead.id.to_string()))
            };
        }
        let mut stored = lead.clone();
        stored.version = lead.version + 1;
        Ok(stored)
    }

    async fn record_error(
        &self,
        id: &LeadId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        let count: Option<i64> = sqlx::query_scalar(
            "UPDATE lead
             SET error_count = error_count + 1,
                 last_error = ?,
                 last_error_at = ?,
                 updated_at = ?,
                 version = version + 1
             WHERE id = ?
             RETURNING error_count",
        )
        .bind(reason)
        .bind(timestamp(at))
        .bind(timestamp(at))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        match count {
            Some(count) => Ok(parse_u32("error_count", count)?),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn clear_error(
        &self,
        id: &LeadId,
        reset_to: Option<LeadStatus>,
        at: DateTime<Utc>,
    ) -> Result<Lead, StoreError> {
        let result = sqlx::query(
            "UPDATE lead
             SET error_count = 0,
                 last_error = NULL,
                 last_error_at = NULL,
                 status = COALESCE(?, status),
                 updated_at = ?,
                 version = version + 1
             WHERE id = ?",
        )
        .bind(reset_to.map(|status| status.as_str()))
        .bind(timestamp(at))
        .bind(&id.0)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.find_by_id(id).await?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn count_by_status(&self) -> Result<BTreeMap<LeadStatus, u64>, StoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM lead GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let raw = row.try_get::<String, _>("status").map_err(RepositoryError::from)?;
            let count = row.try_get::<i64, _>("count").map_err(RepositoryError::from)?;
            counts.insert(parse_status(&raw)?, u64::try_from(count).unwrap_or_default());
        }
        Ok(counts)
    }

    async fn count_quarantined(&self, threshold: u32) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lead WHERE error_count >= ?")
            .bind(i64::from(threshold))
            .fetch_one(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn find_with_errors(&self, limit: u32) -> Result<Vec<Lead>, StoreError> {
        let sql = format!(
            "{SELECT_LEAD} WHERE error_count > 0 ORDER BY error_count DESC, created_at ASC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(rows.into_iter().map(lead_from_row).collect::<Result<Vec<_>, _>>()?)
    }
}

fn bind_mutable<'q>(query: SqliteQuery<'q>, lead: &Lead) -> Result<SqliteQuery<'q>, RepositoryError> {
    let research = lead
        .research
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|error| RepositoryError::Decode(format!("research is not serializable: {error}")))?;
    let draft = |step: EmailStep| lead.sequence.as_ref().map(|sequence| sequence.draft(step).clone());
    let (first, second, third) =
        (draft(EmailStep::First), draft(EmailStep::Second), draft(EmailStep::Third));
    let delivery = |step: EmailStep| lead.deliveries.get(step).cloned();
    let (sent_1, sent_2, sent_3) =
        (delivery(EmailStep::First), delivery(EmailStep::Second), delivery(EmailStep::Third));

    Ok(query
        .bind(lead.email.clone())
        .bind(lead.profile_url.clone())
        .bind(lead.name.clone())
        .bind(lead.company.clone())
        .bind(lead.title.clone())
        .bind(lead.industry.clone())
        .bind(lead.location.clone())
        .bind(lead.country.clone())
        .bind(lead.seniority.clone())
        .bind(lead.status.as_str())
        .bind(research)
        .bind(lead.researched_at.map(timestamp))
        .bind(first.as_ref().and_then(|draft| draft.subject.clone()))
        .bind(first.map(|draft| draft.body))
        .bind(second.as_ref().and_then(|draft| draft.subject.clone()))
        .bind(second.map(|draft| draft.body))
        .bind(third.as_ref().and_then(|draft| draft.subject.clone()))
        .bind(third.map(|draft| draft.body))
        .bind(lead.sender.clone())
        .bind(lead.timezone_bucket.map(|bucket| bucket.as_str()))
        .bind(sent_1.as_ref().map(|delivery| timestamp(delivery.sent_at)))
        .bind(sent_1.map(|delivery| delivery.message_id))
        .bind(sent_2.as_ref().map(|delivery| timestamp(delivery.sent_at)))
        .bind(sent_2.map(|delivery| delivery.message_id))
        .bind(sent_3.as_ref().map(|delivery| timestamp(delivery.sent_at)))
        .bind(sent_3.map(|delivery| delivery.message_id))
        .bind(lead.replied_at.map(timestamp))
        .bind(lead.reply_category.map(|category| category.as_str()))
        .bind(lead.reply_sentiment.map(|sentiment| sentiment.as_str()))
        .bind(lead.meeting_at.map(timestamp))
        .bind(lead.meeting_outcome.map(|outcome| outcome.as_str()))
        .bind(i64::from(lead.error_count))
        .bind(lead.last_error.clone())
        .bind(lead.last_error_at.map(timestamp))
        .bind(timestamp(lead.updated_at)))
}

fn lead_from_row(row: SqliteRow) -> Result<Lead, RepositoryError> {
    let status = parse_status(&row.try_get::<String, _>("status")?)?;
    let research = row
        .try_get::<Option<String>, _>("research_json")?
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|error| RepositoryError::Decode(format!("invalid research_json: {error}")))?;

    let sequence = match row.try_get::<Option<String>, _>("email_1_body")? {
        Some(email_1_body) => Some(EmailSequence {
            email_1: EmailDraft::new(row.try_get("email_1_subject")?, email_1_body),
            email_2: EmailDraft::new(
                row.try_get("email_2_subject")?,
                row.try_get::<Option<String>, _>("email_2_body")?.unwrap_or_default(),
            ),
            email_3: EmailDraft::new(
                row.try_get("email_3_subject")?,
                row.try_get::<Option<String>, _>("email_3_body")?.unwrap_or_default(),
            ),
        }),
        None => None,
    };

    let mut deliveries = Deliveries::default();
    for step in EmailStep::ALL {
        let sent_column = sent_at_column(step);
        let id_column = message_id_column(step);
        if let Some(sent_at) = parse_optional_timestamp(sent_column, row.try_get(sent_column)?)? {
            let message_id = row.try_get::<Option<String>, _>(id_column)?.unwrap_or_default();
            deliveries.set(step, Delivery { sent_at, message_id });
        }
    }

    Ok(Lead {
        id: LeadId(row.try_get("id")?),
        email: row.try_get("email")?,
        profile_url: row.try_get("profile_url")?,
        name: row.try_get("name")?,
        company: row.try_get("company")?,
        title: row.try_get("title")?,
        industry: row.try_get("industry")?,
        location: row.try_get("location")?,
        country: row.try_get("country")?,
        seniority: row.try_get("seniority")?,
        status,
        research,
        researched_at: parse_optional_timestamp("researched_at", row.try_get("researched_at")?)?,
        sequence,
        sender: row.try_get("sender")?,
        timezone_bucket: parse_optional(
            "timezone_bucket",
            row.try_get("timezone_bucket")?,
            TimezoneBucket::parse,
        )?,
        deliveries,
        replied_at: parse_optional_timestamp("replied_at", row.try_get("replied_at")?)?,
        reply_category: parse_optional(
            "reply_category",
            row.try_get("reply_category")?,
            ReplyCategory::parse,
        )?,
        reply_sentiment: parse_optional(
            "reply_sentiment",
            row.try_get("reply_sentiment")?,
            Sentiment::parse,
        )?,
        meeting_at: parse_optional_timestamp("meeting_at", row.try_get("meeting_at")?)?,
        meeting_outcome: parse_optional(
            "meeting_outcome",
            row.try_get("meeting_outcome")?,
            MeetingOutcome::parse,
        )?,
        error_count: parse_u32("error_count", row.try_get("error_count")?)?,
        last_error: row.try_get("last_error")?,
        last_error_at: parse_optional_timestamp("last_error_at", row.try_get("last_error_at")?)?,
        version: parse_u32("version", row.try_get("version")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn sent_at_column(step: EmailStep) -> &'static str {
    match step {
        EmailStep::First => "email_1_sent_at",
        EmailStep::Second => "email_2_sent_at",
        EmailStep::Third => "email_3_sent_at",
    }
}

fn message_id_column(step: EmailStep) -> &'static str {
    match step {
        EmailStep::First => "email_1_message_id",
        EmailStep::Second => "email_2_message_id",
        EmailStep::Third => "email_3_message_id",
    }
}

/// Fixed-width UTC so lexical order in SQL matches chronological order.
fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_status(raw: &str) -> Result<LeadStatus, RepositoryError> {
    LeadStatus::parse(raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown lead status `{raw}`")))
}

fn parse_optional<T>(
    column: &str,
    value: Option<String>,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, RepositoryError> {
    value
        .map(|raw| {
            parse(&raw).ok_or_else(|| {
                RepositoryError::Decode(format!("unknown value in `{column}`: `{raw}`"))
            })
        })
        .transpose()
}

fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use outreach_core::domain::lead::{
        Delivery, EmailDraft, EmailSequence, EmailStep, Lead, LeadStatus, TimezoneBucket,
    };
    use outreach_core::domain::reply::{ReplyCategory, Sentiment};
    use outreach_core::errors::StoreError;
    use outreach_core::store::{LeadQuery, LeadStore};
    use serde_json::json;

    use super::SqlLeadRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).single().expect("valid time")
    }

    fn sample_lead(email: &str, minutes: i64) -> Lead {
        let mut lead = Lead::discovered(email, "Ada Lovelace", base_time() + Duration::minutes(minutes));
        lead.company = Some("Analytical Engines".to_string());
        lead.country = Some("United Kingdom".to_string());
        lead
    }

    fn sequenced(mut lead: Lead) -> Lead {
        lead.research = Some(json!({"summary": "ships engines", "hooks": ["difference engine"]}));
        lead.researched_at = Some(base_time());
        lead.sequence = Some(EmailSequence {
            email_1: EmailDraft::new(Some("Engines".to_string()), "Hi Ada"),
            email_2: EmailDraft::new(None, "Following up"),
            email_3: EmailDraft::new(Some("Closing the loop".to_string()), "Last note"),
        });
        lead.sender = Some("sdr@seller.test".to_string());
        lead.timezone_bucket = Some(TimezoneBucket::Europe);
        lead
    }

    #[tokio::test]
    async fn insert_dedupes_on_email_and_profile_url() {
        let pool = setup_pool().await;
        let repo = SqlLeadRepository::new(pool.clone());

        let mut first = sample_lead("Ada@Example.com", 0);
        first.profile_url = Some("https://profiles.example/ada".to_string());
        assert!(repo.insert_if_absent(&first).await.expect("insert"));

        let same_email = sample_lead("ada@example.com ", 1);
        assert!(!repo.insert_if_absent(&same_email).await.expect("dedupe email"));

        let mut same_profile = sample_lead("other@example.com", 2);
        same_profile.profile_url = Some("https://profiles.example/ada".to_string());
        assert!(!repo.insert_if_absent(&same_profile).await.expect("dedupe profile"));

        let stored = repo.find_by_email("ADA@example.com").await.expect("find").expect("present");
        assert_eq!(stored.email, "ada@example.com");
        assert_eq!(stored.status, LeadStatus::Scraped);

        pool.close().await;
    }

    #[tokio::test]
    async fn full_lead_round_trips_through_update() {
        let pool = setup_pool().await;
        let repo = SqlLeadRepository::new(pool.clone());
        let lead = sample_lead("ada@example.com", 0);
        repo.insert_if_absent(&lead).await.expect("insert");

        let mut changed = sequenced(lead.clone());
        changed.status = LeadStatus::Email1Sent;
        changed.deliveries.set(
            EmailStep::First,
            Delivery { sent_at: base_time() + Duration::hours(1), message_id: "msg-1".to_string() },
        );
        changed.reply_category = Some(ReplyCategory::Question);
        changed.reply_sentiment = Some(Sentiment::Neutral);
        changed.updated_at = base_time() + Duration::hours(1);

        let stored = repo.update(&changed).await.expect("update");
        assert_eq!(stored.version, lead.version + 1);

        let found = repo.find_by_id(&lead.id).await.expect("find").expect("present");
        assert_eq!(found, stored);

        pool.close().await;
    }

    #[tokio::test]
    async fn stale_version_is_a_conflict() {
        let pool = setup_pool().await;
        let repo = SqlLeadRepository::new(pool.clone());
        let lead = sample_lead("ada@example.com", 0);
        repo.insert_if_absent(&lead).await.expect("insert");

        let mut winner = lead.clone();
        winner.status = LeadStatus::Researched;
        winner.research = Some(json!({}));
        winner.researched_at = Some(base_time());
        repo.update(&winner).await.expect("first writer wins");

        let mut loser = lead.clone();
        loser.status = LeadStatus::Invalid;
        let error = repo.update(&loser).await.expect_err("second writer must lose");
        assert!(matches!(error, StoreError::Conflict { .. }));

        let mut missing = sample_lead("ghost@example.com", 5);
        missing.status = LeadStatus::Invalid;
        let error = repo.update(&missing).await.expect_err("unknown lead");
        assert!(matches!(error, StoreError::NotFound(_)));

        pool.close().await;
    }

    #[tokio::test]
    async fn select_filters_quarantine_replies_and_send_age() {
        let pool = setup_pool().await;
        let repo = SqlLeadRepository::new(pool.clone());
        let threshold = 3;

        let mut leads = Vec::new();
        for (index, email) in ["a@x.test", "b@x.test", "c@x.test", "d@x.test"].iter().enumerate() {
            let lead = sample_lead(email, index as i64);
            repo.insert_if_absent(&lead).await.expect("insert");
            let mut sent = sequenced(lead);
            sent.status = LeadStatus::Email1Sent;
            sent.deliveries.set(
                EmailStep::First,
                Delivery {
                    sent_at: base_time() - Duration::days(4 - index as i64),
                    message_id: format!("msg-{index}"),
                },
            );
            leads.push(repo.update(&sent).await.expect("mark sent"));
        }

        for _ in 0..threshold {
            repo.record_error(&leads[1].id, "send failed", base_time()).await.expect("error");
        }
        let mut replied = repo.find_by_id(&leads[2].id).await.expect("find").expect("present");
        replied.replied_at = Some(base_time());
        repo.update(&replied).await.expect("mark replied");

        let cutoff = base_time() - Duration::days(2);
        let query = LeadQuery::new(LeadStatus::Email1Sent, 10)
            .excluding_quarantined(threshold)
            .excluding_replied()
            .sent_before(EmailStep::First, cutoff);
        let selected = repo.select(&query).await.expect("select");
        let emails: Vec<&str> = selected.iter().map(|lead| lead.email.as_str()).collect();
        // b is quarantined, c replied, d was sent only one day ago.
        assert_eq!(emails, vec!["a@x.test"]);

        let limited = repo
            .select(&LeadQuery::new(LeadStatus::Email1Sent, 2))
            .await
            .expect("select with limit");
        let emails: Vec<&str> = limited.iter().map(|lead| lead.email.as_str()).collect();
        assert_eq!(emails, vec!["a@x.test", "b@x.test"]);

        pool.close().await;
    }

    #[tokio::test]
    async fn error_bookkeeping_and_clear() {
        let pool = setup_pool().await;
        let repo = SqlLeadRepository::new(pool.clone());
        let lead = sample_lead("ada@example.com", 0);
        repo.insert_if_absent(&lead).await.expect("insert");

        assert_eq!(repo.record_error(&lead.id, "timeout", base_time()).await.expect("first"), 1);
        assert_eq!(repo.record_error(&lead.id, "http 500", base_time()).await.expect("second"), 2);
        assert_eq!(repo.count_quarantined(2).await.expect("count"), 1);

        let with_errors = repo.find_with_errors(10).await.expect("find with errors");
        assert_eq!(with_errors.len(), 1);
        assert_eq!(with_errors[0].last_error.as_deref(), Some("http 500"));
        assert_eq!(with_errors[0].version, lead.version + 2);

        let cleared = repo
            .clear_error(&lead.id, Some(LeadStatus::Scraped), base_time())
            .await
            .expect("clear");
        assert_eq!(cleared.error_count, 0);
        assert!(cleared.last_error.is_none());
        assert_eq!(repo.count_quarantined(2).await.expect("count"), 0);

        let counts = repo.count_by_status().await.expect("counts");
        assert_eq!(counts.get(&LeadStatus::Scraped), Some(&1));

        let missing = sample_lead("ghost@example.com", 1);
        assert!(matches!(
            repo.record_error(&missing.id, "x", base_time()).await,
            Err(StoreError::NotFound(_))
        ));

        pool.close().await;
    }

    #[tokio::test]
    async fn select_narrows_to_timezone_buckets() {
        let pool = setup_pool().await;
        let repo = SqlLeadRepository::new(pool.clone());

        let buckets = [Some(TimezoneBucket::Apac), Some(TimezoneBucket::Europe), None];
        for (index, bucket) in buckets.into_iter().enumerate() {
            let lead = sample_lead(&format!("lead{index}@x.test"), index as i64);
            repo.insert_if_absent(&lead).await.expect("insert");
            let mut ready = sequenced(lead);
            ready.status = LeadStatus::Ready;
            ready.timezone_bucket = bucket;
            repo.update(&ready).await.expect("mark ready");
        }

        let select = |buckets: Vec<TimezoneBucket>| {
            let repo = &repo;
            async move {
                let query = LeadQuery::new(LeadStatus::Ready, 10).in_buckets(buckets);
                let selected = repo.select(&query).await.expect("select");
                selected.into_iter().map(|lead| lead.email).collect::<Vec<_>>()
            }
        };

        assert_eq!(select(vec![TimezoneBucket::Apac]).await, vec!["lead0@x.test"]);
        // Leads without a bucket are treated as local.
        assert_eq!(
            select(vec![TimezoneBucket::Local, TimezoneBucket::Europe]).await,
            vec!["lead1@x.test", "lead2@x.test"]
        );
        assert!(select(Vec::new()).await.is_empty());

        pool.close().await;
    }
}
