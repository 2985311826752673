use std::time::Duration;

use async_trait::async_trait;
use outreach_agent::http::{check_status, transport_error};
use outreach_core::config::ScraperConfig;
use outreach_core::domain::contact::{RawContact, SearchCriteria, SearchResult};
use outreach_core::errors::IntegrationError;
use outreach_core::ports::LeadSource;
use outreach_core::retry::{with_retry, RetryPolicy};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

const SERVICE: &str = "scraper";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct ActorInput<'a> {
    #[serde(skip_serializing_if = "is_empty")]
    contact_location: &'a [String],
    #[serde(skip_serializing_if = "is_empty")]
    company_industry: &'a [String],
    #[serde(skip_serializing_if = "is_empty")]
    contact_job_title: &'a [String],
    #[serde(skip_serializing_if = "is_empty")]
    seniority_level: &'a [String],
    #[serde(skip_serializing_if = "is_empty")]
    size: &'a [String],
    email_status: [&'static str; 1],
    fetch_count: u32,
}

fn is_empty(values: &&[String]) -> bool {
    values.is_empty()
}

impl<'a> ActorInput<'a> {
    fn from_criteria(criteria: &'a SearchCriteria) -> Self {
        Self {
            contact_location: &criteria.locations,
            company_industry: &criteria.industries,
            contact_job_title: &criteria.titles,
            seniority_level: &criteria.seniorities,
            size: &criteria.company_sizes,
            email_status: ["validated"],
            fetch_count: criteria.max_results,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActorRun {
    id: String,
    status: String,
    default_dataset_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunState {
    Pending,
    Succeeded,
    Failed,
}

impl ActorRun {
    fn state(&self) -> RunState {
        match self.status.as_str() {
            "SUCCEEDED" => RunState::Succeeded,
            "FAILED" | "ABORTED" | "TIMED-OUT" | "TIMED_OUT" => RunState::Failed,
            _ => RunState::Pending,
        }
    }
}

/// One dataset item. Field names vary between actor versions.
#[derive(Debug, Default, Deserialize)]
struct DatasetItem {
    #[serde(default)]
    email: Option<String>,
    #[serde(default, alias = "fullName", alias = "name")]
    full_name: Option<String>,
    #[serde(default, alias = "firstName")]
    first_name: Option<String>,
    #[serde(default, alias = "lastName")]
    last_name: Option<String>,
    #[serde(default, alias = "linkedinUrl", alias = "linkedin_url")]
    linkedin: Option<String>,
    #[serde(default, alias = "companyName", alias = "company")]
    company_name: Option<String>,
    #[serde(default, alias = "jobTitle", alias = "title")]
    job_title: Option<String>,
    #[serde(default, alias = "company_industry")]
    industry: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default, alias = "state")]
    region: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default, alias = "seniority")]
    seniority_level: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

impl From<DatasetItem> for RawContact {
    fn from(item: DatasetItem) -> Self {
        let name = non_empty(item.full_name).or_else(|| {
            let joined = [item.first_name, item.last_name]
                .into_iter()
                .flatten()
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            non_empty(Some(joined))
        });
        let location = match (non_empty(item.city), non_empty(item.region)) {
            (Some(city), Some(region)) => Some(format!("{city}, {region}")),
            (city, region) => city.or(region),
        };

        RawContact {
            email: non_empty(item.email),
            name,
            profile_url: non_empty(item.linkedin),
            company: non_empty(item.company_name),
            title: non_empty(item.job_title),
            industry: non_empty(item.industry),
            location,
            country: non_empty(item.country),
            seniority: non_empty(item.seniority_level),
        }
    }
}

/// Lead source backed by a hosted scraping actor: start a run, poll until it
/// settles, then read the run's dataset.
pub struct ActorLeadSource {
    base_url: String,
    api_token: SecretString,
    actor_id: String,
    poll_interval: Duration,
    max_wait: Duration,
    start_retry: RetryPolicy,
    client: reqwest::Client,
}

impl ActorLeadSource {
    pub fn from_config(config: &ScraperConfig) -> Result<Self, IntegrationError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| IntegrationError::Rejected(format!("scraper client: {error}")))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            actor_id: config.actor_id.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            max_wait: Duration::from_secs(config.max_wait_secs),
            start_retry: RetryPolicy::scraper_start(),
            client,
        })
    }

    pub fn with_start_retry(mut self, policy: RetryPolicy) -> Self {
        self.start_retry = policy;
        self
    }

    pub fn with_polling(mut self, poll_interval: Duration, max_wait: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.max_wait = max_wait;
        self
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: String) -> Result<T, IntegrationError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(self.api_token.expose_secret())
            .send()
            .await
            .map_err(|error| transport_error(SERVICE, error))?;
        let response = check_status(SERVICE, response).await?;
        response.json().await.map_err(|error| transport_error(SERVICE, error))
    }

    async fn start_run(&self, criteria: &SearchCriteria) -> Result<ActorRun, IntegrationError> {
        let input = ActorInput::from_criteria(criteria);
        let url = format!("{}/acts/{}/runs", self.base_url, self.actor_id);
        let response = self
            .client
            .post(url)
            .bearer_auth(self.api_token.expose_secret())
            .json(&input)
            .send()
            .await
            .map_err(|error| transport_error(SERVICE, error))?;
        let response = check_status(SERVICE, response).await?;
        let envelope: Envelope<ActorRun> =
            response.json().await.map_err(|error| transport_error(SERVICE, error))?;
        Ok(envelope.data)
    }

    async fn wait_for_run(&self, mut run: ActorRun) -> Result<ActorRun, IntegrationError> {
        let deadline = tokio::time::Instant::now() + self.max_wait;
        loop {
            match run.state() {
                RunState::Succeeded => return Ok(run),
                RunState::Failed => {
                    return Err(IntegrationError::Rejected(format!(
                        "{SERVICE}: run {} ended with status {}",
                        run.id, run.status
                    )))
                }
                RunState::Pending => {}
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(IntegrationError::Timeout(format!(
                    "{SERVICE}: run {} still {} after {}s",
                    run.id,
                    run.status,
                    self.max_wait.as_secs()
                )));
            }
            tokio::time::sleep(self.poll_interval).await;
            let envelope: Envelope<ActorRun> =
                self.get_json(format!("{}/actor-runs/{}", self.base_url, run.id)).await?;
            debug!(event_name = "scraper.run.polled", run_id = %envelope.data.id, status = %envelope.data.status);
            run = envelope.data;
        }
    }
}

#[async_trait]
impl LeadSource for ActorLeadSource {
    async fn search(&self, criteria: &SearchCriteria) -> Result<SearchResult, IntegrationError> {
        let run = with_retry(&self.start_retry, "scraper.start", || self.start_run(criteria)).await?;
        info!(event_name = "scraper.run.started", run_id = %run.id, actor = %self.actor_id);

        let run = self.wait_for_run(run).await?;
        let dataset_id = run.default_dataset_id.ok_or_else(|| {
            IntegrationError::InvalidResponse(format!("{SERVICE}: run {} has no dataset", run.id))
        })?;

        let items: Vec<Value> = self
            .get_json(format!("{}/datasets/{dataset_id}/items?format=json&clean=true", self.base_url))
            .await?;
        let total_found = u32::try_from(items.len()).unwrap_or(u32::MAX);
        let contacts = items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<DatasetItem>(item).ok())
            .map(RawContact::from)
            .collect::<Vec<_>>();

        info!(event_name = "scraper.run.finished", run_id = %run.id, total_found, usable = contacts.len());
        Ok(SearchResult { total_found, contacts })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use outreach_core::config::ScraperConfig;
    use outreach_core::domain::contact::{RawContact, SearchCriteria};
    use outreach_core::errors::IntegrationError;
    use outreach_core::ports::LeadSource;
    use outreach_core::retry::RetryPolicy;
    use serde_json::{json, Value};

    use super::{ActorLeadSource, DatasetItem};
    use crate::test_support::serve;

    #[derive(Clone, Default)]
    struct FakeActor {
        start_calls: Arc<AtomicU32>,
        polls: Arc<AtomicU32>,
        fail_first_start: bool,
        final_status: &'static str,
    }

    async fn start(State(actor): State<FakeActor>, Json(input): Json<Value>) -> axum::response::Response {
        let call = actor.start_calls.fetch_add(1, Ordering::SeqCst);
        if actor.fail_first_start && call == 0 {
            return (StatusCode::BAD_GATEWAY, "try again").into_response();
        }
        assert_eq!(input["contact_job_title"], json!(["CTO"]));
        assert!(input.get("company_industry").is_none());
        Json(json!({ "data": { "id": "run-1", "status": "RUNNING", "defaultDatasetId": "ds-1" } }))
            .into_response()
    }

    async fn poll(State(actor): State<FakeActor>, Path(run_id): Path<String>) -> Json<Value> {
        let polls = actor.polls.fetch_add(1, Ordering::SeqCst);
        let status = if polls == 0 { "RUNNING" } else { actor.final_status };
        Json(json!({ "data": { "id": run_id, "status": status, "defaultDatasetId": "ds-1" } }))
    }

    async fn items() -> Json<Value> {
        Json(json!([
            {
                "email": "ada@example.com",
                "first_name": "Ada",
                "last_name": "Lovelace",
                "linkedin": "https://linkedin.com/in/ada",
                "company_name": "Analytical Engines",
                "job_title": "CTO",
                "city": "London",
                "country": "United Kingdom"
            },
            { "fullName": "No Email" }
        ]))
    }

    async fn source(actor: FakeActor) -> ActorLeadSource {
        let router = Router::new()
            .route("/acts/{actor}/runs", post(start))
            .route("/actor-runs/{run}", get(poll))
            .route("/datasets/{dataset}/items", get(items))
            .with_state(actor);
        let base_url = serve(router).await;
        let config = ScraperConfig {
            api_token: "apify_test".to_string().into(),
            base_url,
            actor_id: "leads~finder".to_string(),
            poll_interval_secs: 1,
            max_wait_secs: 60,
        };
        ActorLeadSource::from_config(&config)
            .expect("source")
            .with_start_retry(RetryPolicy::new(2, Duration::from_millis(5)))
            .with_polling(Duration::from_millis(5), Duration::from_secs(5))
    }

    fn criteria() -> SearchCriteria {
        SearchCriteria { titles: vec!["CTO".to_string()], max_results: 25, ..SearchCriteria::default() }
    }

    #[tokio::test]
    async fn search_polls_until_done_and_maps_dataset_items() {
        let actor = FakeActor { fail_first_start: true, final_status: "SUCCEEDED", ..FakeActor::default() };
        let source = source(actor.clone()).await;

        let result = source.search(&criteria()).await.expect("search");
        assert_eq!(actor.start_calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.total_found, 2);
        assert_eq!(result.contacts.len(), 2);

        let ada = &result.contacts[0];
        assert_eq!(ada.name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(ada.profile_url.as_deref(), Some("https://linkedin.com/in/ada"));
        assert_eq!(ada.location.as_deref(), Some("London"));
        assert!(result.contacts[1].usable_email().is_none());
    }

    #[tokio::test]
    async fn failed_run_is_reported() {
        let actor = FakeActor { final_status: "FAILED", ..FakeActor::default() };
        let source = source(actor).await;

        let error = source.search(&criteria()).await.expect_err("failed run");
        assert!(matches!(error, IntegrationError::Rejected(message) if message.contains("FAILED")));
    }

    #[test]
    fn dataset_item_accepts_camel_case_fields() {
        let item: DatasetItem = serde_json::from_value(json!({
            "email": " grace@navy.mil ",
            "fullName": "Grace Hopper",
            "companyName": "US Navy",
            "jobTitle": "Rear Admiral",
            "state": "Virginia"
        }))
        .expect("item");
        let contact = RawContact::from(item);
        assert_eq!(contact.email.as_deref(), Some("grace@navy.mil"));
        assert_eq!(contact.company.as_deref(), Some("US Navy"));
        assert_eq!(contact.location.as_deref(), Some("Virginia"));
    }
}
