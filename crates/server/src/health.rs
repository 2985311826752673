//! `GET /health`: database reachability plus the lead queue as the pipeline sees it.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use outreach_core::pipeline::{Pipeline, QueueView};
use outreach_db::{ping, DbPool};
use serde::Serialize;
use tracing::warn;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    pipeline: Arc<Pipeline>,
}

impl HealthState {
    pub fn new(db_pool: DbPool, pipeline: Arc<Pipeline>) -> Self {
        Self { db_pool, pipeline }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DatabaseCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QueueCheck {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<QueueView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: DatabaseCheck,
    pub queue: QueueCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let queue = queue_check(&state.pipeline).await;
    let ready = database.status == "ready" && queue.status == "ready";
    if !ready {
        warn!(
            event_name = "system.health.degraded",
            database = %database.detail,
            queue = queue.detail.as_deref().unwrap_or("ok"),
            "health check degraded"
        );
    }

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        queue,
        checked_at: Utc::now().to_rfc3339(),
    };
    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> DatabaseCheck {
    match ping(pool).await {
        Ok(()) => DatabaseCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            DatabaseCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

async fn queue_check(pipeline: &Pipeline) -> QueueCheck {
    match pipeline.queue().await {
        Ok(counts) => QueueCheck { status: "ready", counts: Some(counts), detail: None },
        Err(error) => QueueCheck {
            status: "degraded",
            counts: None,
            detail: Some(format!("lead counts unavailable: {error}")),
        },
    }
}
