//! Inbound signal receivers.
//!
//! - `POST /webhooks/reply`: an email reply from a lead
//! - `POST /webhooks/meeting-booked`: a meeting was booked for a lead
//! - `POST /webhooks/meeting-scheduled`: the calendar confirmed the booking
//! - `POST /webhooks/meeting-outcome`: how the meeting went
//!
//! Bodies are small JSON documents. When a webhook secret is configured every
//! request must carry `X-Outreach-Signature: sha256=<hex HMAC-SHA256 of the body>`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use outreach_core::domain::reply::{InboundReply, MeetingOutcome};
use outreach_core::errors::{ApplicationError, InterfaceError, PreconditionError};
use outreach_core::pipeline::{Pipeline, StageOutcome};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, warn};
use uuid::Uuid;

pub const SIGNATURE_HEADER: &str = "x-outreach-signature";

#[derive(Clone)]
pub struct WebhookState {
    pipeline: Arc<Pipeline>,
    secret: Option<SecretString>,
}

impl WebhookState {
    pub fn new(pipeline: Arc<Pipeline>, secret: Option<SecretString>) -> Self {
        Self { pipeline, secret }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    #[serde(alias = "from")]
    pub from_email: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default, alias = "text")]
    pub body: String,
    pub received_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct MeetingBookedRequest {
    pub email: String,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct MeetingScheduledRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct MeetingOutcomeRequest {
    pub email: String,
    pub outcome: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookError {
    pub error: String,
    pub detail: String,
    pub correlation_id: String,
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhooks/reply", post(reply_received))
        .route("/webhooks/meeting-booked", post(meeting_booked))
        .route("/webhooks/meeting-scheduled", post(meeting_scheduled))
        .route("/webhooks/meeting-outcome", post(meeting_outcome))
        .with_state(state)
}

type HandlerResult = Result<Json<WebhookResponse>, Response>;

async fn reply_received(State(state): State<WebhookState>, headers: HeaderMap, body: Bytes) -> HandlerResult {
    let correlation_id = Uuid::new_v4().to_string();
    let request: ReplyRequest = authenticate_and_parse(&state, &headers, &body, &correlation_id)?;
    let reply = InboundReply {
        from_email: request.from_email,
        subject: request.subject,
        body: request.body,
        received_at: request.received_at.unwrap_or_else(|| state.pipeline.now()),
    };

    let handled = state
        .pipeline
        .handle_reply(&reply)
        .await
        .map_err(|error| application_error(error, &correlation_id))?;
    info!(
        event_name = "server.webhook.reply",
        correlation_id = %correlation_id,
        category = handled.classification.category.as_str(),
        "reply webhook handled"
    );

    let mut response = outcome_response(handled.outcome, &correlation_id)?;
    response.category = Some(handled.classification.category.as_str().to_string());
    Ok(Json(response))
}

async fn meeting_booked(State(state): State<WebhookState>, headers: HeaderMap, body: Bytes) -> HandlerResult {
    let correlation_id = Uuid::new_v4().to_string();
    let request: MeetingBookedRequest = authenticate_and_parse(&state, &headers, &body, &correlation_id)?;
    let outcome = state
        .pipeline
        .meeting_booked(&request.email, request.scheduled_at)
        .await
        .map_err(|error| application_error(error, &correlation_id))?;
    outcome_response(outcome, &correlation_id).map(Json)
}

async fn meeting_scheduled(State(state): State<WebhookState>, headers: HeaderMap, body: Bytes) -> HandlerResult {
    let correlation_id = Uuid::new_v4().to_string();
    let request: MeetingScheduledRequest =
        authenticate_and_parse(&state, &headers, &body, &correlation_id)?;
    let outcome = state
        .pipeline
        .meeting_confirmed(&request.email)
        .await
        .map_err(|error| application_error(error, &correlation_id))?;
    outcome_response(outcome, &correlation_id).map(Json)
}

async fn meeting_outcome(State(state): State<WebhookState>, headers: HeaderMap, body: Bytes) -> HandlerResult {
    let correlation_id = Uuid::new_v4().to_string();
    let request: MeetingOutcomeRequest = authenticate_and_parse(&state, &headers, &body, &correlation_id)?;
    let outcome = MeetingOutcome::parse(&request.outcome).ok_or_else(|| {
        error_response(
            StatusCode::BAD_REQUEST,
            "invalid_outcome",
            format!(
                "unknown meeting outcome `{}` (expected completed|converted|no_show|rescheduled|lost)",
                request.outcome
            ),
            &correlation_id,
        )
    })?;
    let result = state
        .pipeline
        .meeting_outcome(&request.email, outcome)
        .await
        .map_err(|error| application_error(error, &correlation_id))?;
    outcome_response(result, &correlation_id).map(Json)
}

fn authenticate_and_parse<T: DeserializeOwned>(
    state: &WebhookState,
    headers: &HeaderMap,
    body: &[u8],
    correlation_id: &str,
) -> Result<T, Response> {
    if let Some(secret) = &state.secret {
        let signature = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());
        if !signature.is_some_and(|signature| verify_signature(secret, body, signature)) {
            warn!(event_name = "server.webhook.unauthorized", correlation_id = %correlation_id);
            return Err(error_response(
                StatusCode::UNAUTHORIZED,
                "invalid_signature",
                "missing or invalid webhook signature".to_string(),
                correlation_id,
            ));
        }
    }

    serde_json::from_slice(body).map_err(|error| {
        error_response(StatusCode::BAD_REQUEST, "invalid_body", error.to_string(), correlation_id)
    })
}

/// Accepts `sha256=<hex>` or a bare hex digest.
pub fn verify_signature(secret: &SecretString, body: &[u8], signature: &str) -> bool {
    let hex = signature.trim().strip_prefix("sha256=").unwrap_or(signature.trim());
    let Some(expected) = decode_hex(hex) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.expose_secret().as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
pub fn sign(secret: &SecretString, body: &[u8]) -> String {
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.expose_secret().as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    format!("sha256={hex}")
}

fn decode_hex(value: &str) -> Option<Vec<u8>> {
    if value.len() % 2 != 0 {
        return None;
    }
    (0..value.len())
        .step_by(2)
        .map(|index| value.get(index..index + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

fn outcome_response(outcome: StageOutcome, correlation_id: &str) -> Result<WebhookResponse, Response> {
    match outcome {
        StageOutcome::Advanced(lead) => Ok(WebhookResponse {
            status: "advanced",
            lead_status: Some(lead.status.as_str().to_string()),
            category: None,
            detail: format!("{} is now {}", lead.email, lead.status),
        }),
        StageOutcome::Skipped(reason) => {
            Ok(WebhookResponse { status: "skipped", lead_status: None, category: None, detail: reason })
        }
        StageOutcome::Rejected(PreconditionError::NotFound(email)) => Err(error_response(
            StatusCode::NOT_FOUND,
            "lead_not_found",
            format!("no lead found for {email}"),
            correlation_id,
        )),
        StageOutcome::Rejected(error) => {
            Err(error_response(StatusCode::CONFLICT, "precondition_failed", error.to_string(), correlation_id))
        }
        StageOutcome::Failed(message) => {
            Err(error_response(StatusCode::BAD_GATEWAY, "collaborator_failed", message, correlation_id))
        }
    }
}

fn application_error(error: ApplicationError, correlation_id: &str) -> Response {
    let interface = error.into_interface(correlation_id);
    let (status, class) = match &interface {
        InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
        InterfaceError::NotFound { .. } => (StatusCode::NOT_FOUND, "lead_not_found"),
        InterfaceError::ServiceUnavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable"),
        InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    warn!(
        event_name = "server.webhook.failed",
        correlation_id = %interface.correlation_id(),
        error = %interface,
        "webhook request failed"
    );
    error_response(status, class, interface.user_message().to_string(), correlation_id)
}

fn error_response(status: StatusCode, error: &str, detail: String, correlation_id: &str) -> Response {
    let body = WebhookError {
        error: error.to_string(),
        detail,
        correlation_id: correlation_id.to_string(),
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use outreach_core::domain::lead::LeadStatus;
    use outreach_core::store::LeadStore;
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{router, sign, verify_signature, WebhookState, SIGNATURE_HEADER};
    use crate::test_support::TestPipeline;

    fn app(fixture: &TestPipeline, secret: Option<&str>) -> Router {
        let secret = secret.map(|value| SecretString::from(value.to_string()));
        router(WebhookState::new(Arc::new(fixture.pipeline()), secret))
    }

    async fn post(app: Router, path: &str, body: Value, signature: Option<String>) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        let request = request.body(Body::from(body.to_string())).expect("request");
        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn reply_webhook_moves_lead_to_engaged() {
        let fixture = TestPipeline::new();
        fixture.seed_sent("ada@example.com").await;

        let (status, body) = post(
            app(&fixture, None),
            "/webhooks/reply",
            json!({ "from": "Ada@Example.com", "subject": "Re: hi", "body": "Tell me more" }),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "advanced");
        assert_eq!(body["category"], "interested");
        assert_eq!(body["lead_status"], "engaged");
        let lead = fixture.store.find_by_email("ada@example.com").await.expect("find").expect("lead");
        assert_eq!(lead.status, LeadStatus::Engaged);
    }

    #[tokio::test]
    async fn unknown_lead_is_not_found_and_bad_json_is_rejected() {
        let fixture = TestPipeline::new();

        let (status, body) = post(
            app(&fixture, None),
            "/webhooks/meeting-booked",
            json!({ "email": "nobody@example.com", "scheduled_at": "2026-03-04T15:00:00Z" }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));

        let (status, body) =
            post(app(&fixture, None), "/webhooks/meeting-booked", json!({ "email": 42 }), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_body");
    }

    #[tokio::test]
    async fn meeting_hooks_walk_booking_to_conversion() {
        let fixture = TestPipeline::new();
        fixture.seed_engaged("grace@example.com").await;

        let (status, body) = post(
            app(&fixture, None),
            "/webhooks/meeting-booked",
            json!({ "email": "grace@example.com", "scheduled_at": "2026-03-04T15:00:00Z" }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lead_status"], "meeting_booked");

        let (status, body) = post(
            app(&fixture, None),
            "/webhooks/meeting-scheduled",
            json!({ "email": "grace@example.com" }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lead_status"], "meeting_scheduled");

        let (status, _) = post(
            app(&fixture, None),
            "/webhooks/meeting-outcome",
            json!({ "email": "grace@example.com", "outcome": "maybe" }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = post(
            app(&fixture, None),
            "/webhooks/meeting-outcome",
            json!({ "email": "grace@example.com", "outcome": "converted" }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lead_status"], "converted");
    }

    #[tokio::test]
    async fn signed_webhooks_require_a_valid_signature() {
        let fixture = TestPipeline::new();
        fixture.seed_engaged("grace@example.com").await;
        let payload = json!({ "email": "grace@example.com", "scheduled_at": "2026-03-04T15:00:00Z" });

        let (status, body) =
            post(app(&fixture, Some("s3cret")), "/webhooks/meeting-booked", payload.clone(), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_signature");

        let signature = sign(&SecretString::from("s3cret".to_string()), payload.to_string().as_bytes());
        let (status, _) =
            post(app(&fixture, Some("s3cret")), "/webhooks/meeting-booked", payload, Some(signature)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn signature_verification_rejects_tampering() {
        let secret = SecretString::from("key".to_string());
        let signature = sign(&secret, b"{\"a\":1}");
        assert!(signature.starts_with("sha256="));
        assert!(verify_signature(&secret, b"{\"a\":1}", &signature));
        assert!(!verify_signature(&secret, b"{\"a\":2}", &signature));
        assert!(!verify_signature(&secret, b"{\"a\":1}", "sha256=zz"));
    }
}
