//! Mapping from `reqwest` failures to the pipeline's integration errors.

use outreach_core::errors::IntegrationError;
use reqwest::{Response, StatusCode};

/// Longest provider error body kept in an error message.
const MAX_ERROR_BODY: usize = 300;

pub fn transport_error(service: &str, error: reqwest::Error) -> IntegrationError {
    if error.is_timeout() {
        IntegrationError::Timeout(format!("{service}: {error}"))
    } else if error.is_decode() {
        IntegrationError::InvalidResponse(format!("{service}: {error}"))
    } else {
        IntegrationError::Network(format!("{service}: {error}"))
    }
}

pub fn status_error(service: &str, status: StatusCode, body: &str) -> IntegrationError {
    let message: String = body.chars().take(MAX_ERROR_BODY).collect();
    // 529, or a 5xx with an `overloaded_error` body, means "try again later".
    if status.as_u16() == 529 || (status.is_server_error() && body.contains("overloaded")) {
        return IntegrationError::Overloaded(format!("{service}: {message}"));
    }
    IntegrationError::Http { status: status.as_u16(), message: format!("{service}: {message}") }
}

/// Passes successful responses through and turns everything else into an error.
pub async fn check_status(service: &str, response: Response) -> Result<Response, IntegrationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(service, status, &body))
}
