//! Shared reqwest plumbing for the HTTP backends.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::BackendError;

pub(crate) fn client(timeout: Duration) -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| BackendError::unavailable(format!("failed to build HTTP client: {e}")))
}

/// Send a request. Transport failures and 5xx answers are `Unavailable`;
/// every other status is handed back for the caller to interpret.
pub(crate) async fn send(request: RequestBuilder) -> Result<Response, BackendError> {
    let response = request
        .send()
        .await
        .map_err(|e| BackendError::unavailable(e.to_string()))?;
    let status = response.status();
    if status.is_server_error() {
        tracing::warn!(%status, url = %response.url(), "backend server error");
        return Err(BackendError::unavailable(format!("server returned {status}")));
    }
    Ok(response)
}

pub(crate) async fn json<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    response.json::<T>().await.map_err(BackendError::decode)
}

/// Map a non-success status nobody handled specifically.
pub(crate) async fn unexpected(response: Response) -> BackendError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => BackendError::Validation(body),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Rejected,
        StatusCode::NOT_FOUND => BackendError::NotFound,
        StatusCode::CONFLICT => BackendError::Conflict(body),
        other => BackendError::unavailable(format!("unexpected status {other}: {body}")),
    }
}

pub(crate) fn join(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}
