//! HTTP client for the action submission API

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use url::Url;

use racketeer_shared::{GameAction, SubmitActionRequest, SubmitActionResponse};

use crate::ports::outbound::{ActionApiPort, CredentialProvider, SubmitError};

/// Default timeout for a single submission.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Submits queued actions to `/api/actions/{type}` with bearer auth.
#[derive(Clone)]
pub struct HttpActionApi {
    client: Client,
    base_url: Url,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpActionApi {
    pub fn new(
        base_url: Url,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, reqwest::Error> {
        Self::with_timeout(base_url, credentials, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Fails when the HTTP client cannot be built (TLS backend unavailable).
    pub fn with_timeout(
        base_url: Url,
        credentials: Arc<dyn CredentialProvider>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    fn endpoint(&self, action: &GameAction) -> Result<Url, SubmitError> {
        self.base_url
            .join(&action.action_type().endpoint())
            .map_err(|e| SubmitError::Rejected(format!("invalid endpoint: {e}")))
    }
}

/// Map a non-success status to the error taxonomy.
///
/// 401/403 are authentication failures, 408/429/5xx are worth retrying, any
/// other client error is the server refusing the action.
pub fn classify_status(status: StatusCode, body: String) -> SubmitError {
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        body
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SubmitError::Authentication(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            SubmitError::Transient(detail)
        }
        s if s.is_server_error() => SubmitError::Transient(detail),
        s if s.is_client_error() => SubmitError::Rejected(detail),
        _ => SubmitError::InvalidResponse(format!("unexpected status {status}")),
    }
}

#[async_trait]
impl ActionApiPort for HttpActionApi {
    async fn submit(
        &self,
        action: &GameAction,
        request: &SubmitActionRequest,
    ) -> Result<SubmitActionResponse, SubmitError> {
        let token = self
            .credentials
            .bearer_token()
            .ok_or_else(|| SubmitError::Authentication("no bearer credential".to_string()))?;
        let url = self.endpoint(action)?;

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|e| SubmitError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(%status, action_type = %action.action_type(), "Submission refused");
            return Err(classify_status(status, body));
        }

        response
            .json::<SubmitActionResponse>()
            .await
            .map_err(|e| SubmitError::InvalidResponse(e.to_string()))
    }
}
