use std::time::Duration;

use async_trait::async_trait;
use common_types::{AnonymousIdentity, AssignResponse, ErrorResponse, SessionRecord, Variant};
use reqwest::StatusCode;
use tracing::instrument;
use url::Url;

use crate::config::ExperimentClientConfig;
use crate::error::{AssignmentError, ClientSetupError, SaveError};

#[async_trait]
pub trait IdentitySource: Send + Sync {
    async fn sign_in_anonymously(&self) -> Result<AnonymousIdentity, AssignmentError>;
}

#[async_trait]
pub trait ConditionSource: Send + Sync {
    /// One balanced condition. Each successful call counts as an assignment.
    async fn assign_condition(&self, token: &str) -> Result<Variant, AssignmentError>;
}

#[async_trait]
pub trait SessionSink: Send + Sync {
    /// Returns only once the record is durably stored.
    async fn write_session(&self, token: &str, record: &SessionRecord) -> Result<(), SaveError>;
}

/// HTTP client for the condition balancer service.
#[derive(Clone)]
pub struct BalancerClient {
    http: reqwest::Client,
    sign_in_url: Url,
    assign_url: Url,
    sessions_url: Url,
}

impl BalancerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientSetupError> {
        // Without the trailing slash, join would replace the last path segment
        let base = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{base_url}/"))?
        };

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            sign_in_url: base.join("auth/anonymous")?,
            assign_url: base.join("assign-condition")?,
            sessions_url: base.join("sessions")?,
        })
    }

    pub fn from_config(config: &ExperimentClientConfig) -> Result<Self, ClientSetupError> {
        Self::new(&config.balancer_url, config.request_timeout())
    }
}

fn transport_error(e: reqwest::Error) -> String {
    if e.is_timeout() {
        tracing::warn!("balancer request timed out: {}", e);
        format!("request timed out: {e}")
    } else {
        tracing::warn!("balancer request failed: {}", e);
        e.to_string()
    }
}

async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    match response.json::<ErrorResponse>().await {
        Ok(body) => body.detail,
        Err(_) => status.to_string(),
    }
}

#[async_trait]
impl IdentitySource for BalancerClient {
    #[instrument(skip_all)]
    async fn sign_in_anonymously(&self) -> Result<AnonymousIdentity, AssignmentError> {
        let response = self
            .http
            .post(self.sign_in_url.clone())
            .send()
            .await
            .map_err(|e| AssignmentError::StorageUnavailable(transport_error(e)))?;

        match response.status() {
            status if status.is_success() => response
                .json::<AnonymousIdentity>()
                .await
                .map_err(|e| AssignmentError::MalformedResponse(e.to_string())),
            StatusCode::UNAUTHORIZED => Err(AssignmentError::Unauthorized),
            status if status.is_server_error() => Err(AssignmentError::StorageUnavailable(
                error_detail(response).await,
            )),
            status => Err(AssignmentError::MalformedResponse(format!(
                "unexpected status {status}"
            ))),
        }
    }
}

#[async_trait]
impl ConditionSource for BalancerClient {
    #[instrument(skip_all)]
    async fn assign_condition(&self, token: &str) -> Result<Variant, AssignmentError> {
        let response = self
            .http
            .post(self.assign_url.clone())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AssignmentError::StorageUnavailable(transport_error(e)))?;

        match response.status() {
            StatusCode::OK => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| AssignmentError::StorageUnavailable(transport_error(e)))?;
                serde_json::from_slice::<AssignResponse>(&body)
                    .map(|assigned| assigned.condition)
                    .map_err(|e| AssignmentError::MalformedResponse(e.to_string()))
            }
            StatusCode::UNAUTHORIZED => Err(AssignmentError::Unauthorized),
            status if status.is_server_error() => Err(AssignmentError::StorageUnavailable(
                error_detail(response).await,
            )),
            status => Err(AssignmentError::MalformedResponse(format!(
                "unexpected status {status}"
            ))),
        }
    }
}

#[async_trait]
impl SessionSink for BalancerClient {
    #[instrument(skip_all, fields(session_id = %record.session_id))]
    async fn write_session(&self, token: &str, record: &SessionRecord) -> Result<(), SaveError> {
        let response = self
            .http
            .post(self.sessions_url.clone())
            .bearer_auth(token)
            .json(record)
            .send()
            .await
            .map_err(|e| SaveError::Unavailable(transport_error(e)))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            // An earlier attempt landed even though its response got lost
            StatusCode::CONFLICT => {
                tracing::info!("session was already stored");
                Ok(())
            }
            StatusCode::UNAUTHORIZED => Err(SaveError::Unauthorized),
            status if status.is_client_error() => {
                Err(SaveError::Rejected(error_detail(response).await))
            }
            _ => Err(SaveError::Unavailable(error_detail(response).await)),
        }
    }
}
