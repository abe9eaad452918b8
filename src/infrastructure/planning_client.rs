use crate::infrastructure::error::InfraError;
use crate::infrastructure::planning_mapper::{
    decode_planning_response, PlanningRequest, PlanningResponse,
};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::time::sleep;
use url::Url;

#[async_trait]
pub trait PlanningCollaborator: Send + Sync {
    async fn propose(&self, request: &PlanningRequest) -> Result<PlanningResponse, InfraError>;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: 200,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReqwestPlanningClient {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    retry_policy: RetryPolicy,
}

impl ReqwestPlanningClient {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, InfraError> {
        let endpoint = Url::parse(endpoint.trim())
            .map_err(|error| InfraError::InvalidConfig(format!("invalid planner endpoint: {error}")))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(InfraError::InvalidConfig(format!(
                "planner endpoint must use http or https: {endpoint}"
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| InfraError::Planning(format!("failed to build http client: {error}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            retry_policy: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn http_error(status: reqwest::StatusCode, body: &str) -> InfraError {
        let message = if body.trim().is_empty() {
            format!("planning service error: http {}", status.as_u16())
        } else {
            format!("planning service error: http {}; body={body}", status.as_u16())
        };
        InfraError::Planning(message)
    }

    fn should_retry(error: &InfraError) -> bool {
        match error {
            InfraError::Planning(message) => {
                let message = message.to_ascii_lowercase();
                message.contains("network error")
                    || message.contains("timed out")
                    || message.contains("http 502")
                    || message.contains("http 503")
                    || message.contains("http 504")
            }
            _ => false,
        }
    }

    async fn post_once(&self, request: &PlanningRequest) -> Result<PlanningResponse, InfraError> {
        let mut req = self.client.post(self.endpoint.clone()).json(request);
        if let Some(api_key) = self.api_key.as_deref() {
            req = req.bearer_auth(api_key);
        }

        let response = req.send().await.map_err(|error| {
            InfraError::Planning(format!("network error while requesting placements: {error}"))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Planning(format!("failed reading planning response: {error}"))
        })?;

        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        decode_planning_response(&body)
    }
}

#[async_trait]
impl PlanningCollaborator for ReqwestPlanningClient {
    async fn propose(&self, request: &PlanningRequest) -> Result<PlanningResponse, InfraError> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt: u8 = 0;

        loop {
            match self.post_once(request).await {
                Ok(response) => return Ok(response),
                Err(error) if Self::should_retry(&error) && attempt + 1 < max_attempts => {
                    let delay = self
                        .retry_policy
                        .base_delay_ms
                        .saturating_mul(2u64.saturating_pow(attempt as u32));
                    sleep(Duration::from_millis(delay)).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(error),
            }
        }
    }
}
