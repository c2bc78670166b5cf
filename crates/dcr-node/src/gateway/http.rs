//! HTTP gateway to remote event nodes

use super::traits::EventGateway;
use crate::error::{GatewayError, GatewayResult};
use async_trait::async_trait;
use dcr_types::{EventAddressDto, LockDto, Relation};
use reqwest::{Client, RequestBuilder, Response, Url};
use std::time::Duration;
use tracing::{debug, warn};

/// Settings for [`HttpEventGateway`]
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    /// Upper bound for a single request, connect included
    pub request_timeout: Duration,

    /// Extra attempts after a transport error or 5xx answer
    pub max_retries: u32,

    /// Delay before retry `n` is `n * retry_backoff`
    pub retry_backoff: Duration,
}

impl Default for HttpGatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_retries: 1,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

/// reqwest-backed [`EventGateway`]
#[derive(Debug, Clone)]
pub struct HttpEventGateway {
    client: Client,
    config: HttpGatewayConfig,
}

impl HttpEventGateway {
    /// Create a new gateway
    pub fn new(config: HttpGatewayConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { client, config })
    }

    /// `{targetUri}/events/{workflowId}/{eventId}/{segments..}`
    fn event_url(target: &Relation, segments: &[&str]) -> GatewayResult<Url> {
        let mut url = Url::parse(&target.target_uri)
            .map_err(|e| GatewayError::Transport(format!("invalid uri {}: {}", target.target_uri, e)))?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::Transport(format!("uri {} cannot be a base", target.target_uri)))?
            .pop_if_empty()
            .extend([
                "events",
                target.target_workflow_id.as_str(),
                target.target_event_id.as_str(),
            ])
            .extend(segments);
        Ok(url)
    }

    /// Send with bounded retries; only retryable failures are retried
    async fn send(&self, build: impl Fn() -> RequestBuilder) -> GatewayResult<Response> {
        let mut attempt = 0;
        loop {
            let result = match build().send().await {
                Ok(response) => Self::check_status(response).await,
                Err(e) => Err(GatewayError::from(e)),
            };

            match result {
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %err, "Remote call failed, retrying");
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                }
                other => return other,
            }
        }
    }

    async fn check_status(response: Response) -> GatewayResult<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(GatewayError::Status {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn get_bool(&self, url: Url) -> GatewayResult<bool> {
        debug!(%url, "GET");
        let response = self.send(|| self.client.get(url.clone())).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl EventGateway for HttpEventGateway {
    async fn is_executed(&self, target: &Relation, caller_id: &str) -> GatewayResult<bool> {
        self.get_bool(Self::event_url(target, &["executed", caller_id])?)
            .await
    }

    async fn is_included(&self, target: &Relation, caller_id: &str) -> GatewayResult<bool> {
        self.get_bool(Self::event_url(target, &["included", caller_id])?)
            .await
    }

    async fn lock(&self, target: &Relation, lock: &LockDto) -> GatewayResult<()> {
        let url = Self::event_url(target, &["lock"])?;
        debug!(%url, owner = %lock.lock_owner, "POST lock");
        self.send(|| self.client.post(url.clone()).json(lock)).await?;
        Ok(())
    }

    async fn unlock(&self, target: &Relation, caller_id: &str) -> GatewayResult<()> {
        let url = Self::event_url(target, &["lock", caller_id])?;
        debug!(%url, "DELETE lock");
        self.send(|| self.client.delete(url.clone())).await?;
        Ok(())
    }

    async fn send_pending(&self, target: &Relation, caller: &EventAddressDto) -> GatewayResult<()> {
        let url = Self::event_url(target, &["pending", "true"])?;
        debug!(%url, "PUT pending");
        self.send(|| self.client.put(url.clone()).json(caller)).await?;
        Ok(())
    }

    async fn send_included(
        &self,
        target: &Relation,
        caller: &EventAddressDto,
        value: bool,
    ) -> GatewayResult<()> {
        let value = if value { "true" } else { "false" };
        let url = Self::event_url(target, &["included", value])?;
        debug!(%url, "PUT included");
        self.send(|| self.client.put(url.clone()).json(caller)).await?;
        Ok(())
    }
}
