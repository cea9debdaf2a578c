use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use cadence_core::config::SchedulerConfig;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::types::{FirePayload, TriggerDirective};

/// A one-shot registration request for the external trigger service.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterTrigger {
    /// Deterministic name; registering the same name again replaces it.
    pub name: String,
    pub directive: TriggerDirective,
    /// Callback URL the service calls when the trigger fires.
    pub endpoint: String,
    pub method: String,
    /// Headers echoed on the callback, including the shared secret.
    pub headers: BTreeMap<String, String>,
    pub body: FirePayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The service had no trigger under that name. Callers treat this as
    /// success.
    NotFound,
}

/// The external one-shot trigger service.
#[async_trait]
pub trait SchedulerGateway: Send + Sync {
    fn name(&self) -> &str;

    /// Register (or replace) a trigger and return the service's id for it.
    async fn register_once_trigger(&self, req: &RegisterTrigger) -> Result<String, GatewayError>;

    async fn delete_trigger(&self, name: &str) -> Result<DeleteOutcome, GatewayError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("trigger service unavailable: {0}")]
    Unavailable(String),

    #[error("directive not supported by {gateway}: {kind}")]
    UnsupportedDirective { gateway: String, kind: &'static str },
}

impl GatewayError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Unavailable(_) => true,
            GatewayError::Api { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }
}

/// Wire body of `PUT /v1/triggers/{name}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TriggerBody<'a> {
    fire_at: chrono::DateTime<chrono::Utc>,
    cron: String,
    endpoint: &'a str,
    method: &'a str,
    headers: &'a BTreeMap<String, String>,
    body: &'a FirePayload,
}

#[derive(Debug, Deserialize)]
struct TriggerCreated {
    id: String,
}

/// HTTP client for the trigger service.
///
/// Transport failures and 502/503/504 are retried with linear backoff up to
/// `max_retries` times. Other 4xx/5xx responses fail immediately.
pub struct HttpSchedulerGateway {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
    max_retries: u32,
    backoff: Duration,
}

impl HttpSchedulerGateway {
    pub fn new(base_url: impl Into<String>, api_token: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token,
            max_retries: 2,
            backoff: Duration::from_millis(250),
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(
            config.base_url.clone(),
            config.api_token.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
        .with_retries(config.max_retries, Duration::from_millis(250))
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff = backoff;
        self
    }

    fn trigger_url(&self, name: &str) -> String {
        format!("{}/v1/triggers/{}", self.base_url, name)
    }

    /// Send the request built by `build`, retrying transient failures.
    async fn send_with_retry<F>(&self, op: &str, build: F) -> Result<reqwest::Response, GatewayError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            let mut req = build();
            if let Some(token) = &self.api_token {
                req = req.bearer_auth(token);
            }
            // 4xx responses go back to the caller, which knows what a 404 means.
            let err = match req.send().await {
                Ok(resp) if !resp.status().is_server_error() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let text = resp.text().await.unwrap_or_default();
                    GatewayError::Api {
                        status,
                        message: text,
                    }
                }
                Err(e) if e.is_connect() || e.is_timeout() => GatewayError::Unavailable(e.to_string()),
                Err(e) => GatewayError::Http(e),
            };

            if !err.is_transient() || attempt >= self.max_retries {
                warn!(op, attempt, error = %err, "trigger service request failed");
                return Err(err);
            }
            attempt += 1;
            debug!(op, attempt, error = %err, "retrying trigger service request");
            tokio::time::sleep(self.backoff * attempt).await;
        }
    }
}

#[async_trait]
impl SchedulerGateway for HttpSchedulerGateway {
    fn name(&self) -> &str {
        "http"
    }

    async fn register_once_trigger(&self, req: &RegisterTrigger) -> Result<String, GatewayError> {
        let Some(fire_at) = req.directive.fire_at() else {
            return Err(GatewayError::UnsupportedDirective {
                gateway: self.name().to_string(),
                kind: req.directive.kind(),
            });
        };
        let body = TriggerBody {
            fire_at,
            cron: req.directive.cron_expression(),
            endpoint: &req.endpoint,
            method: &req.method,
            headers: &req.headers,
            body: &req.body,
        };
        let url = self.trigger_url(&req.name);

        let resp = self
            .send_with_retry("register", || self.client.put(&url).json(&body))
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, trigger = %req.name, "trigger registration rejected");
            return Err(GatewayError::Api {
                status,
                message: text,
            });
        }

        let created: TriggerCreated = resp
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;
        info!(trigger = %req.name, external_id = %created.id, %fire_at, "trigger registered");
        Ok(created.id)
    }

    async fn delete_trigger(&self, name: &str) -> Result<DeleteOutcome, GatewayError> {
        let url = self.trigger_url(name);
        let resp = self
            .send_with_retry("delete", || self.client.delete(&url))
            .await?;

        match resp.status() {
            StatusCode::NOT_FOUND => {
                debug!(trigger = %name, "trigger already gone");
                Ok(DeleteOutcome::NotFound)
            }
            s if s.is_success() => {
                info!(trigger = %name, "trigger deleted");
                Ok(DeleteOutcome::Deleted)
            }
            s => {
                let text = resp.text().await.unwrap_or_default();
                warn!(status = s.as_u16(), body = %text, trigger = %name, "trigger delete rejected");
                Err(GatewayError::Api {
                    status: s.as_u16(),
                    message: text,
                })
            }
        }
    }
}
