use std::time::Duration;

use async_trait::async_trait;
use cadence_core::config::PublishConfig;
use cadence_notes::Note;
use serde::Serialize;
use tracing::{info, warn};

/// Hands a fired note to the outside world.
///
/// Called by the publish webhook after the note has been re-checked as
/// `scheduled`. A failure leaves the note `scheduled` so a re-delivered
/// callback can try again.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, note: &Note) -> Result<(), PublishError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("publish endpoint returned {status}: {message}")]
    Rejected { status: u16, message: String },
}

/// Records the publication in the log and nothing else.
#[derive(Debug, Default)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    fn name(&self) -> &str {
        "log"
    }

    async fn publish(&self, note: &Note) -> Result<(), PublishError> {
        info!(
            note_id = %note.id,
            owner_id = %note.owner_id,
            chars = note.body.chars().count(),
            "note published (log only)"
        );
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishBody<'a> {
    item_id: &'a str,
    owner_id: &'a str,
    body: &'a str,
}

/// Posts fired notes to a downstream publishing endpoint.
pub struct HttpPublisher {
    client: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
}

impl HttpPublisher {
    pub fn new(endpoint: impl Into<String>, api_token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            endpoint: endpoint.into(),
            api_token,
        }
    }
}

/// Pick the publisher for a config: HTTP when an endpoint is set, log-only
/// otherwise.
pub fn from_config(config: &PublishConfig) -> Box<dyn Publisher> {
    match &config.endpoint {
        Some(endpoint) => Box::new(HttpPublisher::new(endpoint.clone(), config.api_token.clone())),
        None => Box::new(LogPublisher),
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    fn name(&self) -> &str {
        "http"
    }

    async fn publish(&self, note: &Note) -> Result<(), PublishError> {
        let mut req = self.client.post(&self.endpoint).json(&PublishBody {
            item_id: &note.id,
            owner_id: &note.owner_id,
            body: &note.body,
        });
        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            warn!(status, note_id = %note.id, "publish endpoint rejected note");
            return Err(PublishError::Rejected {
                status,
                message: text,
            });
        }
        info!(note_id = %note.id, owner_id = %note.owner_id, "note published");
        Ok(())
    }
}
