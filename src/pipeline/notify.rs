//! Webhook notifications for terminal jobs.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::job::PipelineResult;
use crate::config::{NotificationConfig, WebhookEvent};
use crate::error::ErrorKind;
use crate::types::{Event, JobId, Stage};

/// Body POSTed to webhooks
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// "complete" or "failed"
    pub event: String,
    /// Job ID
    pub job_id: JobId,
    /// Subject identifier
    pub subject: String,
    /// Terminal stage
    pub stage: Stage,
    /// Final article title (if any)
    pub title: Option<String>,
    /// Final article revision (if any)
    pub revision: Option<u32>,
    /// Whether the review was partial
    pub partial_review: bool,
    /// Last error classification (failed jobs)
    pub error_kind: Option<ErrorKind>,
    /// Last error message (failed jobs)
    pub error: Option<String>,
    /// Unix timestamp
    pub timestamp: i64,
}

impl WebhookPayload {
    fn from_result(event_type: WebhookEvent, result: &PipelineResult) -> Self {
        let job = &result.job;
        let last_error = if event_type == WebhookEvent::OnFailed {
            result.last_error()
        } else {
            None
        };
        Self {
            event: match event_type {
                WebhookEvent::OnComplete => "complete",
                WebhookEvent::OnFailed => "failed",
            }
            .to_string(),
            job_id: job.id().clone(),
            subject: job.subject().id.clone(),
            stage: job.stage(),
            title: job.article().map(|a| a.title.clone()),
            revision: job.article().map(|a| a.revision),
            partial_review: job.feedback().is_some_and(|f| f.partial),
            error_kind: last_error.map(|e| e.kind),
            error: last_error.map(|e| e.message.clone()),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// POST `result` to every webhook subscribed to its outcome
///
/// Runs in a spawned task (fire and forget). Failures are logged and emitted
/// as [`Event::WebhookFailed`]; they never affect the job.
pub(crate) fn trigger_webhooks(
    config: &NotificationConfig,
    event_tx: &broadcast::Sender<Event>,
    result: &PipelineResult,
) {
    let event_type = match result.job.stage() {
        Stage::Done => WebhookEvent::OnComplete,
        Stage::Failed => WebhookEvent::OnFailed,
        _ => return,
    };

    let matching_webhooks: Vec<_> = config
        .webhooks
        .iter()
        .filter(|w| w.events.contains(&event_type))
        .cloned()
        .collect();
    if matching_webhooks.is_empty() {
        return;
    }

    let payload = Arc::new(WebhookPayload::from_result(event_type, result));
    let event_tx = event_tx.clone();

    tokio::spawn(async move {
        let client = reqwest::Client::new();
        for webhook in matching_webhooks {
            let mut request = client
                .post(&webhook.url)
                .json(payload.as_ref())
                .timeout(webhook.timeout);
            if let Some(auth) = &webhook.auth_header {
                request = request.header("Authorization", auth);
            }

            let url = webhook.url;
            let timeout = webhook.timeout;
            let error = match tokio::time::timeout(timeout, request.send()).await {
                Ok(Ok(response)) if response.status().is_success() => {
                    tracing::debug!(url = %url, job_id = %payload.job_id, "webhook sent");
                    continue;
                }
                Ok(Ok(response)) => format!(
                    "webhook returned status {}: {}",
                    response.status(),
                    response.text().await.unwrap_or_default()
                ),
                Ok(Err(e)) => format!("failed to send webhook: {e}"),
                Err(_) => format!("webhook timed out after {timeout:?}"),
            };

            tracing::warn!(url = %url, error = %error, "webhook failed");
            event_tx.send(Event::WebhookFailed { url, error }).ok();
        }
    });
}
