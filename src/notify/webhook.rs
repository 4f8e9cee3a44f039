use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{AvailabilityNotice, AvailabilityNotifier, NotificationResult};
use crate::utils::error::Result;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens the configured alert URL with a plain GET when a space is found.
/// Typical targets are push services that fire on a visit (ntfy, IFTTT,
/// a self-hosted hook).
pub struct WebhookNotifier {
    client: Client,
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookNotifier {
    pub fn new() -> Self {
        WebhookNotifier {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl AvailabilityNotifier for WebhookNotifier {
    fn name(&self) -> &str {
        "alert-url"
    }

    async fn notify(&self, notice: &AvailabilityNotice) -> Result<NotificationResult> {
        let Some(url) = &notice.alert_url else {
            return Ok(NotificationResult::delivered());
        };

        debug!("Opening alert URL {}", url);
        let response = self.client.get(url.clone()).send().await?;

        if response.status().is_success() {
            Ok(NotificationResult::delivered())
        } else {
            Ok(NotificationResult::failed(format!(
                "alert URL answered {}",
                response.status()
            )))
        }
    }
}
