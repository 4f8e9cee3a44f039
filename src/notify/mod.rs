use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::models::AvailabilityEvent;
use crate::utils::error::Result;

pub mod page_alert;
pub mod webhook;

pub use page_alert::PageAlertNotifier;
pub use webhook::WebhookNotifier;

/// What every notifier receives for one availability event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityNotice {
    pub name: String,
    pub available_count: u32,
    pub is_priority: bool,
    pub alert_url: Option<Url>,
}

impl AvailabilityNotice {
    pub fn new(event: &AvailabilityEvent, alert_url: Option<Url>) -> Self {
        Self {
            name: event.entry.name.clone(),
            available_count: event.entry.available_count,
            is_priority: event.is_priority,
            alert_url,
        }
    }

    pub fn title(&self) -> &'static str {
        "PARKING AVAILABLE!"
    }

    pub fn message(&self) -> String {
        format!(
            "{}: {} space(s) available",
            self.name, self.available_count
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationResult {
    pub success: bool,
    pub error: Option<String>,
}

impl NotificationResult {
    pub fn delivered() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// One way of telling the user a space opened up.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AvailabilityNotifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, notice: &AvailabilityNotice) -> Result<NotificationResult>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ListingEntry;

    #[test]
    fn test_notice_from_event() {
        let event = AvailabilityEvent {
            entry: ListingEntry {
                name: "LOT-7".to_string(),
                available_count: 2,
            },
            is_priority: true,
        };
        let notice = AvailabilityNotice::new(&event, None);

        assert_eq!(notice.message(), "LOT-7: 2 space(s) available");
        assert!(notice.is_priority);
        assert!(notice.alert_url.is_none());
    }

    #[tokio::test]
    async fn test_mock_notifier_expectation() {
        let mut mock = MockAvailabilityNotifier::new();
        mock.expect_notify()
            .times(1)
            .returning(|_| Ok(NotificationResult::failed("offline")));

        let notice = AvailabilityNotice {
            name: "LOT-3".to_string(),
            available_count: 1,
            is_priority: false,
            alert_url: None,
        };
        let result = mock.notify(&notice).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("offline"));
    }
}
