use async_trait::async_trait;
use std::sync::Arc;

use super::{AvailabilityNotice, AvailabilityNotifier, NotificationResult};
use crate::page::PageAdapter;
use crate::utils::error::Result;

/// Shows the availability message on the portal page itself.
pub struct PageAlertNotifier {
    page: Arc<dyn PageAdapter>,
}

impl PageAlertNotifier {
    pub fn new(page: Arc<dyn PageAdapter>) -> Self {
        Self { page }
    }

    pub fn format_message(notice: &AvailabilityNotice) -> String {
        format!(
            "{}\n\n{}\n\n{} space(s) available\n\nHurry up and book it!",
            notice.title(),
            notice.name,
            notice.available_count
        )
    }
}

#[async_trait]
impl AvailabilityNotifier for PageAlertNotifier {
    fn name(&self) -> &str {
        "page-alert"
    }

    async fn notify(&self, notice: &AvailabilityNotice) -> Result<NotificationResult> {
        self.page.show_message(&Self::format_message(notice)).await?;
        Ok(NotificationResult::delivered())
    }
}
