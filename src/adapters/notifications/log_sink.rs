//! Notification sink that only writes to the tracing log. Default when no
//! webhook is configured.

use crate::domain::{DomainError, Notification};
use crate::ports::NotificationSink;
use tracing::info;

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSink;

#[async_trait::async_trait]
impl NotificationSink for LogNotificationSink {
    async fn create_notifications(
        &self,
        notifications: &[Notification],
    ) -> Result<(), DomainError> {
        for n in notifications {
            info!(
                user_id = %n.user_id,
                group_id = %n.group_id,
                kind = n.kind.as_str(),
                title = %n.title,
                "{}",
                n.body
            );
        }
        Ok(())
    }
}
