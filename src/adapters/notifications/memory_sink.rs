//! In-memory notification sink. Records every batch; can be switched to fail
//! so callers can check that delivery errors are swallowed.

use crate::domain::{DomainError, Notification};
use crate::ports::NotificationSink;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryNotificationSink {
    sent: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl MemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose every call fails with `DomainError::Notification`.
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.set_failing(true);
        sink
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Everything delivered so far, in order.
    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl NotificationSink for MemoryNotificationSink {
    async fn create_notifications(
        &self,
        notifications: &[Notification],
    ) -> Result<(), DomainError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::Notification("sink unavailable".to_string()));
        }
        self.sent.lock().await.extend_from_slice(notifications);
        Ok(())
    }
}
