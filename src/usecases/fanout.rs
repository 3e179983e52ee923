//! Best-effort notification delivery.

use crate::domain::{GroupId, Notification};
use crate::ports::NotificationSink;
use tracing::{debug, warn};

/// Hand `notifications` to the sink. Failures are logged and swallowed: the
/// ledger write they describe is already committed.
pub(crate) async fn deliver(
    sink: &dyn NotificationSink,
    group_id: &GroupId,
    notifications: Vec<Notification>,
) {
    if notifications.is_empty() {
        return;
    }
    let count = notifications.len();
    match sink.create_notifications(&notifications).await {
        Ok(()) => debug!(group_id = %group_id, count, "Notifications delivered"),
        Err(e) => warn!(group_id = %group_id, count, error = %e, "Notification fan-out failed"),
    }
}
