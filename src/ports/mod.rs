//! Port traits. API boundaries for the hexagon.
//!
//! Outbound only: the use cases call into storage and notification delivery.

pub mod outbound;

pub use outbound::{LedgerStore, NotificationSink, StoredExpense};
