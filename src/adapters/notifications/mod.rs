//! Notification sinks.

pub mod log_sink;
pub mod memory_sink;
pub mod webhook;

pub use log_sink::LogNotificationSink;
pub use memory_sink::MemoryNotificationSink;
pub use webhook::WebhookNotificationSink;
