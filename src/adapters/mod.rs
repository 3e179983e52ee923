//! Infrastructure adapters. Implement outbound ports.
//!
//! SQLite and in-memory storage, notification delivery. Map errors to DomainError.

pub mod notifications;
pub mod persistence;
