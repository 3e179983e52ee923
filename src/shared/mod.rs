//! Cross-cutting concerns shared by the binary and embedders.

pub mod config;

pub use config::LedgerConfig;
