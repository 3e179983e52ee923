//! Application configuration. Storage location, notification webhook.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default data directory for `ledger.db`.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Default webhook request timeout in milliseconds.
pub const DEFAULT_WEBHOOK_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Deserialize, Default)]
pub struct LedgerConfig {
    /// Directory holding `ledger.db`. Read from GROUP_LEDGER_DATA_DIR.
    #[serde(default)]
    pub data_dir: Option<String>,

    /// Notification webhook endpoint. Read from GROUP_LEDGER_WEBHOOK_URL.
    /// Unset: notifications are only logged.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Bearer token for the webhook. Read from GROUP_LEDGER_WEBHOOK_TOKEN.
    #[serde(default)]
    pub webhook_token: Option<String>,

    /// Webhook request timeout. Read from GROUP_LEDGER_WEBHOOK_TIMEOUT_MS.
    #[serde(default)]
    pub webhook_timeout_ms: Option<u64>,
}

impl LedgerConfig {
    /// Load from `.env`, GROUP_LEDGER_* variables and the optional file named
    /// by GROUP_LEDGER_CONFIG.
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        let mut c = config::Config::builder();
        if let Ok(path) = std::env::var("GROUP_LEDGER_CONFIG") {
            c = c.add_source(config::File::with_name(&path));
        }
        c = c.add_source(config::Environment::with_prefix("GROUP_LEDGER").try_parsing(true));
        c.build()?.try_deserialize()
    }

    pub fn data_dir_or_default(&self) -> PathBuf {
        PathBuf::from(self.data_dir.as_deref().unwrap_or(DEFAULT_DATA_DIR))
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_millis(
            self.webhook_timeout_ms
                .unwrap_or(DEFAULT_WEBHOOK_TIMEOUT_MS),
        )
    }

    /// Webhook URL, ignoring blank values.
    pub fn webhook_url(&self) -> Option<&str> {
        self.webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn is_webhook_configured(&self) -> bool {
        self.webhook_url().is_some()
    }
}
