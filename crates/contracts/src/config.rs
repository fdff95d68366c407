//! BroadcastConfig - Config Loader output
//!
//! Dispatch policy (concurrency bound, batch pacing, dry run) and transport settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::ContractError;

pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 50;
pub const MAX_BATCH_DELAY_SECS: f64 = 10.0;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete broadcaster configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default)]
    pub version: ConfigVersion,

    #[serde(default)]
    pub dispatch: DispatchSettings,

    #[serde(default)]
    pub telegram: TelegramSettings,
}

/// Dispatch policy for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DispatchSettings {
    /// Sends in flight at once; also the batch size
    #[serde(default = "default_concurrency")]
    #[validate(range(min = 1, max = 50, message = "concurrency must be between 1 and 50"))]
    pub concurrency: usize,

    /// Pause between batches (seconds)
    #[serde(default = "default_batch_delay_secs")]
    #[validate(range(
        min = 0.0,
        max = 10.0,
        message = "batch_delay_secs must be between 0 and 10"
    ))]
    pub batch_delay_secs: f64,

    /// Exercise the full control flow without calling the transport
    #[serde(default)]
    pub dry_run: bool,

    /// Per-send timeout (seconds); an expired send counts as a network error
    #[serde(default = "default_send_timeout_secs")]
    #[validate(range(
        min = 1,
        max = 300,
        message = "send_timeout_secs must be between 1 and 300"
    ))]
    pub send_timeout_secs: u64,

    /// Simulated latency of a dry-run send (milliseconds)
    #[serde(default = "default_dry_run_delay_ms")]
    #[validate(range(max = 5000, message = "dry_run_delay_ms must be at most 5000"))]
    pub dry_run_delay_ms: u64,
}

fn default_concurrency() -> usize {
    10
}

fn default_batch_delay_secs() -> f64 {
    1.0
}

fn default_send_timeout_secs() -> u64 {
    30
}

fn default_dry_run_delay_ms() -> u64 {
    100
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            batch_delay_secs: default_batch_delay_secs(),
            dry_run: false,
            send_timeout_secs: default_send_timeout_secs(),
            dry_run_delay_ms: default_dry_run_delay_ms(),
        }
    }
}

impl DispatchSettings {
    /// Settings with the given bound and delay, everything else default
    pub fn new(concurrency: usize, batch_delay: Duration, dry_run: bool) -> Self {
        Self {
            concurrency,
            batch_delay_secs: batch_delay.as_secs_f64(),
            dry_run,
            ..Self::default()
        }
    }

    /// Range checks, run before any dispatch starts.
    pub fn check(&self) -> Result<(), ContractError> {
        if !self.batch_delay_secs.is_finite() {
            return Err(ContractError::config_validation(
                "batch_delay_secs",
                format!("batch_delay_secs must be finite, got {}", self.batch_delay_secs),
            ));
        }
        self.validate()?;
        Ok(())
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_secs_f64(self.batch_delay_secs.clamp(0.0, MAX_BATCH_DELAY_SECS))
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn dry_run_delay(&self) -> Duration {
        Duration::from_millis(self.dry_run_delay_ms)
    }
}

/// Telegram Bot API transport settings
///
/// The bot token is deliberately absent: it is a secret and comes from the
/// environment, never from the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramSettings {
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// HTTP request timeout (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub disable_web_page_preview: bool,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for TelegramSettings {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            request_timeout_secs: default_request_timeout_secs(),
            disable_web_page_preview: false,
        }
    }
}

impl TelegramSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
