//! Config validation
//!
//! Rules:
//! - dispatch.concurrency in 1..=50
//! - dispatch.batch_delay_secs finite and in 0..=10
//! - dispatch.send_timeout_secs in 1..=300
//! - telegram.api_base is an http(s) URL
//! - telegram.request_timeout_secs > 0

use contracts::{BroadcastConfig, ContractError};

/// Validate a BroadcastConfig
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &BroadcastConfig) -> Result<(), ContractError> {
    validate_dispatch(config)?;
    validate_telegram(config)?;
    Ok(())
}

fn validate_dispatch(config: &BroadcastConfig) -> Result<(), ContractError> {
    config.dispatch.check().map_err(|e| match e {
        ContractError::ConfigValidation { field, message } => {
            ContractError::config_validation(format!("dispatch.{field}"), message)
        }
        other => other,
    })
}

fn validate_telegram(config: &BroadcastConfig) -> Result<(), ContractError> {
    let telegram = &config.telegram;

    let base = telegram.api_base.trim();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(ContractError::config_validation(
            "telegram.api_base",
            format!("api_base must be an http(s) URL, got '{}'", telegram.api_base),
        ));
    }

    if telegram.request_timeout_secs == 0 {
        return Err(ContractError::config_validation(
            "telegram.request_timeout_secs",
            "request_timeout_secs must be > 0",
        ));
    }

    Ok(())
}
