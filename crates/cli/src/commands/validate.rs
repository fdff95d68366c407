//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::info;

use contracts::BroadcastConfig;

use crate::cli::ValidateArgs;

/// Concurrency above which Telegram's ~30 messages/second ceiling is easy to hit
const SAFE_CONCURRENCY: usize = 30;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    config_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recipients_path: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    config: Option<ConfigSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recipients: Option<RecipientSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    concurrency: usize,
    batch_delay_secs: f64,
    send_timeout_secs: u64,
    dry_run: bool,
    api_base: String,
}

#[derive(Serialize)]
struct RecipientSummary {
    valid: usize,
    invalid: usize,
    duplicates: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    let result = validate(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Validation failed")
    }
}

fn validate(args: &ValidateArgs) -> ValidationResult {
    let mut result = ValidationResult {
        valid: true,
        config_path: args.config.as_ref().map(|p| p.display().to_string()),
        recipients_path: args.recipients.as_ref().map(|p| p.display().to_string()),
        errors: Vec::new(),
        warnings: Vec::new(),
        config: None,
        recipients: None,
    };

    let config = match &args.config {
        Some(path) => {
            info!(config = %path.display(), "Validating configuration");
            validate_config(path, &mut result)
        }
        None => Some(BroadcastConfig::default()),
    };
    if let Some(ref config) = config {
        collect_config_warnings(config, &mut result.warnings);
        result.config = Some(ConfigSummary {
            version: format!("{:?}", config.version),
            concurrency: config.dispatch.concurrency,
            batch_delay_secs: config.dispatch.batch_delay_secs,
            send_timeout_secs: config.dispatch.send_timeout_secs,
            dry_run: config.dispatch.dry_run,
            api_base: config.telegram.api_base.clone(),
        });
    }

    if let Some(ref path) = args.recipients {
        info!(recipients = %path.display(), "Validating recipients");
        validate_recipients(path, &mut result);
    }

    result.valid = result.errors.is_empty();
    result
}

fn validate_config(path: &Path, result: &mut ValidationResult) -> Option<BroadcastConfig> {
    if !path.exists() {
        result
            .errors
            .push(format!("File not found: {}", path.display()));
        return None;
    }
    match config_loader::ConfigLoader::load_from_path(path) {
        Ok(config) => Some(config),
        Err(e) => {
            result.errors.push(e.to_string());
            None
        }
    }
}

fn validate_recipients(path: &Path, result: &mut ValidationResult) {
    match config_loader::load_recipients(path) {
        Ok(list) => {
            if list.is_empty() {
                result
                    .errors
                    .push(format!("No valid recipients in {}", path.display()));
            }
            for line in &list.invalid {
                result
                    .warnings
                    .push(format!("Invalid recipient will be skipped: '{line}'"));
            }
            if list.duplicates > 0 {
                result
                    .warnings
                    .push(format!("{} duplicate recipients will be skipped", list.duplicates));
            }
            result.recipients = Some(RecipientSummary {
                valid: list.valid.len(),
                invalid: list.invalid.len(),
                duplicates: list.duplicates,
            });
        }
        Err(e) => result.errors.push(e.to_string()),
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_config_warnings(config: &BroadcastConfig, warnings: &mut Vec<String>) {
    let dispatch = &config.dispatch;

    if dispatch.concurrency > SAFE_CONCURRENCY && dispatch.batch_delay_secs < 1.0 {
        warnings.push(format!(
            "concurrency {} with batch delay {}s may exceed Telegram rate limits",
            dispatch.concurrency, dispatch.batch_delay_secs
        ));
    }

    if dispatch.dry_run {
        warnings.push("dry_run is enabled - no messages will be sent".to_string());
    }

    if dispatch.send_timeout_secs > config.telegram.request_timeout_secs {
        warnings.push(format!(
            "send_timeout_secs ({}) exceeds telegram.request_timeout_secs ({}) - requests time out first",
            dispatch.send_timeout_secs, config.telegram.request_timeout_secs
        ));
    }
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Validation passed");
    } else {
        println!("✗ Validation failed");
        for error in &result.errors {
            println!("\n  Error: {}", error);
        }
    }

    if let Some(ref config) = result.config {
        println!(
            "\n  Config: {}",
            result.config_path.as_deref().unwrap_or("(defaults)")
        );
        println!("  Version: {}", config.version);
        println!("  Concurrency: {}", config.concurrency);
        println!("  Batch delay: {}s", config.batch_delay_secs);
        println!("  Send timeout: {}s", config.send_timeout_secs);
        println!("  Dry run: {}", config.dry_run);
        println!("  API base: {}", config.api_base);
    }

    if let Some(ref recipients) = result.recipients {
        println!("\n  Recipients: {}", recipients.valid);
        println!("  Invalid lines: {}", recipients.invalid);
        println!("  Duplicates: {}", recipients.duplicates);
    }

    if !result.warnings.is_empty() {
        println!("\n⚠ Warnings:");
        for warning in &result.warnings {
            println!("  - {}", warning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let result = validate(&ValidateArgs {
            config: None,
            recipients: None,
            json: false,
        });
        assert!(result.valid);
        assert!(result.config.is_some());
    }

    #[test]
    fn test_invalid_config_reported() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[dispatch]\nbatch_delay_secs = 30.0").unwrap();

        let result = validate(&ValidateArgs {
            config: Some(file.path().to_path_buf()),
            recipients: None,
            json: true,
        });
        assert!(!result.valid);
        assert!(result.errors[0].contains("batch_delay_secs"), "got: {:?}", result.errors);
    }

    #[test]
    fn test_recipient_warnings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1\n1\nabc\n-1002").unwrap();

        let result = validate(&ValidateArgs {
            config: None,
            recipients: Some(file.path().to_path_buf()),
            json: false,
        });
        assert!(result.valid);
        let summary = result.recipients.unwrap();
        assert_eq!(summary.valid, 2);
        assert_eq!(summary.invalid, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn test_rate_limit_warning() {
        let mut config = BroadcastConfig::default();
        config.dispatch.concurrency = 50;
        config.dispatch.batch_delay_secs = 0.0;
        let mut warnings = Vec::new();
        collect_config_warnings(&config, &mut warnings);
        assert!(warnings.iter().any(|w| w.contains("rate limits")));
    }
}
