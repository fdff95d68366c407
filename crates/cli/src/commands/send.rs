//! `send` command implementation.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use config_loader::{load_recipients, ConfigLoader};
use contracts::{
    BroadcastConfig, ImageAttachment, MessagePayload, ParseMode, Recipient, RunTermination,
    Transport,
};
use dispatcher::{BroadcastSession, Dispatcher, MockTransport, TelegramTransport};

use crate::cli::SendArgs;
use crate::error::CliError;
use crate::pipeline::{BroadcastJob, BroadcastStats, Orchestrator};

/// Bot API limits; exceeding them makes every send a bad request
const MAX_MESSAGE_LENGTH: usize = 4096;
const MAX_CAPTION_LENGTH: usize = 1024;
const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];

/// Invalid recipient lines logged individually before summarizing
const MAX_LOGGED_INVALID: usize = 10;

/// Execute the `send` command
pub async fn run_send(args: &SendArgs) -> Result<()> {
    let config = load_config(args).context("Failed to load configuration")?;
    let recipients = load_recipient_list(&args.recipients).with_context(|| {
        format!(
            "Failed to load recipients from {}",
            args.recipients.display()
        )
    })?;
    let payload = build_payload(args, &config).context("Failed to build message")?;
    check_limits(&payload);

    info!(
        recipients = recipients.len(),
        concurrency = config.dispatch.concurrency,
        batch_delay_secs = config.dispatch.batch_delay_secs,
        dry_run = config.dispatch.dry_run,
        image = payload.has_image(),
        "Configuration loaded"
    );

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    let job = BroadcastJob {
        payload: Arc::new(payload),
        recipients,
        settings: config.dispatch.clone(),
    };

    let token = args
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let stats = match token {
        Some(token) => {
            let transport =
                TelegramTransport::new(token, &config.telegram).map_err(CliError::from)?;
            broadcast(transport, job).await?
        }
        None if config.dispatch.dry_run => {
            info!("No bot token given, dry run uses the offline transport");
            broadcast(MockTransport::new(), job).await?
        }
        None => return Err(CliError::MissingToken.into()),
    };

    if args.json {
        println!(
            "{}",
            stats.to_json().context("Failed to serialize report")?
        );
    } else {
        stats.print_summary();
    }

    match &stats.summary().termination {
        RunTermination::Faulted { reason } => Err(CliError::broadcast(reason.clone()).into()),
        RunTermination::Cancelled => {
            warn!(
                unprocessed = stats.summary().unprocessed.len(),
                "Broadcast cancelled before all recipients were processed"
            );
            Ok(())
        }
        RunTermination::Completed => {
            info!("Broadcast finished");
            Ok(())
        }
    }
}

async fn broadcast<T>(transport: T, job: BroadcastJob) -> Result<BroadcastStats>
where
    T: Transport + Send + Sync + 'static,
{
    info!(transport = transport.name(), "Starting broadcast...");
    let orchestrator = Orchestrator::new(Dispatcher::new(transport), BroadcastSession::new());
    Ok(orchestrator.run(job).await?)
}

/// Load the config file (or defaults), apply CLI overrides, then validate
fn load_config(args: &SendArgs) -> crate::error::Result<BroadcastConfig> {
    let mut config = match &args.config {
        Some(path) => {
            if !path.exists() {
                return Err(CliError::config_not_found(path.display().to_string()));
            }
            info!(config = %path.display(), "Loading configuration");
            ConfigLoader::load_from_path(path)?
        }
        None => BroadcastConfig::default(),
    };

    if let Some(concurrency) = args.concurrency {
        info!(concurrency, "Overriding concurrency from CLI");
        config.dispatch.concurrency = concurrency;
    }
    if let Some(delay) = args.batch_delay {
        info!(batch_delay_secs = delay, "Overriding batch delay from CLI");
        config.dispatch.batch_delay_secs = delay;
    }
    if args.dry_run {
        config.dispatch.dry_run = true;
    }
    if let Some(ref api_base) = args.api_base {
        info!(api_base = %api_base, "Overriding API base from CLI");
        config.telegram.api_base = api_base.clone();
    }

    ConfigLoader::validate(&config)?;
    Ok(config)
}

fn load_recipient_list(path: &Path) -> crate::error::Result<Vec<Recipient>> {
    let list = load_recipients(path)?;

    for line in list.invalid.iter().take(MAX_LOGGED_INVALID) {
        warn!(line = %line, "Skipping invalid recipient");
    }
    if list.invalid.len() > MAX_LOGGED_INVALID {
        warn!(
            more = list.invalid.len() - MAX_LOGGED_INVALID,
            "More invalid recipients skipped"
        );
    }
    if list.duplicates > 0 {
        warn!(duplicates = list.duplicates, "Dropped duplicate recipients");
    }
    if list.is_empty() {
        return Err(CliError::no_recipients(path.display().to_string()));
    }

    info!(
        valid = list.valid.len(),
        invalid = list.invalid.len(),
        "Recipients loaded"
    );
    Ok(list.valid)
}

fn build_payload(args: &SendArgs, config: &BroadcastConfig) -> crate::error::Result<MessagePayload> {
    let text = match (&args.text, &args.message_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => String::new(),
    };
    let text = text.trim().to_string();
    if text.is_empty() && args.image.is_none() {
        return Err(CliError::EmptyMessage);
    }

    let parse_mode = if args.plain {
        ParseMode::Plain
    } else {
        ParseMode::Html
    };
    let mut payload = MessagePayload::text(text).with_parse_mode(parse_mode);
    payload.disable_web_page_preview = config.telegram.disable_web_page_preview;

    if let Some(ref path) = args.image {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();
        payload = payload.with_image(ImageAttachment::new(file_name, bytes));
    }

    Ok(payload)
}

/// Warn about payloads the Bot API will reject
fn check_limits(payload: &MessagePayload) {
    let length = payload.text.chars().count();
    let limit = if payload.has_image() {
        MAX_CAPTION_LENGTH
    } else {
        MAX_MESSAGE_LENGTH
    };
    if length > limit {
        warn!(length, limit, "Message exceeds the Bot API length limit");
    }

    if let Some(ref image) = payload.image {
        if image.len() > MAX_IMAGE_BYTES {
            warn!(bytes = image.len(), limit = MAX_IMAGE_BYTES, "Image exceeds 10 MB");
        }
        let supported = Path::new(&image.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if !supported {
            warn!(file = %image.file_name, "Image type may not be supported (jpg, jpeg, png, gif)");
        }
    }
}
