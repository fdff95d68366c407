//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use observability::LogFormat;
use std::path::PathBuf;

/// Broadcast - send one message to many Telegram chats
#[derive(Parser, Debug)]
#[command(
    name = "broadcast",
    author,
    version,
    about = "Telegram broadcast dispatcher",
    long_about = "Sends a single message (text, or image with caption) to a list of \n\
                  Telegram chats through the Bot API, in concurrency-bounded batches \n\
                  with a pause between batches."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "BROADCAST_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format (json, pretty, compact)
    #[arg(
        long,
        value_parser = parse_log_format,
        default_value = "pretty",
        global = true,
        env = "BROADCAST_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Broadcast a message to every recipient in a list
    Send(SendArgs),

    /// Validate configuration and recipient files without sending
    Validate(ValidateArgs),
}

/// Arguments for the `send` command
#[derive(Parser, Debug, Clone)]
pub struct SendArgs {
    /// Path to configuration file (TOML or JSON); built-in defaults if omitted
    #[arg(short, long, env = "BROADCAST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Recipient list, one chat id per line (`#` starts a comment)
    #[arg(short, long, env = "BROADCAST_RECIPIENTS")]
    pub recipients: PathBuf,

    /// Message text (HTML unless --plain)
    #[arg(
        short,
        long,
        conflicts_with = "message_file",
        required_unless_present = "message_file"
    )]
    pub text: Option<String>,

    /// Read the message text from a file
    #[arg(short, long)]
    pub message_file: Option<PathBuf>,

    /// Image to send with the text as caption
    #[arg(short, long)]
    pub image: Option<PathBuf>,

    /// Send the text verbatim instead of as HTML
    #[arg(long)]
    pub plain: bool,

    /// Override concurrent sends per batch (1-50)
    #[arg(long, env = "BROADCAST_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Override pause between batches in seconds (0-10)
    #[arg(long, env = "BROADCAST_BATCH_DELAY")]
    pub batch_delay: Option<f64>,

    /// Run the whole flow without sending anything
    #[arg(long)]
    pub dry_run: bool,

    /// Bot token
    #[arg(long, env = "TELEGRAM_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Override Bot API base URL
    #[arg(long, env = "TELEGRAM_API_BASE")]
    pub api_base: Option<String>,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "BROADCAST_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Recipient list to validate
    #[arg(short, long)]
    pub recipients: Option<PathBuf>,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Default log level; `RUST_LOG` still overrides it
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

fn parse_log_format(s: &str) -> anyhow::Result<LogFormat> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_send_requires_message() {
        let err = Cli::try_parse_from(["broadcast", "send", "-r", "ids.txt"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        let cli = Cli::try_parse_from([
            "broadcast",
            "send",
            "-r",
            "ids.txt",
            "--text",
            "<b>hi</b>",
            "--dry-run",
            "--concurrency",
            "5",
        ])
        .unwrap();
        match cli.command {
            Commands::Send(args) => {
                assert!(args.dry_run);
                assert_eq!(args.concurrency, Some(5));
                assert_eq!(args.text.as_deref(), Some("<b>hi</b>"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_log_options() {
        let cli = Cli::try_parse_from([
            "broadcast", "-vv", "--log-format", "compact", "validate",
        ])
        .unwrap();
        assert_eq!(cli.log_level(), "trace");
        assert!(matches!(cli.log_format, LogFormat::Compact));

        let cli = Cli::try_parse_from(["broadcast", "-q", "validate"]).unwrap();
        assert_eq!(cli.log_level(), "warn");
        assert!(matches!(cli.log_format, LogFormat::Pretty));

        let err = Cli::try_parse_from(["broadcast", "--log-format", "xml", "validate"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_text_and_file_conflict() {
        let err = Cli::try_parse_from([
            "broadcast", "send", "-r", "ids.txt", "--text", "a", "--message-file", "m.txt",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }
}
