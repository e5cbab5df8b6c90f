//! Command-line surface of the `stagerelay` binary.
//!
//! Only this layer reads the environment. Everything it learns is folded
//! into a [`RelayConfig`] before any adapter is built.

mod commands;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::context::{MarketSnapshot, StageInput, WorkKey};
use crate::core::StageRequest;
use crate::errors::ValidationError;
use crate::observability::LogFormat;

/// Three-stage market analysis relay.
#[derive(Parser, Debug)]
#[command(name = "stagerelay", version)]
#[command(about = "Runs one stage of a three-stage analysis pipeline")]
pub struct Cli {
    /// Settings shared by every command.
    #[command(flatten)]
    pub global: GlobalArgs,

    /// What to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Settings shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// TOML configuration file
    #[arg(long, global = true, env = "STAGERELAY_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Override the results directory
    #[arg(long, global = true, value_name = "DIR")]
    pub results_dir: Option<PathBuf>,

    /// Park undelivered triggers in this directory
    #[arg(long, global = true, value_name = "DIR")]
    pub outbox_dir: Option<PathBuf>,

    /// OpenAI API key
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Anthropic API key
    #[arg(long, global = true, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: Option<String>,

    /// Token for the trigger endpoint
    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Repository receiving triggers, as `owner/name`
    #[arg(long, global = true, env = "GITHUB_REPOSITORY")]
    pub github_repository: Option<String>,
}

impl GlobalArgs {
    /// Loads the configuration file, if any, and applies the overrides.
    ///
    /// # Errors
    ///
    /// Fails if the configuration file cannot be read or parsed.
    pub fn load_config(&self) -> anyhow::Result<RelayConfig> {
        let mut config = match self.config {
            Some(ref path) => RelayConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => RelayConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    /// Overwrites configured values with the ones given on the command line
    /// or through the environment.
    pub fn apply(&self, config: &mut RelayConfig) {
        if let Some(ref dir) = self.results_dir {
            config.results_dir.clone_from(dir);
        }
        if let Some(ref dir) = self.outbox_dir {
            config.outbox_dir = Some(dir.clone());
        }
        if let Some(ref key) = self.openai_api_key {
            config.openai.api_key = Some(key.clone());
        }
        if let Some(ref key) = self.anthropic_api_key {
            config.anthropic.api_key = Some(key.clone());
        }
        if let Some(ref token) = self.github_token {
            config.dispatch.token = Some(token.clone());
        }
        if let Some(ref repo) = self.github_repository {
            config.dispatch.repository = Some(repo.clone());
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the first stage from a market snapshot
    FastAssessment(FastAssessmentArgs),
    /// Run the second stage from the first stage's output
    DeepAnalysis(DeepAnalysisArgs),
    /// Run the final stage and write the combined artifact
    FinalComparison(FinalComparisonArgs),
    /// Run the stage named by a trigger event
    RunEvent(RunEventArgs),
    /// Inspect or re-send undelivered triggers
    #[command(subcommand)]
    Outbox(OutboxCommand),
}

/// Arguments of `fast-assessment`.
#[derive(Args, Debug, Clone)]
pub struct FastAssessmentArgs {
    /// Instrument symbol
    #[arg(long)]
    pub symbol: String,
    /// Last price
    #[arg(long)]
    pub price: f64,
    /// Percent change
    #[arg(long, allow_negative_numbers = true)]
    pub change: f64,
    /// Traded volume
    #[arg(long)]
    pub volume: f64,
    /// Status webhook
    #[arg(long)]
    pub webhook_url: String,
}

impl FastAssessmentArgs {
    /// Builds the request for a new run.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for a blank symbol, unusable numbers or an
    /// unusable webhook.
    pub fn into_request(self) -> Result<StageRequest, ValidationError> {
        let snapshot = MarketSnapshot::new(self.price, self.change, self.volume)?;
        StageRequest::new(
            WorkKey::new(&self.symbol)?,
            StageInput::FastAssessment { snapshot },
            &self.webhook_url,
        )
    }
}

/// Arguments of `deep-analysis`.
#[derive(Args, Debug, Clone)]
pub struct DeepAnalysisArgs {
    /// Instrument symbol
    #[arg(long)]
    pub symbol: String,
    /// Output of the first stage
    #[arg(long)]
    pub stage1_output: String,
    /// Status webhook
    #[arg(long)]
    pub webhook_url: String,
    /// Continue this run instead of starting a new one
    #[arg(long)]
    pub run_id: Option<Uuid>,
}

impl DeepAnalysisArgs {
    /// Builds the request.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for a blank symbol or output, or an unusable
    /// webhook.
    pub fn into_request(self) -> Result<StageRequest, ValidationError> {
        StageRequest::new(
            WorkKey::resume(&self.symbol, self.run_id, None)?,
            StageInput::DeepAnalysis {
                stage1_output: self.stage1_output,
            },
            &self.webhook_url,
        )
    }
}

/// Arguments of `final-comparison`.
#[derive(Args, Debug, Clone)]
pub struct FinalComparisonArgs {
    /// Instrument symbol
    #[arg(long)]
    pub symbol: String,
    /// Output of the first stage
    #[arg(long)]
    pub stage1_output: String,
    /// Output of the second stage
    #[arg(long)]
    pub stage2_output: String,
    /// Status webhook
    #[arg(long)]
    pub webhook_url: String,
    /// Continue this run instead of starting a new one
    #[arg(long)]
    pub run_id: Option<Uuid>,
}

impl FinalComparisonArgs {
    /// Builds the request.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for a blank symbol or output, or an unusable
    /// webhook.
    pub fn into_request(self) -> Result<StageRequest, ValidationError> {
        StageRequest::new(
            WorkKey::resume(&self.symbol, self.run_id, None)?,
            StageInput::FinalComparison {
                stage1_output: self.stage1_output,
                stage2_output: self.stage2_output,
            },
            &self.webhook_url,
        )
    }
}

/// Arguments of `run-event`.
#[derive(Args, Debug, Clone)]
pub struct RunEventArgs {
    /// File holding the event JSON, or `-` for stdin
    #[arg(long, value_name = "FILE")]
    pub payload: String,
}

/// `outbox` subcommands.
#[derive(Subcommand, Debug, Clone, Copy)]
pub enum OutboxCommand {
    /// Re-send every parked trigger
    Flush,
    /// Print parked triggers
    List,
}

impl Cli {
    /// Runs the parsed command and returns the process exit code.
    pub async fn run(self) -> ExitCode {
        let code = match self.command {
            Command::FastAssessment(args) => commands::run_request(&self.global, args.into_request()).await,
            Command::DeepAnalysis(args) => commands::run_request(&self.global, args.into_request()).await,
            Command::FinalComparison(args) => commands::run_request(&self.global, args.into_request()).await,
            Command::RunEvent(args) => commands::run_event(&self.global, &args).await,
            Command::Outbox(OutboxCommand::Flush) => commands::outbox_flush(&self.global).await,
            Command::Outbox(OutboxCommand::List) => commands::outbox_list(&self.global).await,
        };
        ExitCode::from(code)
    }
}
