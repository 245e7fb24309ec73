//! `inboxward` - classify unread mail, archive or flag it, and build filters
//! for senders that keep sending marketing.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inboxward_core::{Engine, EngineConfig, JsonFileStorage, ReputationStore, SafetyFilter};
use inboxward_runtime::{
    connect_gmail, Classifier, Mailbox, OllamaClassifier, RunOrchestrator, RunSummary,
    RuntimeConfig, SyntheticMailbox,
};

#[derive(Parser, Debug)]
#[command(name = "inboxward", version, about = "Inbox triage agent")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Log intended changes without modifying the mailbox
    #[arg(long)]
    dry_run: bool,

    /// Use the built-in synthetic mailbox instead of Gmail
    #[arg(long)]
    mock: bool,

    /// Number of messages to process
    #[arg(long, default_value_t = 10)]
    limit: usize,

    /// Mailbox search query (overrides gmail.query)
    #[arg(long)]
    query: Option<String>,

    /// YAML settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Sender reputation file (overrides storage.senders_file)
    #[arg(long, global = true)]
    senders_file: Option<PathBuf>,

    /// JSON log file (overrides logging.log_file)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the stored reputation record for a sender
    Inspect {
        /// Sender address, exactly as recorded
        address: String,
    },
}

/// Contents of the settings file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Settings {
    engine: EngineConfig,

    #[serde(flatten)]
    runtime: RuntimeConfig,
}

impl Settings {
    fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read settings file {}", path.display()))?;
                serde_yaml::from_str(&contents)
                    .with_context(|| format!("Failed to parse settings file {}", path.display()))?
            }
            None => Settings::default(),
        };

        settings.engine.validate().context("Invalid engine settings")?;
        settings.runtime.validate().context("Invalid runtime settings")?;
        Ok(settings)
    }

    fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(query) = &cli.query {
            self.runtime.gmail.query = query.clone();
        }
        if let Some(path) = &cli.senders_file {
            self.runtime.storage.senders_file = path.clone();
        }
        if let Some(path) = &cli.log_file {
            self.runtime.logging.log_file = Some(path.clone());
        }
    }
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
            }
            let file = File::options()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

fn log_summary(summary: &RunSummary) {
    info!(
        seen = summary.seen,
        unavailable = summary.unavailable,
        protected_sender = summary.protected_sender,
        protected_content = summary.protected_content,
        archived = summary.archived,
        reviewed = summary.reviewed,
        skipped = summary.skipped,
        failed = summary.failed,
        promotions = summary.promotions,
        filters_created = summary.filters_created,
        "Run complete"
    );
    if summary.unsaved_reputation {
        warn!("Sender reputation changes from this run were not saved");
    }
}

fn inspect(settings: &Settings, address: &str, out: &mut impl Write) -> Result<()> {
    let store = ReputationStore::open(
        JsonFileStorage::new(&settings.runtime.storage.senders_file),
        settings.engine.trust_threshold,
    );

    match store.get_record(address) {
        Some(record) => {
            let json = serde_json::to_string_pretty(record).context("Failed to serialize record")?;
            writeln!(out, "{}", json)?;
        }
        None => writeln!(out, "No record for {}", address)?,
    }
    Ok(())
}

async fn run(cli: &Cli, settings: Settings) -> Result<()> {
    info!(dry_run = cli.dry_run, mock = cli.mock, limit = cli.limit, "Starting inboxward");

    let mailbox: Arc<dyn Mailbox> = if cli.mock {
        Arc::new(SyntheticMailbox::new())
    } else {
        let safety = SafetyFilter::from_config(&settings.engine);
        Arc::new(
            connect_gmail(&settings.runtime.gmail, safety)
                .await
                .context("Failed to connect to Gmail")?,
        )
    };

    let classifier: Arc<dyn Classifier> = Arc::new(
        OllamaClassifier::new(&settings.runtime.classifier)
            .context("Failed to build classifier")?,
    );

    let engine = Engine::open(
        settings.engine,
        JsonFileStorage::new(&settings.runtime.storage.senders_file),
    );

    let mut orchestrator = RunOrchestrator::new(mailbox, classifier, engine, cli.dry_run);
    let summary = orchestrator
        .run(&settings.runtime.gmail.query, cli.limit)
        .await;

    log_summary(&summary);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    settings.apply_overrides(&cli);

    init_logging(settings.runtime.logging.log_file.as_deref())?;

    match &cli.command {
        Some(Command::Inspect { address }) => inspect(&settings, address, &mut std::io::stdout()),
        None => run(&cli, settings).await,
    }
}
