use billflow::application::engine::BillingEngine;
use billflow::config::EngineConfig;
use billflow::error::Result as AppResult;
use billflow::infrastructure::in_memory::{InMemoryBillingProvider, PurchaseBehavior};
use billflow::interfaces::csv::catalog_reader::CatalogReader;
use billflow::interfaces::csv::command_reader::{Command, CommandKind, CommandReader};
use billflow::interfaces::csv::entry_writer::EntryWriter;
use billflow::telemetry::init_tracing;
use clap::{Parser, ValueEnum};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Catalog CSV: store listings, item kinds and already owned purchases
    catalog: PathBuf,

    /// Commands CSV to run against the engine, in order
    commands: PathBuf,

    /// JSON file overriding the engine configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// What the simulated user does when a purchase flow is launched
    #[arg(long, value_enum, default_value_t = PurchaseOutcome::Approve)]
    purchase_outcome: PurchaseOutcome,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PurchaseOutcome {
    Approve,
    Pending,
    Cancel,
}

impl From<PurchaseOutcome> for PurchaseBehavior {
    fn from(outcome: PurchaseOutcome) -> Self {
        match outcome {
            PurchaseOutcome::Approve => Self::Approve,
            PurchaseOutcome::Pending => Self::Pending,
            PurchaseOutcome::Cancel => Self::Cancel,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path).into_diagnostic()?,
        None => EngineConfig::default(),
    };

    let provider = Arc::new(InMemoryBillingProvider::new());
    provider.set_purchase_behavior(cli.purchase_outcome.into());

    // Seed the provider and collect the entries the engine will know about
    let mut entries = Vec::new();
    let file = File::open(&cli.catalog).into_diagnostic()?;
    for row in CatalogReader::new(file).rows() {
        match row {
            Ok(row) => {
                provider.add_listing(row.listing());
                if let Some(purchase) = row.purchase() {
                    provider.add_purchase(purchase);
                }
                entries.push(row.entry());
            }
            Err(e) => error!(error = %e, "Error reading catalog row"),
        }
    }
    info!(items = entries.len(), "catalog loaded");

    let engine = BillingEngine::new(provider, entries, config);

    let file = File::open(&cli.commands).into_diagnostic()?;
    for command in CommandReader::new(file).commands() {
        match command {
            Ok(command) => {
                if let Err(e) = run_command(&engine, &command).await {
                    warn!(command = %command.command, error = %e, "Command failed");
                }
            }
            Err(e) => error!(error = %e, "Error reading command"),
        }
    }

    engine.close();

    let stdout = io::stdout();
    let mut writer = EntryWriter::new(stdout.lock());
    writer.write_entries(&engine.entries()).into_diagnostic()?;

    Ok(())
}

async fn run_command(engine: &BillingEngine, command: &Command) -> AppResult<()> {
    match command.command {
        CommandKind::List => {
            let ids = match command.id.as_deref().filter(|id| !id.is_empty()) {
                Some(id) => vec![id.to_string()],
                None => engine
                    .entries()
                    .iter()
                    .map(|entry| entry.id().to_string())
                    .collect(),
            };
            let listed = engine.list_catalog(&ids).await?;
            for entry in &listed {
                info!(
                    id = entry.id(),
                    title = entry.title().unwrap_or_default(),
                    price = entry.price().unwrap_or_default(),
                    "listed"
                );
            }
        }
        CommandKind::Purchase => {
            let id = command.require_id()?;
            match engine.purchase(id, true).await? {
                Some(entry) => info!(%entry, "purchased"),
                None => info!(id, "purchase not completed"),
            }
        }
        CommandKind::Acknowledge => {
            let entry = engine.acknowledge(command.require_id()?).await?;
            info!(%entry, "acknowledged");
        }
        CommandKind::Consume => {
            let entry = engine.consume(command.require_id()?).await?;
            info!(%entry, "consumed");
        }
        CommandKind::Restore => match engine.restore_purchases(true).await? {
            Some(entry) => info!(%entry, "restored"),
            None => info!("nothing to restore"),
        },
    }
    Ok(())
}
