use clap::Parser;
use escrowd::application::engine::{Collaborators, SettlementEngine, Stores};
use escrowd::config::SettlementConfig;
use escrowd::infrastructure::directory::DirectoryFixture;
use escrowd::infrastructure::outbound::{LogNotifier, RailBehavior, SimulatedRail};
use escrowd::interfaces::csv::account_writer::AccountWriter;
use escrowd::interfaces::journal::reader::JournalReader;
use escrowd::interfaces::journal::runner::JournalRunner;
use escrowd::telemetry;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Operation journal (JSON lines) to replay
    journal: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// JSON fixture with known applications and KYC-verified landlords
    #[arg(long)]
    directory: Option<PathBuf>,
}

fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = db_path {
        let store = escrowd::infrastructure::rocksdb::RocksDbStore::open(db_path).into_diagnostic()?;
        return Ok(Stores::shared(store));
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }

    Ok(Stores::in_memory())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SettlementConfig::load().into_diagnostic()?;
    telemetry::init(&config.log_level).into_diagnostic()?;

    let stores = open_stores(cli.db_path)?;
    let fixture = match cli.directory {
        Some(path) => DirectoryFixture::from_reader(File::open(path).into_diagnostic()?)
            .into_diagnostic()?,
        None => DirectoryFixture::default(),
    };
    let (applications, kyc) = fixture.into_directories().await;

    let engine = SettlementEngine::new(
        stores,
        Collaborators {
            applications: Arc::new(applications),
            kyc: Arc::new(kyc),
            notifier: Arc::new(LogNotifier),
            rail: Arc::new(SimulatedRail::new(RailBehavior::Succeed)),
        },
        &config,
    );

    let file = File::open(cli.journal).into_diagnostic()?;
    let mut runner = JournalRunner::new(&engine);
    for (index, entry) in JournalReader::new(file).entries().enumerate() {
        let outcome = match entry {
            Ok(entry) => runner.apply(entry).await,
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            tracing::error!(entry = index + 1, error = %e, "journal entry skipped");
        }
    }

    let accounts = engine.into_results().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = AccountWriter::new(stdout.lock());
    writer.write_accounts(&accounts).into_diagnostic()?;

    Ok(())
}
