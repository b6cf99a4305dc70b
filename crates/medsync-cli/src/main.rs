use std::path::Path;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::Parser;
use dotenvy::dotenv;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use medsync_cli::report::{render_import_report, render_sync_report};
use medsync_cli::{Command, Config, OutputFormat};
use medsync_client::{FhirClient, JsonFileStore};
use medsync_core::{
    default_store_path, load_config, AppError, HealthStore, Medication, MedsyncConfig, StoreKind,
    SyncConfig, SyncOrchestrator,
};

/// The health store selected from flags and config file.
enum Store {
    File(JsonFileStore),
    Fhir(FhirClient),
}

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::parse();

    // Setup logging (stderr to keep stdout clean for JSON output)
    let level = if config.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(config).await {
        match e.downcast_ref::<AppError>() {
            Some(app_error) => eprintln!("Error: {}", app_error.user_message()),
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let file_config = load_config(config.config.as_deref())?;
    let mut sync_config = file_config.sync_config();

    if let Command::Sync { strict: true, .. } = config.command {
        sync_config.fail_on_fetch_error = true;
    }

    match select_store(&config, &file_config)? {
        Store::File(store) => {
            info!("Using local health store at {}", store.path().display());
            execute(store, sync_config, config.command).await
        }
        Store::Fhir(client) => execute(client, sync_config, config.command).await,
    }
}

/// Picks the health store: CLI flags / env first, then the config file.
fn select_store(config: &Config, file_config: &MedsyncConfig) -> anyhow::Result<Store> {
    let patient = config
        .patient
        .clone()
        .or_else(|| file_config.store.patient_id.clone());

    let fhir_url = config.fhir_url.clone().or_else(|| {
        if config.store_file.is_none() && file_config.store.kind == StoreKind::Fhir {
            file_config.store.fhir_base_url.clone()
        } else {
            None
        }
    });

    if let Some(url) = fhir_url {
        let mut client = FhirClient::new(&url, file_config.http_config())?;
        if let Some(patient) = patient {
            client = client.with_patient(patient);
        }
        return Ok(Store::Fhir(client));
    }

    if config.store_file.is_none() && file_config.store.kind == StoreKind::Fhir {
        bail!("store kind is \"fhir\" but no fhir_base_url is configured (use --fhir-url)");
    }

    let path = config
        .store_file
        .clone()
        .or_else(|| file_config.store.path.clone())
        .or_else(default_store_path)
        .context("No health store configured. Pass --store-file or --fhir-url")?;

    Ok(Store::File(JsonFileStore::new(path)))
}

async fn execute<S: HealthStore>(
    store: S,
    sync_config: SyncConfig,
    command: Command,
) -> anyhow::Result<()> {
    let orchestrator = SyncOrchestrator::new(store).with_config(sync_config);

    match command {
        Command::Reconcile {
            medications,
            format,
        } => {
            let meds = load_medications(&medications)?;
            let result = orchestrator.reconcile_only(&meds).await?;
            match format {
                OutputFormat::Text => print!("{}", render_sync_report(&result, false)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
            }
        }
        Command::Sync {
            medications,
            format,
            ..
        } => {
            let meds = load_medications(&medications)?;
            info!("Syncing {} app medications...", meds.len());
            let result = orchestrator.perform_two_way_sync(&meds).await?;
            match format {
                OutputFormat::Text => print!("{}", render_sync_report(&result, true)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
            }
        }
        Command::Import {
            medications,
            format,
        } => {
            let meds = load_medications(&medications)?;
            let result = orchestrator.import_from_store(&meds).await?;
            match format {
                OutputFormat::Text => print!("{}", render_import_report(&result)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
            }
        }
        Command::Record { name, dosage, date } => {
            let date_taken = parse_date(date.as_deref())?;
            let medication = Medication::new(name, dosage, "");
            orchestrator
                .record_medication_taken(&medication, date_taken)
                .await?;
            println!("Recorded {} {} at {}", medication.name, medication.dosage, date_taken);
        }
    }

    Ok(())
}

/// Reads a JSON array of app medications.
fn load_medications(path: &Path) -> anyhow::Result<Vec<Medication>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read medications file {}", path.display()))?;
    let medications: Vec<Medication> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid medications file {}", path.display()))?;
    Ok(medications)
}

fn parse_date(date: Option<&str>) -> anyhow::Result<DateTime<Utc>> {
    match date {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("Invalid --date {:?}, expected RFC 3339", s))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}
