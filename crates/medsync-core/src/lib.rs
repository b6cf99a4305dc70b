//! MedSync Core - medication reconciliation, sync orchestration, errors and configuration.

pub mod config;
pub mod dosage;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod sync;

pub use config::{
    default_config_path, default_store_path, load_config, HttpConfig, MedsyncConfig, StoreKind,
    SyncConfig, MAX_HTTP_RETRIES,
};
pub use dosage::{dosages_compatible, normalize_name, DosageComponents};
pub use error::AppError;
pub use models::{ExternalMedication, MatchType, Medication, MedicationDoseRecord, MedicationMatch};
pub use reconcile::{plan_import, reconcile, ImportResult, MedicationSyncResult, WriteFailure};
pub use sync::{HealthStore, SyncOrchestrator};
