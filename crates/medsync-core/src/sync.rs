//! Two-way sync between the app medication list and an external health store.
//!
//! The orchestrator owns the I/O side of reconciliation: it fetches external
//! records, runs [`reconcile`], writes the missing medications back and folds
//! the write outcomes into the result.

use std::future::Future;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::AppError;
use crate::models::{ExternalMedication, Medication, MedicationDoseRecord};
use crate::reconcile::{plan_import, reconcile, ImportResult, MedicationSyncResult, WriteFailure};

/// Read/write access to an external health store.
pub trait HealthStore: Send + Sync {
    /// Fetches the medication statements held by the store.
    fn fetch_medications(
        &self,
    ) -> impl Future<Output = Result<Vec<ExternalMedication>, AppError>> + Send;

    /// Fetches the store's medications as dose records.
    ///
    /// Statements carry no administration time, so the default implementation
    /// dates every record with the fetch time.
    fn fetch_medication_records(
        &self,
    ) -> impl Future<Output = Result<Vec<MedicationDoseRecord>, AppError>> + Send {
        async move {
            let fetched_at = Utc::now();
            let medications = self.fetch_medications().await?;
            Ok(medications
                .iter()
                .map(|m| m.to_dose_record(fetched_at))
                .collect())
        }
    }

    /// Records one administration of a medication. `Ok` means the store
    /// accepted the write.
    fn write_medication_dose(
        &self,
        name: &str,
        dosage: &str,
        date_taken: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Observer invoked with a fetch error before it is downgraded to "no records".
pub type FetchErrorHook = Box<dyn Fn(&AppError) + Send + Sync>;

/// Drives fetch, reconciliation and write-back against one [`HealthStore`].
///
/// A run is not cancellable once started. Callers that may trigger several
/// syncs at once are expected to serialize them.
///
/// # Examples
///
/// ```no_run
/// use medsync_core::sync::{HealthStore, SyncOrchestrator};
/// use medsync_core::Medication;
///
/// # async fn example<S: HealthStore>(store: S) -> Result<(), medsync_core::AppError> {
/// let meds = vec![Medication::new("Metformin", "500mg", "twice daily")];
/// let orchestrator = SyncOrchestrator::new(store);
/// let result = orchestrator.perform_two_way_sync(&meds).await?;
/// println!("{}", result.summary());
/// # Ok(())
/// # }
/// ```
pub struct SyncOrchestrator<S> {
    store: S,
    config: SyncConfig,
    on_fetch_error: Option<FetchErrorHook>,
}

impl<S: HealthStore> SyncOrchestrator<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: SyncConfig::default(),
            on_fetch_error: None,
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers an observer for swallowed fetch failures.
    pub fn on_fetch_error(mut self, hook: impl Fn(&AppError) + Send + Sync + 'static) -> Self {
        self.on_fetch_error = Some(Box::new(hook));
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fetches external records, falling back to an empty list on failure
    /// unless `fail_on_fetch_error` is set.
    async fn fetch_records_or_empty(&self) -> Result<Vec<MedicationDoseRecord>, AppError> {
        match self.store.fetch_medication_records().await {
            Ok(records) => {
                debug!(count = records.len(), "fetched external medication records");
                Ok(records)
            }
            Err(e) => self.handle_fetch_error(e).map(|_| Vec::new()),
        }
    }

    async fn fetch_medications_or_empty(&self) -> Result<Vec<ExternalMedication>, AppError> {
        match self.store.fetch_medications().await {
            Ok(medications) => Ok(medications),
            Err(e) => self.handle_fetch_error(e).map(|_| Vec::new()),
        }
    }

    fn handle_fetch_error(&self, error: AppError) -> Result<(), AppError> {
        if let Some(hook) = &self.on_fetch_error {
            hook(&error);
        }
        if self.config.fail_on_fetch_error {
            return Err(error);
        }
        warn!(error = %error, "external fetch failed, continuing with no records");
        Ok(())
    }

    /// Fetches and reconciles without writing anything back.
    pub async fn reconcile_only(
        &self,
        app_medications: &[Medication],
    ) -> Result<MedicationSyncResult, AppError> {
        let records = self.fetch_records_or_empty().await?;
        Ok(reconcile(app_medications, &records))
    }

    /// Fetches, reconciles, and writes every unmatched app medication to the store.
    ///
    /// All writes are attempted even after a failure, and all of them finish
    /// before the result is returned. `external_write_success` is the AND of
    /// the individual outcomes. Only fails when `fail_on_fetch_error` is set
    /// and the fetch fails.
    pub async fn perform_two_way_sync(
        &self,
        app_medications: &[Medication],
    ) -> Result<MedicationSyncResult, AppError> {
        let mut result = self.reconcile_only(app_medications).await?;

        let failures = self.write_medications(&result.medications_to_write).await;
        result.external_write_success = failures.is_empty();
        result.write_failures = failures;

        info!(
            matched = result.matched_medications.len(),
            unmatched = result.unmatched_health_records.len(),
            written = result.medications_to_write.len(),
            success = result.external_write_success,
            "two-way medication sync complete"
        );

        Ok(result)
    }

    /// Writes one dose per medication, dated now, and returns the failures.
    pub async fn write_medications(&self, medications: &[Medication]) -> Vec<WriteFailure> {
        if medications.is_empty() {
            return Vec::new();
        }

        let date_taken = Utc::now();
        let store = &self.store;

        let outcomes: Vec<_> = stream::iter(medications)
            .map(|medication| async move {
                let outcome = store
                    .write_medication_dose(&medication.name, &medication.dosage, date_taken)
                    .await;
                (medication, outcome)
            })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        outcomes
            .into_iter()
            .enumerate()
            .filter_map(|(index, (medication, outcome))| match outcome {
                Ok(()) => {
                    debug!(medication = %medication.name, "wrote medication to external store");
                    None
                }
                Err(e) => {
                    warn!(medication = %medication.name, error = %e, "failed to write medication");
                    Some(WriteFailure {
                        index,
                        medication_name: medication.name.clone(),
                        error: e.to_string(),
                    })
                }
            })
            .collect()
    }

    /// Fetches external medications and proposes the ones the app lacks.
    pub async fn import_from_store(
        &self,
        existing: &[Medication],
    ) -> Result<ImportResult, AppError> {
        let external = self.fetch_medications_or_empty().await?;
        let result = plan_import(existing, &external);
        info!("{}", result.summary());
        Ok(result)
    }

    /// Records a single dose of `medication` taken at `date_taken`.
    pub async fn record_medication_taken(
        &self,
        medication: &Medication,
        date_taken: DateTime<Utc>,
    ) -> Result<(), AppError> {
        match self
            .store
            .write_medication_dose(&medication.name, &medication.dosage, date_taken)
            .await
        {
            Ok(()) => {
                info!(medication = %medication.name, %date_taken, "recorded dose");
                Ok(())
            }
            Err(e) => {
                warn!(medication = %medication.name, error = %e, "failed to record dose");
                Err(e)
            }
        }
    }
}
