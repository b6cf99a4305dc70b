//! Local JSON file acting as an external health store.
//!
//! The file holds a single document:
//!
//! ```json
//! { "records": [ { "name": "Aspirin", "dosage": "81mg", "dateTaken": "2025-01-01T08:00:00Z" } ] }
//! ```
//!
//! A missing file reads as an empty store. Writes append a record and
//! rewrite the file through a temporary sibling, so a crash never leaves a
//! half-written document behind.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use medsync_core::error::AppError;
use medsync_core::models::{ExternalMedication, MedicationDoseRecord};
use medsync_core::sync::HealthStore;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    records: Vec<MedicationDoseRecord>,
}

/// File-backed [`HealthStore`].
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles from concurrent writes.
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every stored record in file order.
    pub async fn load_records(&self) -> Result<Vec<MedicationDoseRecord>, AppError> {
        Ok(self.load_document().await?.records)
    }

    async fn load_document(&self) -> Result<StoreDocument, AppError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(StoreDocument::default()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "store file missing, treating as empty");
                Ok(StoreDocument::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save_document(&self, document: &StoreDocument) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

impl HealthStore for JsonFileStore {
    async fn fetch_medications(&self) -> Result<Vec<ExternalMedication>, AppError> {
        let records = self.load_records().await?;
        Ok(records
            .into_iter()
            .map(|record| ExternalMedication {
                display_name: record.name,
                dosage_string: Some(record.dosage),
                ..Default::default()
            })
            .collect())
    }

    async fn fetch_medication_records(&self) -> Result<Vec<MedicationDoseRecord>, AppError> {
        self.load_records().await
    }

    async fn write_medication_dose(
        &self,
        name: &str,
        dosage: &str,
        date_taken: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;

        let mut document = self.load_document().await?;
        document
            .records
            .push(MedicationDoseRecord::new(name, dosage, date_taken));
        self.save_document(&document).await?;

        debug!(medication = name, path = %self.path.display(), "appended dose record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use medsync_core::{Medication, SyncOrchestrator};

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("store.json"));

        assert!(store.load_records().await.unwrap().is_empty());
        assert!(store.fetch_medications().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("store.json"));
        let date = Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap();

        store.write_medication_dose("Aspirin", "81mg", date).await.unwrap();
        store.write_medication_dose("Metformin", "500mg", date).await.unwrap();

        let records = store.fetch_medication_records().await.unwrap();
        assert_eq!(
            records,
            vec![
                MedicationDoseRecord::new("Aspirin", "81mg", date),
                MedicationDoseRecord::new("Metformin", "500mg", date),
            ]
        );
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_reads_camel_case_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(
            &path,
            r#"{"records": [{"name": "Warfarin", "dosage": "5mg", "dateTaken": "2025-02-03T04:05:06Z"}]}"#,
        )
        .unwrap();

        let store = JsonFileStore::new(&path);
        let medications = store.fetch_medications().await.unwrap();
        assert_eq!(medications.len(), 1);
        assert_eq!(medications[0].preferred_name(), "Warfarin");
        assert_eq!(medications[0].effective_dosage(), "5mg");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonFileStore::new(&path);
        let result = store.load_records().await;
        assert!(matches!(result, Err(AppError::SerializationError(_))));
    }

    #[tokio::test]
    async fn test_second_sync_matches_written_medications() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("store.json"));
        let orchestrator = SyncOrchestrator::new(store);
        let meds = vec![
            Medication::new("Metformin", "500mg", "twice daily"),
            Medication::new("Lisinopril", "10mg", "daily"),
            Medication::new("Atorvastatin", "20mg", "nightly"),
        ];

        let first = orchestrator.perform_two_way_sync(&meds).await.unwrap();
        assert_eq!(first.medications_to_write.len(), 3);
        assert!(first.external_write_success);
        assert_eq!(orchestrator.store().load_records().await.unwrap().len(), 3);

        let second = orchestrator.perform_two_way_sync(&meds).await.unwrap();
        assert_eq!(second.matched_medications.len(), 3);
        assert!(second.medications_to_write.is_empty());
        assert!(second.unmatched_health_records.is_empty());
    }
}
