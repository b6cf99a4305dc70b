//! Medication reconciliation between the app and an external health store.
//!
//! This module is pure business logic: it takes snapshots of both medication
//! lists and decides what matches and what must be written back. Fetching
//! and writing live in [`crate::sync`].

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::dosage::{dosages_compatible, normalize_name};
use crate::models::{ExternalMedication, MatchType, Medication, MedicationDoseRecord, MedicationMatch};

/// Frequency given to medications imported from the external store.
pub const IMPORTED_FREQUENCY: &str = "As prescribed";

/// Instructions given to medications imported from the external store.
pub const IMPORTED_INSTRUCTIONS: &str = "Synced from external health store";

/// A single write to the external store that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteFailure {
    /// Position of the medication in the list that was written.
    pub index: usize,
    pub medication_name: String,
    pub error: String,
}

/// Outcome of one reconciliation (and, after [`crate::sync`], one write-back).
///
/// Every active app medication lands in exactly one of `matched_medications`
/// or `medications_to_write`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationSyncResult {
    pub matched_medications: Vec<MedicationMatch>,
    /// External records with no compatible-dosage match in the app.
    pub unmatched_health_records: Vec<MedicationDoseRecord>,
    pub medications_to_write: Vec<Medication>,
    /// True only when every write-back succeeded. Always false straight out of
    /// [`reconcile`].
    pub external_write_success: bool,
    pub write_failures: Vec<WriteFailure>,
}

impl MedicationSyncResult {
    /// One-line human-readable report.
    pub fn summary(&self) -> String {
        format!(
            "Matched: {}, New from External: {}, Written to External: {}",
            self.matched_medications.len(),
            self.unmatched_health_records.len(),
            self.medications_to_write.len()
        )
    }

    /// Number of matches that were corroborated by a compatible dosage.
    pub fn dosage_confirmed_count(&self) -> usize {
        self.matched_medications
            .iter()
            .filter(|m| m.match_type == MatchType::NameAndDosage)
            .count()
    }
}

/// Partitions the active app medications against the external records.
///
/// Records are grouped by normalized name. An app medication whose name has a
/// group is matched, as `NameAndDosage` when some record in the group has a
/// compatible dosage and `NameOnly` otherwise. Medications without a group go
/// to the write-back list. Inactive medications are ignored entirely.
///
/// A record counts as unmatched unless its normalized name belongs to a match
/// that kept at least one compatible record. Records behind a `NameOnly` match
/// therefore stay in `unmatched_health_records` even though the medication is
/// matched.
pub fn reconcile(
    app_medications: &[Medication],
    health_records: &[MedicationDoseRecord],
) -> MedicationSyncResult {
    let mut groups: HashMap<String, Vec<&MedicationDoseRecord>> = HashMap::new();
    for record in health_records {
        groups.entry(normalize_name(&record.name)).or_default().push(record);
    }

    let mut matched_medications = Vec::new();
    let mut medications_to_write = Vec::new();

    for medication in app_medications.iter().filter(|m| m.is_active) {
        let key = normalize_name(&medication.name);

        let Some(group) = groups.get(&key) else {
            debug!(medication = %medication.name, "no external record, scheduling write");
            medications_to_write.push(medication.clone());
            continue;
        };

        let compatible: Vec<MedicationDoseRecord> = group
            .iter()
            .filter(|record| dosages_compatible(&medication.dosage, &record.dosage))
            .map(|record| (*record).clone())
            .collect();

        let match_type = if compatible.is_empty() {
            MatchType::NameOnly
        } else {
            MatchType::NameAndDosage
        };

        debug!(
            medication = %medication.name,
            candidates = group.len(),
            compatible = compatible.len(),
            ?match_type,
            "matched by name"
        );

        matched_medications.push(MedicationMatch {
            app_medication: medication.clone(),
            health_records: compatible,
            match_type,
        });
    }

    let matched_names: HashSet<String> = matched_medications
        .iter()
        .flat_map(|m| m.health_records.iter().map(|r| normalize_name(&r.name)))
        .collect();

    let unmatched_health_records = health_records
        .iter()
        .filter(|record| !matched_names.contains(&normalize_name(&record.name)))
        .cloned()
        .collect();

    MedicationSyncResult {
        matched_medications,
        unmatched_health_records,
        medications_to_write,
        external_write_success: false,
        write_failures: Vec::new(),
    }
}

// =============================================================================
// Import Planning
// =============================================================================

/// Medications found in the external store that the app does not track yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub total_external: usize,
    pub new_medications: Vec<Medication>,
    pub already_in_app: usize,
}

impl ImportResult {
    pub fn summary(&self) -> String {
        format!(
            "Found {} medications in external store. {} new, {} already in app.",
            self.total_external,
            self.new_medications.len(),
            self.already_in_app
        )
    }
}

/// Proposes app medications for every external medication the app lacks.
///
/// Presence is decided by normalized name against all existing medications,
/// active or not. Proposed medications are active, unpersisted, and use the
/// external preferred name and effective dosage.
pub fn plan_import(existing: &[Medication], external: &[ExternalMedication]) -> ImportResult {
    let known: HashSet<String> = existing.iter().map(|m| normalize_name(&m.name)).collect();

    let mut new_medications = Vec::new();
    let mut already_in_app = 0;

    for medication in external {
        if known.contains(&normalize_name(medication.preferred_name())) {
            already_in_app += 1;
            continue;
        }

        let mut proposed = Medication::new(
            medication.preferred_name(),
            medication.effective_dosage(),
            IMPORTED_FREQUENCY,
        );
        proposed.full_instructions = Some(IMPORTED_INSTRUCTIONS.to_string());
        new_medications.push(proposed);
    }

    ImportResult {
        total_external: external.len(),
        new_medications,
        already_in_app,
    }
}
