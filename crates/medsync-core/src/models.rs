//! Domain types shared by the reconciliation engine and the health-store clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A medication tracked by the app.
///
/// Only `name`, `dosage` and `is_active` take part in reconciliation. The
/// remaining fields are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    /// Present once the medication has been persisted by the app backend.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    #[serde(default)]
    pub timing: Option<String>,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub laterality: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub full_instructions: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub discontinuation_reason: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub discontinued_date: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl Medication {
    /// Creates an active, unpersisted medication with only the core fields set.
    pub fn new(
        name: impl Into<String>,
        dosage: impl Into<String>,
        frequency: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            user_id: None,
            name: name.into(),
            dosage: dosage.into(),
            frequency: frequency.into(),
            timing: None,
            route: None,
            laterality: None,
            duration: None,
            instructions: None,
            full_instructions: None,
            is_active: true,
            discontinuation_reason: None,
            created_at: None,
            updated_at: None,
            discontinued_date: None,
        }
    }

    /// Returns a copy of this medication marked inactive.
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// One medication entry as recorded by the external health store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationDoseRecord {
    pub name: String,
    pub dosage: String,
    pub date_taken: DateTime<Utc>,
}

impl MedicationDoseRecord {
    pub fn new(name: impl Into<String>, dosage: impl Into<String>, date_taken: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            dosage: dosage.into(),
            date_taken,
        }
    }
}

/// A medication statement read from the external health store, before it is
/// flattened into a [`MedicationDoseRecord`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalMedication {
    pub display_name: String,
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default)]
    pub generic_name: Option<String>,
    #[serde(default)]
    pub medication_identifier: Option<String>,
    #[serde(default)]
    pub dosage_form_code: Option<String>,
    /// Strength as free text, e.g. "10 mg".
    #[serde(default)]
    pub strength: Option<String>,
    #[serde(default)]
    pub dosage_string: Option<String>,
}

impl ExternalMedication {
    /// Brand name, then generic name, then display name.
    pub fn preferred_name(&self) -> &str {
        self.brand_name
            .as_deref()
            .or(self.generic_name.as_deref())
            .unwrap_or(&self.display_name)
    }

    /// Explicit dosage text, then strength, then "Unknown dosage".
    pub fn effective_dosage(&self) -> &str {
        self.dosage_string
            .as_deref()
            .or(self.strength.as_deref())
            .unwrap_or("Unknown dosage")
    }

    /// Flattens this statement into a dose record dated `date_taken`.
    pub fn to_dose_record(&self, date_taken: DateTime<Utc>) -> MedicationDoseRecord {
        MedicationDoseRecord::new(self.preferred_name(), self.effective_dosage(), date_taken)
    }
}

/// How an app medication was matched against the external store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchType {
    /// Same normalized name and at least one record with a compatible dosage.
    NameAndDosage,
    /// Same normalized name, but no record with a compatible dosage.
    NameOnly,
}

/// An app medication paired with the external records that corroborate it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationMatch {
    pub app_medication: Medication,
    /// Records with a compatible dosage. Empty for [`MatchType::NameOnly`].
    pub health_records: Vec<MedicationDoseRecord>,
    pub match_type: MatchType,
}
