use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use medsync_core::config::{HttpConfig, MAX_HTTP_RETRIES};
use medsync_core::error::AppError;
use medsync_core::models::ExternalMedication;
use medsync_core::sync::HealthStore;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info};
use url::Url;

/// Most statements fetched per sync, newest first.
pub const STATEMENT_PAGE_SIZE: u32 = 100;

/// Dosage used when a statement carries no dosage text.
pub const DEFAULT_DOSAGE: &str = "As prescribed";

const FHIR_JSON: &str = "application/fhir+json";

/// Longest single wait between retries.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Which failures a request may be repeated after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryPolicy {
    /// Reads: any retryable error.
    Idempotent,
    /// Creates: only failures where the server cannot have stored anything.
    /// A timeout or 5xx may follow a committed write, so those are final.
    CreateOnce,
}

impl RetryPolicy {
    fn should_retry(self, error: &AppError) -> bool {
        match self {
            RetryPolicy::Idempotent => error.is_retryable(),
            RetryPolicy::CreateOnce => matches!(
                error,
                AppError::NetworkError(_) | AppError::RateLimitExceeded
            ),
        }
    }
}

/// Wait before retry number `attempt`: exponential for 429, linear otherwise,
/// capped at `MAX_BACKOFF`.
fn backoff_delay(base: Duration, attempt: u32, error: &AppError) -> Duration {
    let factor = match error {
        AppError::RateLimitExceeded => 2_u32.checked_pow(attempt).unwrap_or(u32::MAX),
        _ => attempt,
    };
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

/// Minimal FHIR `Bundle` envelope.
///
/// FHIR search reference: <https://hl7.org/fhir/R4/bundle.html>
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Bundle {
    resource_type: String,
    #[serde(default)]
    entry: Vec<BundleEntry>,
}

#[derive(Deserialize, Debug)]
struct BundleEntry {
    resource: Option<Value>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Coding {
    pub code: Option<String>,
    pub display: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct CodeableConcept {
    #[serde(default)]
    pub coding: Vec<Coding>,
    pub text: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Reference {
    pub display: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct FhirDosage {
    pub text: Option<String>,
}

/// Data Transfer Object for a FHIR `MedicationStatement`.
///
/// Only the fields needed to name the medication and describe its dosage are
/// kept. Dosage is read from `dosageInstruction` (DSTU2) or `dosage` (R4).
///
/// # Examples
///
/// ```
/// use medsync_client::fhir::FhirMedicationStatement;
///
/// let json = r#"{
///     "resourceType": "MedicationStatement",
///     "id": "ms-1",
///     "medicationCodeableConcept": {"coding": [{"display": "Lisinopril 10 MG"}]},
///     "dosage": [{"text": "10mg once daily"}]
/// }"#;
///
/// let statement: FhirMedicationStatement = serde_json::from_str(json).unwrap();
/// let medication = statement.into_external_medication().unwrap();
/// assert_eq!(medication.display_name, "Lisinopril 10 MG");
/// assert_eq!(medication.effective_dosage(), "10mg once daily");
/// ```
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct FhirMedicationStatement {
    pub id: Option<String>,
    pub medication_codeable_concept: Option<CodeableConcept>,
    pub medication_reference: Option<Reference>,
    #[serde(default)]
    pub dosage_instruction: Vec<FhirDosage>,
    #[serde(default)]
    pub dosage: Vec<FhirDosage>,
}

impl FhirMedicationStatement {
    /// Name from the first coding's display, else from the medication reference.
    pub fn medication_name(&self) -> Option<&str> {
        self.medication_codeable_concept
            .as_ref()
            .and_then(|concept| concept.coding.first())
            .and_then(|coding| coding.display.as_deref())
            .or_else(|| {
                self.medication_reference
                    .as_ref()
                    .and_then(|reference| reference.display.as_deref())
            })
    }

    /// Text of the first dosage entry, if any.
    pub fn dosage_text(&self) -> Option<&str> {
        let dosages = if self.dosage_instruction.is_empty() {
            &self.dosage
        } else {
            &self.dosage_instruction
        };
        dosages.first().and_then(|d| d.text.as_deref())
    }

    /// Converts the statement into MedSync's model. Statements without a
    /// medication name yield `None`.
    pub fn into_external_medication(self) -> Option<ExternalMedication> {
        let name = self.medication_name()?.to_string();
        let dosage = self.dosage_text().unwrap_or(DEFAULT_DOSAGE).to_string();

        Some(ExternalMedication {
            display_name: name.clone(),
            brand_name: None,
            generic_name: Some(name),
            medication_identifier: self.id,
            dosage_form_code: None,
            strength: None,
            dosage_string: Some(dosage),
        })
    }
}

/// Extracts every nameable `MedicationStatement` from a search `Bundle`.
///
/// Entries of other resource types are ignored.
///
/// # Errors
///
/// Returns `AppError::SerializationError` if the body is not JSON and
/// `AppError::InvalidFhirResource` if it is not a `Bundle`.
pub fn parse_medication_bundle(body: &str) -> Result<Vec<ExternalMedication>, AppError> {
    let bundle: Bundle = serde_json::from_str(body)?;
    if bundle.resource_type != "Bundle" {
        return Err(AppError::InvalidFhirResource(format!(
            "expected Bundle, got {}",
            bundle.resource_type
        )));
    }

    let medications = bundle
        .entry
        .into_iter()
        .filter_map(|entry| entry.resource)
        .filter(|resource| {
            resource.get("resourceType").and_then(Value::as_str) == Some("MedicationStatement")
        })
        .filter_map(|resource| match serde_json::from_value::<FhirMedicationStatement>(resource) {
            Ok(statement) => statement.into_external_medication(),
            Err(e) => {
                debug!(error = %e, "skipping malformed MedicationStatement");
                None
            }
        })
        .collect();

    Ok(medications)
}

/// FHIR `MedicationAdministration` body used to record one dose.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct MedicationAdministration {
    resource_type: &'static str,
    status: &'static str,
    medication_codeable_concept: ConceptText,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<SubjectReference>,
    effective_date_time: String,
    dosage: DosageText,
}

#[derive(Serialize, Debug)]
struct ConceptText {
    text: String,
}

#[derive(Serialize, Debug)]
struct SubjectReference {
    reference: String,
}

#[derive(Serialize, Debug)]
struct DosageText {
    text: String,
}

/// HTTP client for a FHIR R4 server acting as the external health store.
///
/// Reads `MedicationStatement` resources and records doses as
/// `MedicationAdministration` resources.
///
/// # Examples
///
/// ```no_run
/// use medsync_client::FhirClient;
/// use medsync_core::HttpConfig;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = FhirClient::new("https://hapi.fhir.org/baseR4", HttpConfig::default())?
///     .with_patient("example");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FhirClient {
    client: Client,
    base_url: Url,
    patient_id: Option<String>,
    http: HttpConfig,
}

impl FhirClient {
    /// Creates a client for the FHIR server at `base_url_str`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidUrl` if the URL is malformed or not HTTP(S).
    /// Returns `AppError::ClientError` if the HTTP client cannot be built.
    ///
    /// `http.max_retries` is clamped to `1..=MAX_HTTP_RETRIES`.
    pub fn new(base_url_str: &str, mut http: HttpConfig) -> Result<Self, AppError> {
        http.max_retries = http.max_retries.clamp(1, MAX_HTTP_RETRIES);

        let mut base_url =
            Url::parse(base_url_str).map_err(|_| AppError::InvalidUrl(base_url_str.to_string()))?;

        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(AppError::InvalidUrl(base_url_str.to_string()));
        }

        // Url::join replaces the last segment unless the path ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .user_agent("MedSync/0.1")
            .timeout(http.timeout)
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            patient_id: None,
            http,
        })
    }

    /// Restricts reads and writes to one patient.
    pub fn with_patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    fn resource_url(&self, resource_type: &str) -> Result<Url, AppError> {
        self.base_url
            .join(resource_type)
            .map_err(|e| AppError::InvalidUrl(e.to_string()))
    }

    fn statements_url(&self) -> Result<Url, AppError> {
        let mut url = self.resource_url("MedicationStatement")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("_count", &STATEMENT_PAGE_SIZE.to_string());
            query.append_pair("_sort", "-effective");
            if let Some(patient) = &self.patient_id {
                query.append_pair("patient", patient);
            }
        }
        Ok(url)
    }

    fn administration_body(
        &self,
        name: &str,
        dosage: &str,
        date_taken: DateTime<Utc>,
    ) -> MedicationAdministration {
        MedicationAdministration {
            resource_type: "MedicationAdministration",
            status: "completed",
            medication_codeable_concept: ConceptText {
                text: name.to_string(),
            },
            subject: self.patient_id.as_ref().map(|id| SubjectReference {
                reference: format!("Patient/{}", id),
            }),
            effective_date_time: date_taken.to_rfc3339_opts(SecondsFormat::Secs, true),
            dosage: DosageText {
                text: dosage.to_string(),
            },
        }
    }

    /// Sends a request, retrying failures the `policy` allows.
    ///
    /// Connect errors, timeouts, 5xx and 429 count as transient. Other 4xx
    /// responses fail immediately.
    async fn send_with_retry<F>(
        &self,
        policy: RetryPolicy,
        build: F,
    ) -> Result<reqwest::Response, AppError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 1;

        loop {
            let error = match build().send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        AppError::RateLimitExceeded
                    } else if status.is_server_error() {
                        AppError::ServerError(status.as_u16())
                    } else {
                        // Client error (4xx except 429) - don't retry
                        return Err(AppError::ClientError(format!(
                            "HTTP {} from {}",
                            status.as_u16(),
                            resp.url()
                        )));
                    }
                }
                Err(e) if e.is_timeout() => AppError::Timeout(self.http.timeout.as_secs()),
                Err(e) if e.is_connect() => {
                    AppError::NetworkError(format!("Connection failed: {}", e))
                }
                Err(e) => AppError::ClientError(e.to_string()),
            };

            if attempt >= self.http.max_retries || !policy.should_retry(&error) {
                return Err(error);
            }

            let delay = backoff_delay(self.http.retry_base_delay, attempt, &error);
            debug!(attempt, error = %error, ?delay, "retrying request");
            sleep(delay).await;
            attempt += 1;
        }
    }
}

impl HealthStore for FhirClient {
    async fn fetch_medications(&self) -> Result<Vec<ExternalMedication>, AppError> {
        let url = self.statements_url()?;
        info!("Fetching medication statements from {}", url);

        let resp = self
            .send_with_retry(RetryPolicy::Idempotent, || {
                self.client.get(url.clone()).header(ACCEPT, FHIR_JSON)
            })
            .await?;

        let body = resp
            .text()
            .await
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        if body.trim().is_empty() {
            return Err(AppError::EmptyResponse);
        }

        let medications = parse_medication_bundle(&body)?;
        info!("Fetched {} medications from FHIR server", medications.len());
        Ok(medications)
    }

    async fn write_medication_dose(
        &self,
        name: &str,
        dosage: &str,
        date_taken: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let url = self.resource_url("MedicationAdministration")?;
        let body = self.administration_body(name, dosage, date_taken);

        self.send_with_retry(RetryPolicy::CreateOnce, || {
            self.client
                .post(url.clone())
                .header(ACCEPT, FHIR_JSON)
                .header(CONTENT_TYPE, FHIR_JSON)
                .json(&body)
        })
        .await
        .map_err(|e| AppError::WriteRejected(format!("{}: {}", name, e)))?;

        debug!(medication = name, "posted MedicationAdministration");
        Ok(())
    }
}
