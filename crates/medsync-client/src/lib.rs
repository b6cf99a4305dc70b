//! MedSync Client - external health-store implementations
//!
//! This crate provides [`HealthStore`](medsync_core::HealthStore) implementations for:
//!
//! - [`fhir`] - a FHIR R4 server (MedicationStatement reads, MedicationAdministration writes)
//! - [`file_store`] - a local JSON file, for offline use and testing
//!
//! # Overview
//!
//! The clients handle request building, response parsing, retries and
//! persistence. Matching logic stays in `medsync-core`.

pub mod fhir;
pub mod file_store;

// Re-export main client types
pub use fhir::FhirClient;
pub use file_store::JsonFileStore;
