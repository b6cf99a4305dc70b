//! MedSync CLI - Command-line interface for MedSync medication reconciliation
//!
//! This crate provides the CLI application that ties together all MedSync components.

pub mod config;
pub mod report;

pub use config::{Command, Config, OutputFormat};
