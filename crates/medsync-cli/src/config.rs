use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "medsync")]
#[command(
    author,
    version,
    about = "Reconcile an app medication list with an external health store"
)]
#[command(after_help = "Examples:
  medsync reconcile medications.json
  medsync sync medications.json --fhir-url https://hapi.fhir.org/baseR4 --patient example
  medsync import medications.json --format json > new_medications.json
  medsync record Metformin 500mg")]
pub struct Config {
    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long, env = "MEDSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Use a local JSON file as the health store
    #[arg(long, env = "MEDSYNC_STORE_FILE", global = true, conflicts_with = "fhir_url")]
    pub store_file: Option<PathBuf>,

    /// Use the FHIR server at this base URL as the health store
    #[arg(long, env = "MEDSYNC_FHIR_URL", global = true)]
    pub fhir_url: Option<String>,

    /// FHIR patient id to read and write medications for
    #[arg(long, env = "MEDSYNC_FHIR_PATIENT", global = true)]
    pub patient: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Match app medications against the health store without writing anything
    Reconcile {
        /// JSON array of app medications
        #[arg(value_name = "FILE")]
        medications: PathBuf,
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
    /// Reconcile, then write unmatched app medications to the health store
    Sync {
        /// JSON array of app medications
        #[arg(value_name = "FILE")]
        medications: PathBuf,
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
        /// Exit with an error instead of syncing against an empty store when the fetch fails
        #[arg(long)]
        strict: bool,
    },
    /// List health-store medications that are missing from the app
    Import {
        /// JSON array of app medications
        #[arg(value_name = "FILE")]
        medications: PathBuf,
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
    /// Record a single dose in the health store
    #[command(after_help = "Example: medsync record Lisinopril 10mg --date 2025-01-31T08:00:00Z")]
    Record {
        /// Medication name
        name: String,
        /// Dosage taken
        dosage: String,
        /// When the dose was taken (RFC 3339, defaults to now)
        #[arg(long)]
        date: Option<String>,
    },
}

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable report on stdout
    Text,
    /// Pretty-printed JSON on stdout
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sync_with_fhir() {
        let config = Config::try_parse_from([
            "medsync",
            "sync",
            "meds.json",
            "--fhir-url",
            "https://fhir.example.org",
            "--patient",
            "p1",
            "--strict",
        ])
        .unwrap();

        assert_eq!(config.fhir_url.as_deref(), Some("https://fhir.example.org"));
        assert_eq!(config.patient.as_deref(), Some("p1"));
        match config.command {
            Command::Sync {
                medications,
                format,
                strict,
            } => {
                assert_eq!(medications, PathBuf::from("meds.json"));
                assert_eq!(format, OutputFormat::Text);
                assert!(strict);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_store_file_conflicts_with_fhir() {
        let result = Config::try_parse_from([
            "medsync",
            "--store-file",
            "store.json",
            "--fhir-url",
            "https://fhir.example.org",
            "reconcile",
            "meds.json",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_record() {
        let config =
            Config::try_parse_from(["medsync", "record", "Aspirin", "81mg", "--date", "2025-01-01T00:00:00Z"])
                .unwrap();
        match config.command {
            Command::Record { name, dosage, date } => {
                assert_eq!(name, "Aspirin");
                assert_eq!(dosage, "81mg");
                assert_eq!(date.as_deref(), Some("2025-01-01T00:00:00Z"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_json_format() {
        let config =
            Config::try_parse_from(["medsync", "import", "meds.json", "--format", "json"]).unwrap();
        assert!(matches!(
            config.command,
            Command::Import {
                format: OutputFormat::Json,
                ..
            }
        ));
    }
}
