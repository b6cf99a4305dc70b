//! Configuration types for MedSync components.
//!
//! Values come from three layers, lowest precedence first: built-in defaults,
//! the TOML config file, then CLI flags / environment variables (applied by
//! the binary).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

/// Upper bound on `HttpConfig::max_retries`.
pub const MAX_HTTP_RETRIES: u32 = 10;

/// HTTP client configuration for external health-store calls.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

/// Two-way sync configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Maximum number of external writes in flight at once.
    pub concurrency: usize,
    /// Surface external fetch failures as errors instead of syncing against
    /// an empty record list.
    pub fail_on_fetch_error: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            fail_on_fetch_error: false,
        }
    }
}

// =============================================================================
// Config file
// =============================================================================

/// Which external health store to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    File,
    Fhir,
}

/// `[store]` section of the config file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StoreSection {
    #[serde(default)]
    pub kind: StoreKind,
    /// JSON file backing the local store.
    pub path: Option<PathBuf>,
    /// FHIR server base URL, e.g. `https://hapi.fhir.org/baseR4`.
    pub fhir_base_url: Option<String>,
    /// Restricts FHIR queries and writes to one patient.
    pub patient_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SyncSection {
    pub concurrency: Option<usize>,
    pub fail_on_fetch_error: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HttpSection {
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
}

/// Contents of `config.toml`.
///
/// ```toml
/// [store]
/// kind = "fhir"
/// fhir_base_url = "https://hapi.fhir.org/baseR4"
/// patient_id = "example"
///
/// [sync]
/// concurrency = 4
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MedsyncConfig {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub http: HttpSection,
}

impl MedsyncConfig {
    /// Parses a config document.
    pub fn from_toml_str(content: &str) -> Result<Self, AppError> {
        let config: MedsyncConfig =
            toml::from_str(content).map_err(|e| AppError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.sync.concurrency == Some(0) {
            return Err(AppError::ConfigError(
                "sync.concurrency must be at least 1".to_string(),
            ));
        }
        if let Some(retries) = self.http.max_retries {
            if retries == 0 || retries > MAX_HTTP_RETRIES {
                return Err(AppError::ConfigError(format!(
                    "http.max_retries must be between 1 and {}",
                    MAX_HTTP_RETRIES
                )));
            }
        }
        Ok(())
    }

    /// Sync settings with file overrides applied over defaults.
    pub fn sync_config(&self) -> SyncConfig {
        let defaults = SyncConfig::default();
        SyncConfig {
            concurrency: self.sync.concurrency.unwrap_or(defaults.concurrency),
            fail_on_fetch_error: self
                .sync
                .fail_on_fetch_error
                .unwrap_or(defaults.fail_on_fetch_error),
        }
    }

    /// HTTP settings with file overrides applied over defaults.
    pub fn http_config(&self) -> HttpConfig {
        let defaults = HttpConfig::default();
        HttpConfig {
            timeout: self
                .http
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: self.http.max_retries.unwrap_or(defaults.max_retries),
            retry_base_delay: self
                .http
                .retry_base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_base_delay),
        }
    }
}

/// Returns `<config dir>/medsync/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("medsync").join("config.toml"))
}

/// Returns `<data dir>/medsync/health_store.json`, the default local store.
pub fn default_store_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("medsync").join("health_store.json"))
}

/// Loads the config file.
///
/// With an explicit `path` the file must exist. Without one, the default
/// location is tried and a missing file yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<MedsyncConfig, AppError> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match default_config_path() {
            Some(p) => (p, false),
            None => return Ok(MedsyncConfig::default()),
        },
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => MedsyncConfig::from_toml_str(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(MedsyncConfig::default())
        }
        Err(e) => Err(AppError::ConfigError(format!(
            "cannot read {}: {}",
            path.display(),
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_http_config_defaults() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_base_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_sync_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.concurrency, 10);
        assert!(!config.fail_on_fetch_error);
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = MedsyncConfig::from_toml_str("").unwrap();
        assert_eq!(config.store.kind, StoreKind::File);
        assert_eq!(config.sync_config(), SyncConfig::default());
        assert_eq!(config.http_config(), HttpConfig::default());
    }

    #[test]
    fn test_full_file() {
        let content = r#"
            [store]
            kind = "fhir"
            fhir_base_url = "https://hapi.fhir.org/baseR4"
            patient_id = "p-1"

            [sync]
            concurrency = 4
            fail_on_fetch_error = true

            [http]
            timeout_secs = 5
            max_retries = 1
        "#;
        let config = MedsyncConfig::from_toml_str(content).unwrap();

        assert_eq!(config.store.kind, StoreKind::Fhir);
        assert_eq!(config.store.patient_id.as_deref(), Some("p-1"));
        assert_eq!(config.sync_config().concurrency, 4);
        assert!(config.sync_config().fail_on_fetch_error);
        assert_eq!(config.http_config().timeout, Duration::from_secs(5));
        assert_eq!(config.http_config().max_retries, 1);
        assert_eq!(config.http_config().retry_base_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result = MedsyncConfig::from_toml_str("[sync]\nconcurrency = 0\n");
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_max_retries_bounded() {
        let result = MedsyncConfig::from_toml_str("[http]\nmax_retries = 40\n");
        assert!(matches!(result, Err(AppError::ConfigError(_))));

        let result = MedsyncConfig::from_toml_str("[http]\nmax_retries = 0\n");
        assert!(matches!(result, Err(AppError::ConfigError(_))));

        let config = MedsyncConfig::from_toml_str("[http]\nmax_retries = 10\n").unwrap();
        assert_eq!(config.http_config().max_retries, MAX_HTTP_RETRIES);
    }

    #[test]
    fn test_unknown_store_kind_rejected() {
        let result = MedsyncConfig::from_toml_str("[store]\nkind = \"healthkit\"\n");
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[store]\npath = \"/tmp/store.json\"").unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.store.path, Some(PathBuf::from("/tmp/store.json")));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(Some(&dir.path().join("nope.toml")));
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }
}
