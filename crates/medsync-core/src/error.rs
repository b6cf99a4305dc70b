use thiserror::Error;

/// Application-wide error types.
///
/// This enum represents every failure that can cross an I/O boundary in MedSync:
/// talking to an external health store, reading local files, or loading
/// configuration. The reconciliation engine itself never produces one.
///
/// # Error Conversion
///
/// Some errors automatically convert from their source types using the `#[from]` attribute:
/// - `serde_json::Error` → `AppError::SerializationError`
/// - `std::io::Error` → `AppError::IoError`
///
/// # Examples
///
/// ```no_run
/// use medsync_core::error::AppError;
///
/// fn example() -> Result<(), AppError> {
///     Err(AppError::Generic("Something went wrong".to_string()))
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP client request failed.
    ///
    /// This error occurs when requests to a health-store server fail due to
    /// unexpected status codes or undecodable responses.
    #[error("API Client error: {0}")]
    ClientError(String),

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Local file access failed.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// URL parsing failed.
    ///
    /// This error occurs when a configured health-store base URL is malformed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A FHIR payload did not have the expected shape.
    #[error("Invalid FHIR resource: {0}")]
    InvalidFhirResource(String),

    /// Configuration file could not be read or validated.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// API response contained no data.
    #[error("Empty response from API")]
    EmptyResponse,

    /// Network or connection error.
    ///
    /// This error occurs when a network request fails due to connectivity issues,
    /// DNS resolution failures, or the remote server being unreachable.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The health store answered with a 5xx status.
    #[error("Server error: HTTP {0}")]
    ServerError(u16),

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded. Please wait and try again.")]
    RateLimitExceeded,

    /// The external health store rejected or could not complete a write.
    #[error("Health store write rejected: {0}")]
    WriteRejected(String),

    /// Generic application error for cases not covered by specific variants.
    ///
    /// Use this sparingly - prefer creating specific error variants
    /// for better error handling and debugging.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::ClientError(msg) => {
                if msg.contains("401") || msg.contains("403") {
                    "The health store refused access.\n   Check the FHIR server credentials and patient id.".to_string()
                } else if msg.contains("connect") {
                    format!("Cannot connect to health store: {}\n   Check your internet connection and the FHIR base URL.", msg)
                } else {
                    format!("API error: {}", msg)
                }
            }
            AppError::IoError(e) => {
                if e.kind() == std::io::ErrorKind::NotFound {
                    format!("File not found: {}\n   Check the path passed on the command line.", e)
                } else {
                    format!("I/O error: {}", e)
                }
            }
            AppError::InvalidUrl(url) => {
                format!(
                    "Invalid health store URL: {}\n   Example: https://hapi.fhir.org/baseR4",
                    url
                )
            }
            AppError::ConfigError(msg) => {
                format!(
                    "Configuration error: {}\n   Check ~/.config/medsync/config.toml or pass --config.",
                    msg
                )
            }
            AppError::NetworkError(msg) => {
                format!("Network error: {}\n   Check your internet connection.", msg)
            }
            AppError::ServerError(status) => {
                format!("The health store failed with HTTP {}.\n   It may be temporarily unavailable. Try again later.", status)
            }
            AppError::Timeout(secs) => {
                format!("Request timed out after {} seconds.\n   The health store may be overloaded. Try again later.", secs)
            }
            AppError::RateLimitExceeded => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            AppError::EmptyResponse => {
                "The health store returned no data. It may be temporarily unavailable.".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if this error is retryable.
    ///
    /// # Examples
    ///
    /// ```
    /// use medsync_core::error::AppError;
    ///
    /// let err = AppError::NetworkError("connection reset".to_string());
    /// assert!(err.is_retryable());
    ///
    /// let err = AppError::RateLimitExceeded;
    /// assert!(err.is_retryable());
    ///
    /// let err = AppError::InvalidFhirResource("missing resourceType".to_string());
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::NetworkError(_)
                | AppError::Timeout(_)
                | AppError::RateLimitExceeded
                | AppError::ServerError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::WriteRejected("Aspirin".to_string());
        assert_eq!(err.to_string(), "Health store write rejected: Aspirin");
    }

    #[test]
    fn test_generic_error() {
        let err = AppError::Generic("Something went wrong".to_string());
        assert_eq!(err.to_string(), "Error: Something went wrong");
    }

    #[test]
    fn test_empty_response_error() {
        let err = AppError::EmptyResponse;
        assert_eq!(err.to_string(), "Empty response from API");
    }

    #[test]
    fn test_user_message_unauthorized() {
        let err = AppError::ClientError("HTTP 401 from https://fhir.example".to_string());
        assert!(err.user_message().contains("refused access"));
    }

    #[test]
    fn test_user_message_missing_file() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "meds.json");
        let err: AppError = io.into();
        assert!(matches!(err, AppError::IoError(_)));
        assert!(err.user_message().contains("File not found"));
    }

    #[test]
    fn test_invalid_url() {
        let err = AppError::InvalidUrl("not a url".to_string());
        assert!(err.user_message().contains("Invalid health store URL"));
    }

    #[test]
    fn test_error_from_serde() {
        let json = "{ invalid json }";
        let result: Result<serde_json::Value, _> = serde_json::from_str(json);
        let serde_err = result.unwrap_err();
        let app_err: AppError = serde_err.into();
        assert!(matches!(app_err, AppError::SerializationError(_)));
    }

    #[test]
    fn test_is_retryable() {
        assert!(AppError::NetworkError("timeout".to_string()).is_retryable());
        assert!(AppError::Timeout(30).is_retryable());
        assert!(AppError::RateLimitExceeded.is_retryable());
        assert!(AppError::ServerError(503).is_retryable());
        assert!(!AppError::ClientError("HTTP 404".to_string()).is_retryable());
        assert!(!AppError::WriteRejected("x".to_string()).is_retryable());
        assert!(!AppError::ConfigError("bad".to_string()).is_retryable());
    }

    #[test]
    fn test_timeout_error() {
        let err = AppError::Timeout(30);
        assert_eq!(err.to_string(), "Request timed out after 30 seconds");
    }
}
