use thiserror::Error;

/// ConfigError is returned when a tracer is built from invalid settings.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// The service name is empty or blank.
    #[error("service name must not be empty")]
    MissingServiceName,
    /// The sample rate is outside [0, 1] or not a number.
    #[error("sample rate must be within [0, 1], got {0}")]
    InvalidSampleRate(f64),
    /// The batch size threshold is zero.
    #[error("batch size threshold must be at least 1")]
    InvalidBatchSize,
}

/// ExportError describes why an exporter could not deliver a batch.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The exporter was already shut down.
    #[error("exporter is shut down")]
    Shutdown,
    /// Spans could not be converted to JSON.
    #[error("failed to serialize spans: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Writing to the output failed.
    #[error("failed to write spans: {0}")]
    Io(#[from] std::io::Error),
    /// The span store refused the insert.
    #[error("span store rejected batch{}: {message}", status_suffix(.status))]
    Store {
        /// status is the transport status code, if the store returned one.
        status: Option<u16>,
        /// message describes the rejection.
        message: String,
    },
    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (status {})", code),
        None => String::new(),
    }
}

impl From<&str> for ExportError {
    fn from(message: &str) -> Self {
        ExportError::Other(message.to_string())
    }
}

impl From<String> for ExportError {
    fn from(message: String) -> Self {
        ExportError::Other(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_message() {
        let with_status = ExportError::Store {
            status: Some(503),
            message: "unavailable".to_string(),
        };
        assert_eq!(
            with_status.to_string(),
            "span store rejected batch (status 503): unavailable"
        );

        let without_status = ExportError::Store {
            status: None,
            message: "timeout".to_string(),
        };
        assert_eq!(without_status.to_string(), "span store rejected batch: timeout");
    }
}
