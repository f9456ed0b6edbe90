use std::path::PathBuf;

use thiserror::Error;

/// Where to point users whose settings cannot be loaded.
pub const SETUP_HINT: &str =
    "Please provide configuration settings using the instructions in README.md#configuration";

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("settings file '{}' not found and the secret store is empty", path.display())]
    NotFound { path: PathBuf },
    #[error("failed to read settings from {origin}: {source}")]
    Read {
        origin: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings in {origin}: {message}")]
    Parse { origin: String, message: String },
    #[error("invalid settings in {origin}: serviceType is required")]
    MissingServiceType { origin: String },
}

impl ConfigurationError {
    pub fn hint(&self) -> &'static str {
        SETUP_HINT
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid service type value: {0}")]
pub struct UnsupportedServiceTypeError(pub String);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build request: {0}")]
    Build(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("provider reported an error: {0}")]
    Provider(String),
    #[error("failed to read response stream: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed stream fragment '{line}': {source}")]
    MalformedFragment {
        line: String,
        #[source]
        source: serde_json::Error,
    },
}
