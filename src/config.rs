use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::level_filters::LevelFilter;

use crate::error::ConfigurationError;

pub const DEFAULT_CONFIG_FILE: &str = "config/appsettings.toml";

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a friendly, intelligent, and curious assistant who is good at conversation.";

/// Endpoint, model and credential settings. Immutable once loaded.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub service_type: String,
    pub service_id: String,
    pub deployment_id: String,
    pub model_id: String,
    pub endpoint: String,
    pub api_key: String,
    pub org_id: String,
    pub log_level: LogLevel,
    pub system_prompt: String,
    /// Target of the custom endpoint redirect.
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Azure OpenAI REST API version.
    pub api_version: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_type: String::new(),
            service_id: String::new(),
            deployment_id: String::new(),
            model_id: String::new(),
            endpoint: String::new(),
            api_key: String::new(),
            org_id: String::new(),
            log_level: LogLevel::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            port: 3000,
            api_version: "2024-02-01".to_string(),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("service_type", &self.service_type)
            .field("service_id", &self.service_id)
            .field("deployment_id", &self.deployment_id)
            .field("model_id", &self.model_id)
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("org_id", &self.org_id)
            .field("log_level", &self.log_level)
            .field("system_prompt", &self.system_prompt)
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let origin = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
            origin: origin.clone(),
            source,
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let settings: Settings = if is_json {
            serde_json::from_str(&content).map_err(|e| ConfigurationError::Parse {
                origin: origin.clone(),
                message: e.to_string(),
            })?
        } else {
            toml::from_str(&content).map_err(|e| ConfigurationError::Parse {
                origin: origin.clone(),
                message: e.to_string(),
            })?
        };
        settings.validated(&origin)
    }

    fn from_json_value(value: serde_json::Value, origin: &str) -> Result<Self, ConfigurationError> {
        let settings: Settings =
            serde_json::from_value(value).map_err(|e| ConfigurationError::Parse {
                origin: origin.to_string(),
                message: e.to_string(),
            })?;
        settings.validated(origin)
    }

    fn validated(self, origin: &str) -> Result<Self, ConfigurationError> {
        if self.service_type.trim().is_empty() {
            return Err(ConfigurationError::MissingServiceType {
                origin: origin.to_string(),
            });
        }
        Ok(self)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(try_from = "String")]
pub enum LogLevel {
    Trace,
    Debug,
    Information,
    #[default]
    Warning,
    Error,
    Critical,
    None,
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        match value.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "information" | "info" => Ok(LogLevel::Information),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "critical" => Ok(LogLevel::Critical),
            "none" | "off" => Ok(LogLevel::None),
            _ => Err(format!("unknown log level: {value}")),
        }
    }
}

impl LogLevel {
    pub fn level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Information => LevelFilter::INFO,
            LogLevel::Warning => LevelFilter::WARN,
            // tracing has no level above error
            LogLevel::Error | LogLevel::Critical => LevelFilter::ERROR,
            LogLevel::None => LevelFilter::OFF,
        }
    }
}

/// Fallback source of settings when no settings file exists.
pub trait SecretStore {
    fn describe(&self) -> String;

    /// Returns the stored JSON document, or `None` when the store is absent.
    fn read(&self) -> Result<Option<String>, ConfigurationError>;
}

/// Per-user secrets document kept in the platform config directory.
pub struct UserSecrets {
    path: Option<PathBuf>,
}

impl UserSecrets {
    pub fn locate() -> Self {
        Self {
            path: dirs::config_dir().map(|dir| dir.join("chatloop").join("secrets.json")),
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }
}

impl SecretStore for UserSecrets {
    fn describe(&self) -> String {
        match &self.path {
            Some(path) => format!("user secrets '{}'", path.display()),
            None => "user secrets (no config directory)".to_string(),
        }
    }

    fn read(&self) -> Result<Option<String>, ConfigurationError> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(path)
            .map(Some)
            .map_err(|source| ConfigurationError::Read {
                origin: self.describe(),
                source,
            })
    }
}

pub struct SettingsResolver<S> {
    config_path: PathBuf,
    secrets: S,
}

impl SettingsResolver<UserSecrets> {
    /// Settings file from `CHATLOOP_CONFIG` or the default path, user secrets as fallback.
    pub fn from_env() -> Self {
        let config_path = env::var_os("CHATLOOP_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::new(config_path, UserSecrets::locate())
    }
}

impl<S: SecretStore> SettingsResolver<S> {
    pub fn new(config_path: impl Into<PathBuf>, secrets: S) -> Self {
        Self {
            config_path: config_path.into(),
            secrets,
        }
    }

    pub fn load(&self) -> Result<Settings, ConfigurationError> {
        if self.config_path.exists() {
            tracing::debug!(path = %self.config_path.display(), "loading settings file");
            return Settings::from_file(&self.config_path);
        }

        let origin = self.secrets.describe();
        tracing::warn!(
            path = %self.config_path.display(),
            "settings file not found, attempting to load configuration from {origin}"
        );

        let not_found = || ConfigurationError::NotFound {
            path: self.config_path.clone(),
        };
        let document = self.secrets.read()?.ok_or_else(not_found)?;
        if document.trim().is_empty() {
            return Err(not_found());
        }
        let value: serde_json::Value =
            serde_json::from_str(&document).map_err(|e| ConfigurationError::Parse {
                origin: origin.clone(),
                message: e.to_string(),
            })?;
        if value.as_object().is_some_and(|map| map.is_empty()) {
            return Err(not_found());
        }
        Settings::from_json_value(value, &origin)
    }
}
