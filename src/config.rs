use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "deprescribe-client";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Base URL of the analysis service when nothing is configured.
pub const DEFAULT_SERVICE_URL: &str = "http://localhost:8000";

/// Analysis runs every rule engine server-side; allow it time.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Step interval of the animated category counters.
pub const DEFAULT_COUNTER_TICK_MS: u64 = 30;

pub const ENV_SERVICE_URL: &str = "DEPRESCRIBE_SERVICE_URL";
pub const ENV_TIMEOUT_SECS: &str = "DEPRESCRIBE_TIMEOUT_SECS";
pub const ENV_EXPORT_DIR: &str = "DEPRESCRIBE_EXPORT_DIR";

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "deprescribe_client=info,warn"
}

/// Directory exported documents land in: the user's Downloads folder,
/// falling back to the home directory, then the working directory.
pub fn default_export_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// All remote contracts resolve relative to this URL. No trailing slash.
    pub service_base_url: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub counter_tick_ms: u64,
    pub export_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_base_url: DEFAULT_SERVICE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            counter_tick_ms: DEFAULT_COUNTER_TICK_MS,
            export_dir: default_export_dir(),
        }
    }
}

impl ClientConfig {
    /// Defaults pointed at a specific service.
    pub fn new(service_base_url: &str) -> Result<Self, ConfigError> {
        Self::default().with_service_url(service_base_url)
    }

    /// Defaults overridden by `DEPRESCRIBE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_SERVICE_URL) {
            config = config.with_service_url(&url)?;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            config.request_timeout_secs = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidTimeout(raw))?;
        }
        if let Some(dir) = lookup(ENV_EXPORT_DIR) {
            config.export_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    /// Validate and set the service base URL.
    pub fn with_service_url(mut self, url: &str) -> Result<Self, ConfigError> {
        let trimmed = url.trim().trim_end_matches('/');
        let parsed = reqwest::Url::parse(trimmed)
            .map_err(|e| ConfigError::InvalidServiceUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidServiceUrl(format!(
                "{url}: scheme must be http or https"
            )));
        }
        self.service_base_url = trimmed.to_string();
        Ok(self)
    }

    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = dir.into();
        self
    }

    /// Absolute URL of a service endpoint.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.service_base_url, path.trim_start_matches('/'))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn counter_tick(&self) -> Duration {
        Duration::from_millis(self.counter_tick_ms)
    }
}

/// Errors from building a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid service URL {0}")]
    InvalidServiceUrl(String),
    #[error("Invalid request timeout '{0}' (expected a positive number of seconds)")]
    InvalidTimeout(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_point_at_local_service() {
        let config = ClientConfig::default();
        assert_eq!(config.service_base_url, "http://localhost:8000");
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        assert_eq!(config.counter_tick(), Duration::from_millis(30));
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let config = ClientConfig::new("https://cdss.example.org/api/").unwrap();
        assert_eq!(config.service_base_url, "https://cdss.example.org/api");
        assert_eq!(
            config.endpoint("/analyze-patient"),
            "https://cdss.example.org/api/analyze-patient"
        );
        assert_eq!(
            config.endpoint("get-taper-plan"),
            "https://cdss.example.org/api/get-taper-plan"
        );
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(ClientConfig::new("ftp://example.org").is_err());
        assert!(ClientConfig::new("not a url").is_err());
    }

    #[test]
    fn env_overrides_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_SERVICE_URL, "http://10.0.0.5:9000/"),
            (ENV_TIMEOUT_SECS, "30"),
            (ENV_EXPORT_DIR, "/tmp/reports"),
        ]))
        .unwrap();
        assert_eq!(config.service_base_url, "http://10.0.0.5:9000");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.export_dir, PathBuf::from("/tmp/reports"));
    }

    #[test]
    fn env_rejects_bad_timeout() {
        let err = ClientConfig::from_lookup(lookup(&[(ENV_TIMEOUT_SECS, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeout(_)));
        let err = ClientConfig::from_lookup(lookup(&[(ENV_TIMEOUT_SECS, "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeout(_)));
    }

    #[test]
    fn app_name_is_stable() {
        assert_eq!(APP_NAME, "deprescribe-client");
    }
}
