//! Client configuration.
//!
//! # Design
//! `ClientConfig` is plain data held by the client behind a lock. Each request
//! snapshots the fields it needs at construction time, so later changes only
//! affect requests built afterwards.

use std::time::Duration;

use crate::client::Headers;

/// Timeout applied when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Environment variable holding the default timeout in whole seconds.
pub const TIMEOUT_ENV: &str = "COURIER_TIMEOUT_SECS";

/// Environment variable holding the base URL for relative request targets.
pub const BASE_URL_ENV: &str = "COURIER_BASE_URL";

/// Configuration shared by every request a client builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Applied to requests constructed after it is set.
    pub timeout: Duration,
    /// Base for relative request URLs. Relative URLs fail without one.
    pub base_url: Option<String>,
    /// Sent with every request; caller headers override them per key.
    pub default_headers: Headers,
    /// Start handles as soon as they are constructed.
    pub auto_start: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let mut default_headers = Headers::new();
        default_headers.insert("Accept".to_string(), "application/json".to_string());
        default_headers.insert(
            "User-Agent".to_string(),
            format!("courier/{}", env!("CARGO_PKG_VERSION")),
        );
        Self {
            timeout: DEFAULT_TIMEOUT,
            base_url: None,
            default_headers,
            auto_start: false,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `COURIER_TIMEOUT_SECS` and `COURIER_BASE_URL`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.timeout = Duration::from_secs(secs),
                _ => tracing::warn!(
                    target: "courier_core::config",
                    "Ignoring invalid {}={:?}",
                    TIMEOUT_ENV,
                    raw
                ),
            }
        }

        if let Some(raw) = lookup(BASE_URL_ENV) {
            match url::Url::parse(raw.trim()) {
                Ok(_) => config.base_url = Some(raw.trim().to_string()),
                Err(e) => tracing::warn!(
                    target: "courier_core::config",
                    "Ignoring invalid {}={:?}: {}",
                    BASE_URL_ENV,
                    raw,
                    e
                ),
            }
        }

        config
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.base_url.is_none());
        assert!(!config.auto_start);
        assert_eq!(
            config.default_headers.get("Accept").map(String::as_str),
            Some("application/json")
        );
    }

    #[test]
    fn env_overrides_timeout_and_base_url() {
        let config = ClientConfig::from_lookup(lookup(&[
            (TIMEOUT_ENV, "15"),
            (BASE_URL_ENV, "https://api.example.com/v1/"),
        ]));
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert_eq!(config.base_url.as_deref(), Some("https://api.example.com/v1/"));
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let config = ClientConfig::from_lookup(lookup(&[
            (TIMEOUT_ENV, "soon"),
            (BASE_URL_ENV, "not a url"),
        ]));
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(config.base_url.is_none());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = ClientConfig::from_lookup(lookup(&[(TIMEOUT_ENV, "0")]));
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }
}
