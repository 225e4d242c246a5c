use crate::error::RelayError;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

pub const DEFAULT_LISTEN_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9082);
pub const DEFAULT_MODEL: &str = "models/gemini-2.0-flash-live-001";
pub const DEFAULT_API_VERSION: &str = "v1alpha";
pub const DEFAULT_HOST: &str = "generativelanguage.googleapis.com";
pub const DEFAULT_SETUP_TIMEOUT_SECS: u64 = 30;

/// Process-wide relay settings.
///
/// Built once at startup and shared by reference (`Arc<RelayConfig>`) with the
/// server and every session bridge.
#[derive(Clone)]
pub struct RelayConfig {
    pub listen_addr: SocketAddr,
    pub api_key: String,
    pub model: String,
    pub api_version: String,
    pub host: String,
    /// Upper bound for the client's setup frame and for the remote
    /// `setupComplete` acknowledgement.
    pub setup_timeout: Duration,
    /// Drop `response_modalities` from the client's generation config before
    /// it is forwarded upstream.
    pub strip_response_modalities: bool,
}

impl RelayConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            host: DEFAULT_HOST.to_string(),
            setup_timeout: Duration::from_secs(DEFAULT_SETUP_TIMEOUT_SECS),
            strip_response_modalities: true,
        }
    }

    pub fn listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn setup_timeout(mut self, timeout: Duration) -> Self {
        self.setup_timeout = timeout;
        self
    }

    pub fn from_env() -> Result<Self, RelayError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GEMINI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| RelayError::Config("GEMINI_API_KEY not set".to_string()))?;

        let mut config = RelayConfig::new(api_key);

        if let Some(addr) = lookup("RELAY_LISTEN_ADDR") {
            config.listen_addr = addr.parse().map_err(|e| {
                RelayError::Config(format!("Invalid RELAY_LISTEN_ADDR '{}': {}", addr, e))
            })?;
        }
        if let Some(model) = lookup("GEMINI_MODEL") {
            config.model = model;
        }
        if let Some(version) = lookup("GEMINI_API_VERSION") {
            config.api_version = version;
        }
        if let Some(host) = lookup("GEMINI_HOST") {
            config.host = host;
        }
        if let Some(secs) = lookup("RELAY_SETUP_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|e| {
                RelayError::Config(format!("Invalid RELAY_SETUP_TIMEOUT_SECS '{}': {}", secs, e))
            })?;
            config.setup_timeout = Duration::from_secs(secs);
        }
        if let Some(flag) = lookup("RELAY_STRIP_RESPONSE_MODALITIES") {
            config.strip_response_modalities = parse_bool(&flag).ok_or_else(|| {
                RelayError::Config(format!(
                    "Invalid RELAY_STRIP_RESPONSE_MODALITIES '{}': expected true or false",
                    flag
                ))
            })?;
        }

        Ok(config)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("listen_addr", &self.listen_addr)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("api_version", &self.api_version)
            .field("host", &self.host)
            .field("setup_timeout", &self.setup_timeout)
            .field("strip_response_modalities", &self.strip_response_modalities)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_only_api_key_set() {
        let config = RelayConfig::from_lookup(lookup_from(&[("GEMINI_API_KEY", "k")])).unwrap();
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(config.listen_addr.to_string(), "127.0.0.1:9082");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.api_version, DEFAULT_API_VERSION);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.setup_timeout, Duration::from_secs(30));
        assert!(config.strip_response_modalities);
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let result = RelayConfig::from_lookup(lookup_from(&[("GEMINI_MODEL", "m")]));
        assert!(matches!(result, Err(RelayError::Config(msg)) if msg.contains("GEMINI_API_KEY")));

        let blank = RelayConfig::from_lookup(lookup_from(&[("GEMINI_API_KEY", "  ")]));
        assert!(blank.is_err());
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "k"),
            ("RELAY_LISTEN_ADDR", "0.0.0.0:7000"),
            ("GEMINI_MODEL", "models/custom"),
            ("RELAY_SETUP_TIMEOUT_SECS", "5"),
            ("RELAY_STRIP_RESPONSE_MODALITIES", "off"),
        ]))
        .unwrap();
        assert_eq!(config.listen_addr.port(), 7000);
        assert_eq!(config.model, "models/custom");
        assert_eq!(config.setup_timeout, Duration::from_secs(5));
        assert!(!config.strip_response_modalities);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let bad_addr = RelayConfig::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "k"),
            ("RELAY_LISTEN_ADDR", "not-an-addr"),
        ]));
        assert!(matches!(bad_addr, Err(RelayError::Config(_))));

        let bad_flag = RelayConfig::from_lookup(lookup_from(&[
            ("GEMINI_API_KEY", "k"),
            ("RELAY_STRIP_RESPONSE_MODALITIES", "maybe"),
        ]));
        assert!(matches!(bad_flag, Err(RelayError::Config(_))));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = RelayConfig::new("super-secret");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
