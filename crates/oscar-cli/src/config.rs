//! TOML configuration file
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:9000"
//! read_timeout_ms = 500
//!
//! [dispatcher]
//! log_unmatched = false
//!
//! [[method]]
//! address = "/synth/1/freq"
//!
//! [[method]]
//! address = "/synth/1/gate"
//! ```

use anyhow::{Context, Result};
use oscar_router::DispatcherConfig;
use oscar_transport::ServerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub dispatcher: DispatcherConfig,
    #[serde(rename = "method")]
    pub methods: Vec<MethodEntry>,
}

/// A method address to register in `dispatch` mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodEntry {
    pub address: String,
}

impl Config {
    /// Load from a file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Method addresses from the file followed by `extra`, duplicates removed
    pub fn method_addresses(&self, extra: &[String]) -> Vec<String> {
        let mut addresses: Vec<String> = Vec::new();
        for address in self
            .methods
            .iter()
            .map(|m| &m.address)
            .chain(extra.iter())
        {
            if !addresses.contains(address) {
                addresses.push(address.clone());
            }
        }
        addresses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert!(config.dispatcher.log_unmatched);
        assert!(config.methods.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config = Config::parse(
            r#"
            [server]
            bind = "127.0.0.1:8000"
            read_timeout_ms = 250

            [server.backoff]
            max_ms = 500

            [dispatcher]
            log_unmatched = false

            [[method]]
            address = "/a"

            [[method]]
            address = "/b/c"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert_eq!(
            config.server.read_timeout(),
            Some(std::time::Duration::from_millis(250))
        );
        assert_eq!(config.server.backoff.max_ms, 500);
        assert_eq!(config.server.backoff.initial_ms, 5);
        assert!(!config.dispatcher.log_unmatched);
        assert_eq!(config.method_addresses(&[]), vec!["/a", "/b/c"]);
    }

    #[test]
    fn test_method_addresses_merge_flags() {
        let config = Config::parse("[[method]]\naddress = \"/a\"\n").unwrap();
        let merged = config.method_addresses(&["/b".to_string(), "/a".to_string()]);
        assert_eq!(merged, vec!["/a", "/b"]);
    }

    #[test]
    fn test_unknown_type_is_error() {
        assert!(Config::parse("[server]\nbind = 9000\n").is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(Config::load(Some(Path::new("/nonexistent/oscar.toml"))).is_err());
        assert!(Config::load(None).is_ok());
    }
}
