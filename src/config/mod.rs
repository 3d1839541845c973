//! Configuration management.
//!
//! Everything the engine needs from the preferences store is read into one
//! [`Config`] snapshot before a batch starts, so chain construction is a
//! pure function of (identifier, enabled methods, snapshot, automatic mode).
//! The store itself is read-mostly; snapshots are cheap owned values.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Resolve newly added records without being asked
    #[serde(default = "default_true")]
    pub automatic_download: bool,

    /// Custom resolver specs, as the raw JSON blob the preferences UI
    /// stores. Parsed and validated at every chain build, so a fixed blob
    /// is picked up on the next batch.
    #[serde(default)]
    pub resolvers: Option<String>,

    /// Gateway addresses
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Pacing for the sequential path
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Download settings
    #[serde(default)]
    pub downloads: DownloadConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            automatic_download: true,
            resolvers: None,
            gateway: GatewayConfig::default(),
            rate_limit: RateLimitConfig::default(),
            downloads: DownloadConfig::default(),
        }
    }
}

/// Gateway addresses.
///
/// `api_addr` is the local daemon control endpoint used by the reachability
/// probe; the gateway bases are where documents are fetched from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_api_addr")]
    pub api_addr: String,

    #[serde(default = "default_local_gateway")]
    pub local_gateway: String,

    #[serde(default = "default_public_gateway")]
    pub public_gateway: String,
}

impl GatewayConfig {
    /// Gateway base for the selected backend.
    pub fn base(&self, use_local: bool) -> &str {
        if use_local {
            &self.local_gateway
        } else {
            &self.public_gateway
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_addr: default_api_addr(),
            local_gateway: default_local_gateway(),
            public_gateway: default_public_gateway(),
        }
    }
}

fn default_api_addr() -> String {
    "http://127.0.0.1:5001".to_string()
}

fn default_local_gateway() -> String {
    "http://localhost:8080".to_string()
}

fn default_public_gateway() -> String {
    "https://dweb.link".to_string()
}

/// Rate limiting configuration for the sequential (public-backend) path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Records started per second when resolving sequentially
    #[serde(default = "default_sequential_rps")]
    pub sequential_requests_per_second: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            sequential_requests_per_second: default_sequential_rps(),
        }
    }
}

fn default_sequential_rps() -> u32 {
    1
}

/// Download configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Default download directory
    #[serde(default = "default_download_dir")]
    pub default_path: PathBuf,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            default_path: default_download_dir(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_true() -> bool {
    true
}

/// Load configuration from a TOML file with environment overrides
/// (`NEXUS_RESOLVER_*`).
pub fn load_config(path: &PathBuf) -> Result<Config, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path.as_path()))
        .add_source(
            config::Environment::with_prefix("NEXUS_RESOLVER")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize()
}

/// Save a configuration snapshot as TOML.
pub fn save_config(config: &Config, path: &PathBuf) -> Result<(), std::io::Error> {
    let content = toml::to_string_pretty(config)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
    std::fs::write(path, content)
}

/// Locate a config file in the conventional places: the working directory
/// first, then the user config directory.
pub fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("nexus-resolver.toml");
    if local.exists() {
        return Some(local);
    }
    let user = dirs::config_dir()?.join("nexus-resolver").join("config.toml");
    user.exists().then_some(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.automatic_download);
        assert!(config.resolvers.is_none());
        assert_eq!(config.gateway.public_gateway, "https://dweb.link");
        assert_eq!(config.rate_limit.sequential_requests_per_second, 1);
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let toml_content = r##"
automatic_download = false
resolvers = '[{"name": "Sci-Hub", "method": "GET", "url": "https://sci-hub.ru/{doi}", "mode": "html", "selector": "#pdf", "attribute": "src"}]'

[gateway]
api_addr = "http://127.0.0.1:5002"

[rate_limit]
sequential_requests_per_second = 2
"##;
        std::fs::write(&path, toml_content).unwrap();

        let config = load_config(&path).unwrap();
        assert!(!config.automatic_download);
        assert!(config.resolvers.unwrap().contains("Sci-Hub"));
        assert_eq!(config.gateway.api_addr, "http://127.0.0.1:5002");
        // Unset sections fall back to defaults.
        assert_eq!(config.gateway.public_gateway, "https://dweb.link");
        assert_eq!(config.rate_limit.sequential_requests_per_second, 2);
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.automatic_download = false;
        save_config(&config, &path).unwrap();

        let loaded = load_config(&path).unwrap();
        assert!(!loaded.automatic_download);
    }
}
