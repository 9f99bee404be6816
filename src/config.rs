use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{GatewayError, Result};

pub const DEFAULT_PROMETHEUS_ADDRESS: &str = "http://localhost:9090";
pub const DEFAULT_GRAPHQL_PORT: u16 = 2112;

/// Gateway settings, loaded once at startup and passed by reference into the
/// components that need them.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base address of the metrics backend.
    pub prometheus_address: String,
    /// Port the graph query surface listens on.
    pub graphql_port: u16,
    /// Enables debug logging of backend results and warnings.
    pub log_enabled: bool,
}

// On-disk layout mirrors the config.yaml shipped with the gateway:
//
//   spec:
//     prometheusAddress: "http://localhost:9090"
//     graphqlPort: 2112
//     logEnabled: false
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    spec: ConfigSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigSpec {
    #[serde(default)]
    prometheus_address: Option<String>,
    #[serde(default)]
    graphql_port: Option<u16>,
    #[serde(default)]
    log_enabled: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prometheus_address: DEFAULT_PROMETHEUS_ADDRESS.to_string(),
            graphql_port: DEFAULT_GRAPHQL_PORT,
            log_enabled: false,
        }
    }
}

impl Config {
    /// Resolve the config file location. CONFIG_PATH overrides the default
    /// ./config.yaml next to the binary.
    pub fn config_path() -> PathBuf {
        env::var("CONFIG_PATH")
            .unwrap_or_else(|_| "./config.yaml".to_string())
            .into()
    }

    /// Load the configuration from the given YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&data)
    }

    fn from_yaml(data: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(data)
            .map_err(|e| GatewayError::Config(format!("malformed config: {}", e)))?;

        let mut config = Config::default();
        // An empty address or a zero port counts as unset.
        if let Some(address) = file.spec.prometheus_address {
            if !address.is_empty() {
                config.prometheus_address = address;
            }
        }
        if let Some(port) = file.spec.graphql_port {
            if port != 0 {
                config.graphql_port = port;
            }
        }
        if let Some(enabled) = file.spec.log_enabled {
            config.log_enabled = enabled;
        }
        Ok(config)
    }
}
