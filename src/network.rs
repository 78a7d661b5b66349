use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::errors::{WalletError, WalletResult};

/// Identifiers for the networks this crate ships configuration for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    MainNet,
    TestNet,
    LocalNet,
}

impl NetworkId {
    pub const ALL: [NetworkId; 3] = [NetworkId::MainNet, NetworkId::TestNet, NetworkId::LocalNet];

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkId::MainNet => "mainnet",
            NetworkId::TestNet => "testnet",
            NetworkId::LocalNet => "localnet",
        }
    }

    pub fn from_str(value: &str) -> WalletResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(NetworkId::MainNet),
            "testnet" => Ok(NetworkId::TestNet),
            "localnet" => Ok(NetworkId::LocalNet),
            other => Err(WalletError::ValidationError(format!(
                "Unknown network identifier '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection parameters for one network's node endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genesis_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genesis_hash: Option<String>,
}

impl NetworkConfig {
    /// Endpoint plus optional port, suitable for client construction.
    pub fn base_url(&self) -> String {
        let trimmed = self.endpoint.trim_end_matches('/');
        match self.port {
            Some(port) => format!("{}:{}", trimmed, port),
            None => trimmed.to_string(),
        }
    }

    /// Apply a partial override on top of this configuration. Fields left
    /// unset in the override keep their current values.
    pub fn merged(&self, overrides: &NetworkConfigOverride) -> NetworkConfig {
        NetworkConfig {
            endpoint: overrides
                .endpoint
                .clone()
                .unwrap_or_else(|| self.endpoint.clone()),
            port: overrides.port.or(self.port),
            headers: overrides.headers.clone().or_else(|| self.headers.clone()),
            genesis_id: overrides
                .genesis_id
                .clone()
                .or_else(|| self.genesis_id.clone()),
            genesis_hash: overrides
                .genesis_hash
                .clone()
                .or_else(|| self.genesis_hash.clone()),
        }
    }
}

/// Caller-supplied partial network configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfigOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genesis_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genesis_hash: Option<String>,
}

/// Built-in default configuration for a network.
pub fn default_network_config(id: NetworkId) -> NetworkConfig {
    match id {
        NetworkId::MainNet => NetworkConfig {
            endpoint: "https://mainnet.flint.network".to_string(),
            port: None,
            headers: None,
            genesis_id: Some("flint-mainnet-v1".to_string()),
            genesis_hash: None,
        },
        NetworkId::TestNet => NetworkConfig {
            endpoint: "https://testnet.flint.network".to_string(),
            port: None,
            headers: None,
            genesis_id: Some("flint-testnet-v1".to_string()),
            genesis_hash: None,
        },
        NetworkId::LocalNet => NetworkConfig {
            endpoint: "http://localhost".to_string(),
            port: Some(8645),
            headers: None,
            genesis_id: Some("flint-localnet-v1".to_string()),
            genesis_hash: None,
        },
    }
}

/// The full default configuration map, one entry per known network.
pub fn default_network_configs() -> HashMap<NetworkId, NetworkConfig> {
    NetworkId::ALL
        .iter()
        .map(|id| (*id, default_network_config(*id)))
        .collect()
}
