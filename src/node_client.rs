use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use std::time::Duration;

use crate::errors::{WalletError, WalletResult};
use crate::network::{NetworkConfig, NetworkId};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin RPC handle for the active network.
///
/// This crate does not implement a node API; it only constructs and hands
/// out the configured HTTP client so downstream transaction-building code
/// has something to talk through. Rebuilt by the manager whenever the
/// active network changes.
pub struct NodeClient {
    client: Client,
    base_url: String,
    network: NetworkId,
}

impl NodeClient {
    pub fn new(network: NetworkId, config: &NetworkConfig) -> WalletResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(configured) = &config.headers {
            for (name, value) in configured {
                let name = name.parse::<HeaderName>().map_err(|_| {
                    WalletError::ValidationError(format!("Invalid header name '{}'", name))
                })?;
                let value = value.parse::<HeaderValue>().map_err(|_| {
                    WalletError::ValidationError(format!("Invalid header value for '{}'", name))
                })?;
                headers.insert(name, value);
            }
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| WalletError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(NodeClient {
            client,
            base_url: config.base_url(),
            network,
        })
    }

    pub fn network(&self) -> NetworkId {
        self.network
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The configured HTTP client, for callers issuing their own requests.
    pub fn http(&self) -> &Client {
        &self.client
    }

    /// Reachability probe against the node's health endpoint.
    pub async fn health(&self) -> WalletResult<()> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| WalletError::NetworkError(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(WalletError::NetworkError(format!(
                "HTTP error: {}",
                response.status()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for NodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeClient")
            .field("network", &self.network)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::default_network_config;
    use std::collections::HashMap;

    #[test]
    fn builds_from_default_config() {
        let client = NodeClient::new(
            NetworkId::LocalNet,
            &default_network_config(NetworkId::LocalNet),
        )
        .unwrap();
        assert_eq!(client.network(), NetworkId::LocalNet);
        assert_eq!(client.base_url(), "http://localhost:8645");
    }

    #[test]
    fn rejects_malformed_headers() {
        let mut config = default_network_config(NetworkId::TestNet);
        let mut headers = HashMap::new();
        headers.insert("bad header name".to_string(), "value".to_string());
        config.headers = Some(headers);

        let err = NodeClient::new(NetworkId::TestNet, &config).unwrap_err();
        assert!(matches!(err, WalletError::ValidationError(_)));
    }

    #[tokio::test]
    #[ignore = "requires a running node at localhost:8645"]
    async fn health_probe_against_live_node() {
        let client = NodeClient::new(
            NetworkId::LocalNet,
            &default_network_config(NetworkId::LocalNet),
        )
        .unwrap();
        client.health().await.unwrap();
    }
}
