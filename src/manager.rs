use futures::future::try_join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::account::WalletAccount;
use crate::errors::{WalletError, WalletResult};
use crate::logging::{ComponentLogger, LogLevel};
use crate::network::{
    default_network_config, default_network_configs, NetworkConfig, NetworkConfigOverride,
    NetworkId,
};
use crate::node_client::NodeClient;
use crate::persistence::{
    load_persisted_state, serialize_state, MemoryPersistence, PersistenceAdapter, STORAGE_KEY,
};
use crate::store::{State, StateStore};
use crate::transactions::TransactionGroup;
use crate::wallets::{
    InjectedProvider, InjectedWallet, KmdConfig, KmdWallet, MnemonicWallet, MnemonicWalletConfig,
    RelayTransport, RelayWallet, WalletAdapter, WalletId,
};

/// Everything the composition root needs: which backends to stand up, the
/// initial network, configuration overrides, and the collaborator objects
/// each backend kind requires. A requested backend whose collaborator or
/// configuration is missing is skipped with a logged warning.
pub struct WalletManagerOptions {
    pub wallets: Vec<WalletId>,
    pub network: NetworkId,
    pub network_overrides: HashMap<NetworkId, NetworkConfigOverride>,
    pub persistence: Option<Arc<dyn PersistenceAdapter>>,
    pub injected_provider: Option<Arc<dyn InjectedProvider>>,
    pub relay_transport: Option<Arc<dyn RelayTransport>>,
    pub kmd: Option<KmdConfig>,
    pub mnemonic: Option<MnemonicWalletConfig>,
    pub log_level: LogLevel,
}

impl Default for WalletManagerOptions {
    fn default() -> Self {
        Self {
            wallets: Vec::new(),
            network: NetworkId::TestNet,
            network_overrides: HashMap::new(),
            persistence: None,
            injected_provider: None,
            relay_transport: None,
            kmd: None,
            mnemonic: None,
            log_level: LogLevel::Warn,
        }
    }
}

impl std::fmt::Debug for WalletManagerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletManagerOptions")
            .field("wallets", &self.wallets)
            .field("network", &self.network)
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

/// The composition root: owns the store, the network configuration map,
/// the node-client handle, and one adapter per stood-up backend.
pub struct WalletManager {
    store: Arc<StateStore>,
    adapters: HashMap<WalletId, Arc<dyn WalletAdapter>>,
    network_configs: RwLock<HashMap<NetworkId, NetworkConfig>>,
    node_client: RwLock<Arc<NodeClient>>,
    logger: ComponentLogger,
}

impl WalletManager {
    pub fn new(options: WalletManagerOptions) -> WalletResult<Self> {
        let logger = ComponentLogger::new("manager", options.log_level);

        let persistence: Arc<dyn PersistenceAdapter> = options
            .persistence
            .unwrap_or_else(|| Arc::new(MemoryPersistence::new()));

        let initial = load_persisted_state(
            persistence.as_ref(),
            STORAGE_KEY,
            options.network,
            &logger.child("persistence"),
        );
        let store = Arc::new(StateStore::new(initial, logger.child("store")));

        // Wire persistence before anything mutates, so reconciliation
        // below is already captured
        let save_logger = logger.child("persistence");
        let save_target = persistence.clone();
        store.subscribe(move |state| match serialize_state(state) {
            Ok(document) => {
                if let Err(err) = save_target.set_item(STORAGE_KEY, &document) {
                    save_logger.warn(format!("Failed to persist session state: {}", err));
                }
            }
            Err(err) => save_logger.warn(format!("Failed to serialize session state: {}", err)),
        });

        let mut network_configs = default_network_configs();
        for (id, overrides) in &options.network_overrides {
            let merged = network_configs
                .get(id)
                .unwrap_or(&default_network_config(*id))
                .merged(overrides);
            network_configs.insert(*id, merged);
        }

        let active_network = store.snapshot().active_network;
        let node_config = network_configs
            .get(&active_network)
            .cloned()
            .unwrap_or_else(|| default_network_config(active_network));
        let node_client = Arc::new(NodeClient::new(active_network, &node_config)?);

        let mut adapters: HashMap<WalletId, Arc<dyn WalletAdapter>> = HashMap::new();
        for id in &options.wallets {
            if adapters.contains_key(id) {
                continue;
            }
            let adapter: Option<Arc<dyn WalletAdapter>> = match id {
                WalletId::Injected => options.injected_provider.clone().map(|provider| {
                    Arc::new(InjectedWallet::new(
                        provider,
                        store.clone(),
                        logger.child("injected"),
                    )) as Arc<dyn WalletAdapter>
                }),
                WalletId::Relay => options.relay_transport.clone().map(|transport| {
                    Arc::new(RelayWallet::new(
                        transport,
                        store.clone(),
                        logger.child("relay"),
                    )) as Arc<dyn WalletAdapter>
                }),
                WalletId::Kmd => match options.kmd.clone() {
                    Some(config) => {
                        match KmdWallet::new(config, store.clone(), logger.child("kmd")) {
                            Ok(wallet) => Some(Arc::new(wallet) as Arc<dyn WalletAdapter>),
                            Err(err) => {
                                logger.warn(format!("Failed to build KMD adapter: {}", err));
                                None
                            }
                        }
                    }
                    None => None,
                },
                WalletId::Mnemonic => options.mnemonic.clone().map(|config| {
                    Arc::new(MnemonicWallet::new(
                        config,
                        store.clone(),
                        logger.child("mnemonic"),
                    )) as Arc<dyn WalletAdapter>
                }),
            };
            match adapter {
                Some(adapter) => {
                    adapters.insert(*id, adapter);
                }
                None => logger.warn(format!(
                    "No backend configured for wallet '{}', skipping",
                    id
                )),
            }
        }

        // Reconcile: the store must never reference a wallet this manager
        // cannot operate
        let snapshot = store.snapshot();
        for id in snapshot.wallets.keys() {
            if !adapters.contains_key(id) {
                logger.warn(format!(
                    "Dropping persisted wallet '{}' with no instantiated adapter",
                    id
                ));
                store.remove_wallet(*id);
            }
        }
        if let Some(active) = store.snapshot().active_wallet {
            if !adapters.contains_key(&active) {
                store.set_active_wallet(None);
            }
        }

        Ok(Self {
            store,
            adapters,
            network_configs: RwLock::new(network_configs),
            node_client: RwLock::new(node_client),
            logger,
        })
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// The current complete state snapshot.
    pub fn state(&self) -> Arc<State> {
        self.store.snapshot()
    }

    pub fn wallet(&self, id: WalletId) -> Option<Arc<dyn WalletAdapter>> {
        self.adapters.get(&id).cloned()
    }

    /// Backend ids that were actually stood up.
    pub fn wallet_ids(&self) -> Vec<WalletId> {
        WalletId::ALL
            .iter()
            .copied()
            .filter(|id| self.adapters.contains_key(id))
            .collect()
    }

    /// Fan `resume_session` out to every adapter concurrently. Any single
    /// failure fails the call, but each failed adapter has already cleaned
    /// its own store entry by the time it rejects.
    pub async fn resume_sessions(&self) -> WalletResult<()> {
        self.logger.info(format!(
            "Resuming sessions for {} adapter(s)",
            self.adapters.len()
        ));
        let pending = self
            .adapters
            .values()
            .cloned()
            .map(|adapter| async move { adapter.resume_session().await });
        try_join_all(pending).await?;
        Ok(())
    }

    pub fn set_active_wallet(&self, id: Option<WalletId>) {
        self.store.set_active_wallet(id);
    }

    pub fn set_active_account(&self, id: WalletId, address: &str) {
        self.store.set_active_account(id, address);
    }

    /// Switch networks: update the store and rebuild the node client.
    /// Connected wallets stay connected.
    pub fn set_active_network(&self, network: NetworkId) -> WalletResult<()> {
        let config = self.network_config(network).ok_or_else(|| {
            WalletError::NotFound(format!("No configuration for network '{}'", network))
        })?;
        let client = NodeClient::new(network, &config)?;
        self.store.set_active_network(network);
        *self.node_client.write() = Arc::new(client);
        self.logger
            .info(format!("Active network switched to {}", network));
        Ok(())
    }

    pub fn active_network(&self) -> NetworkId {
        self.store.snapshot().active_network
    }

    pub fn network_config(&self, network: NetworkId) -> Option<NetworkConfig> {
        self.network_configs.read().get(&network).cloned()
    }

    /// Merge a partial override into one network's configuration. The node
    /// client is rebuilt when the active network is touched.
    pub fn update_network_config(
        &self,
        network: NetworkId,
        overrides: &NetworkConfigOverride,
    ) -> WalletResult<NetworkConfig> {
        let merged = {
            let mut configs = self.network_configs.write();
            let merged = configs
                .get(&network)
                .unwrap_or(&default_network_config(network))
                .merged(overrides);
            configs.insert(network, merged.clone());
            merged
        };
        if network == self.active_network() {
            *self.node_client.write() = Arc::new(NodeClient::new(network, &merged)?);
        }
        Ok(merged)
    }

    /// Restore one network's built-in default configuration.
    pub fn reset_network_config(&self, network: NetworkId) -> WalletResult<NetworkConfig> {
        let config = default_network_config(network);
        self.network_configs.write().insert(network, config.clone());
        if network == self.active_network() {
            *self.node_client.write() = Arc::new(NodeClient::new(network, &config)?);
        }
        Ok(config)
    }

    /// The RPC handle for the active network.
    pub fn node_client(&self) -> Arc<NodeClient> {
        self.node_client.read().clone()
    }

    pub fn active_wallet_id(&self) -> Option<WalletId> {
        self.store.snapshot().active_wallet
    }

    /// The adapter behind the active wallet, when one is both active and
    /// instantiated.
    pub fn active_wallet(&self) -> Option<Arc<dyn WalletAdapter>> {
        self.active_wallet_id()
            .and_then(|id| self.adapters.get(&id).cloned())
    }

    pub fn active_wallet_accounts(&self) -> Vec<WalletAccount> {
        self.store
            .snapshot()
            .active_wallet_state()
            .map(|wallet| wallet.accounts.clone())
            .unwrap_or_default()
    }

    pub fn active_account(&self) -> Option<WalletAccount> {
        self.store
            .snapshot()
            .active_wallet_state()
            .and_then(|wallet| wallet.active_account.clone())
    }

    pub fn active_address(&self) -> Option<String> {
        self.active_account().map(|account| account.address)
    }

    /// The unified signer bound to whichever wallet is currently active.
    ///
    /// Errs when no wallet is active: invoking a signer without an active
    /// wallet is a programming error upstream, so this is the one surface
    /// where an error, not a no-op, is the contract.
    pub fn transaction_signer(&self) -> WalletResult<TransactionSigner> {
        let id = self
            .store
            .snapshot()
            .active_wallet
            .ok_or(WalletError::NoActiveWallet)?;
        let adapter = self.adapters.get(&id).cloned().ok_or_else(|| {
            WalletError::NotInitialized(format!("No adapter for active wallet '{}'", id))
        })?;
        Ok(TransactionSigner { adapter })
    }
}

impl std::fmt::Debug for WalletManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletManager")
            .field("wallets", &self.wallet_ids())
            .field("state", &*self.state())
            .finish_non_exhaustive()
    }
}

/// A signing function bound to one adapter, handed to downstream
/// transaction-building code. Always returns the full group
/// (`return_group = true`), so atomic groups stay assemblable.
#[derive(Clone)]
pub struct TransactionSigner {
    adapter: Arc<dyn WalletAdapter>,
}

impl TransactionSigner {
    pub fn wallet_id(&self) -> WalletId {
        self.adapter.id()
    }

    pub async fn sign_transactions(
        &self,
        group: TransactionGroup,
        indexes_to_sign: Option<Vec<usize>>,
    ) -> WalletResult<Vec<Option<Vec<u8>>>> {
        self.adapter
            .sign_transactions(group, indexes_to_sign, true)
            .await
    }
}

impl std::fmt::Debug for TransactionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSigner")
            .field("wallet", &self.adapter.id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::WalletAccount;
    use crate::store::WalletState;
    use secrecy::SecretString;

    const TEST_PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn mnemonic_options(persistence: Arc<dyn PersistenceAdapter>) -> WalletManagerOptions {
        WalletManagerOptions {
            wallets: vec![WalletId::Mnemonic],
            network: NetworkId::TestNet,
            persistence: Some(persistence),
            mnemonic: Some(MnemonicWalletConfig::new(SecretString::from(
                TEST_PHRASE.to_string(),
            ))),
            log_level: LogLevel::Off,
            ..Default::default()
        }
    }

    #[test]
    fn unwired_backends_are_skipped_not_fatal() {
        let manager = WalletManager::new(WalletManagerOptions {
            wallets: vec![WalletId::Injected, WalletId::Relay],
            log_level: LogLevel::Off,
            ..Default::default()
        })
        .unwrap();
        assert!(manager.wallet_ids().is_empty());
    }

    #[test]
    fn default_state_seeded_with_requested_network() {
        let manager = WalletManager::new(WalletManagerOptions {
            network: NetworkId::LocalNet,
            log_level: LogLevel::Off,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(manager.active_network(), NetworkId::LocalNet);
        assert_eq!(manager.node_client().base_url(), "http://localhost:8645");
    }

    #[test]
    fn construction_reconciles_adapterless_persisted_wallets() {
        let persistence: Arc<dyn PersistenceAdapter> = Arc::new(MemoryPersistence::new());

        // Persist a snapshot claiming a connected relay wallet
        let state = State::empty(NetworkId::TestNet).add_wallet(
            WalletId::Relay,
            WalletState::new(vec![WalletAccount::new("a", "addr1")]),
        );
        persistence
            .set_item(STORAGE_KEY, &serialize_state(&state).unwrap())
            .unwrap();

        // Stand the manager up without a relay transport
        let manager = WalletManager::new(mnemonic_options(persistence.clone())).unwrap();
        let snapshot = manager.state();
        assert!(snapshot.wallet(WalletId::Relay).is_none());
        assert_eq!(snapshot.active_wallet, None);

        // The reconciled state was persisted back out
        let reloaded = load_persisted_state(
            persistence.as_ref(),
            STORAGE_KEY,
            NetworkId::TestNet,
            &ComponentLogger::new("test", LogLevel::Off),
        );
        assert!(reloaded.wallet(WalletId::Relay).is_none());
    }

    #[tokio::test]
    async fn session_survives_manager_restart() {
        let persistence: Arc<dyn PersistenceAdapter> = Arc::new(MemoryPersistence::new());

        let manager = WalletManager::new(mnemonic_options(persistence.clone())).unwrap();
        let adapter = manager.wallet(WalletId::Mnemonic).unwrap();
        let accounts = adapter.connect().await.unwrap();
        assert_eq!(manager.active_wallet_id(), Some(WalletId::Mnemonic));

        // A second manager over the same persistence resumes the session
        let restarted = WalletManager::new(mnemonic_options(persistence)).unwrap();
        restarted.resume_sessions().await.unwrap();
        assert_eq!(restarted.active_wallet_id(), Some(WalletId::Mnemonic));
        assert_eq!(restarted.active_wallet_accounts(), accounts);
    }

    #[tokio::test]
    async fn transaction_signer_requires_active_wallet() {
        let manager = WalletManager::new(WalletManagerOptions {
            log_level: LogLevel::Off,
            ..Default::default()
        })
        .unwrap();
        let err = manager.transaction_signer().unwrap_err();
        assert!(matches!(err, WalletError::NoActiveWallet));
    }

    #[tokio::test]
    async fn transaction_signer_binds_to_active_wallet() {
        let persistence: Arc<dyn PersistenceAdapter> = Arc::new(MemoryPersistence::new());
        let manager = WalletManager::new(mnemonic_options(persistence)).unwrap();
        manager
            .wallet(WalletId::Mnemonic)
            .unwrap()
            .connect()
            .await
            .unwrap();

        let signer = manager.transaction_signer().unwrap();
        assert_eq!(signer.wallet_id(), WalletId::Mnemonic);

        let sender = manager.active_address().unwrap();
        let group = TransactionGroup::from(vec![crate::transactions::Transaction::payment(
            sender, "flreceiver", 5,
        )]);
        let results = signer.sign_transactions(group, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_some());
    }

    #[test]
    fn set_active_network_rebuilds_node_client_and_keeps_wallets() {
        let manager = WalletManager::new(WalletManagerOptions {
            log_level: LogLevel::Off,
            ..Default::default()
        })
        .unwrap();
        manager.store().add_wallet(
            WalletId::Mnemonic,
            WalletState::new(vec![WalletAccount::new("a", "addr1")]),
        );

        manager.set_active_network(NetworkId::LocalNet).unwrap();
        assert_eq!(manager.active_network(), NetworkId::LocalNet);
        assert_eq!(manager.node_client().base_url(), "http://localhost:8645");
        assert!(manager.state().wallet(WalletId::Mnemonic).is_some());
    }

    #[test]
    fn network_overrides_deep_merge_over_defaults() {
        let mut overrides = HashMap::new();
        overrides.insert(
            NetworkId::TestNet,
            NetworkConfigOverride {
                endpoint: Some("https://testnet.example.org".to_string()),
                ..Default::default()
            },
        );
        let manager = WalletManager::new(WalletManagerOptions {
            network: NetworkId::TestNet,
            network_overrides: overrides,
            log_level: LogLevel::Off,
            ..Default::default()
        })
        .unwrap();

        let config = manager.network_config(NetworkId::TestNet).unwrap();
        assert_eq!(config.endpoint, "https://testnet.example.org");
        // Untouched fields keep their defaults
        assert_eq!(config.genesis_id.as_deref(), Some("flint-testnet-v1"));
        assert_eq!(manager.node_client().base_url(), "https://testnet.example.org");
    }

    #[test]
    fn update_and_reset_network_config() {
        let manager = WalletManager::new(WalletManagerOptions {
            network: NetworkId::LocalNet,
            log_level: LogLevel::Off,
            ..Default::default()
        })
        .unwrap();

        let updated = manager
            .update_network_config(
                NetworkId::LocalNet,
                &NetworkConfigOverride {
                    port: Some(9999),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.port, Some(9999));
        assert_eq!(manager.node_client().base_url(), "http://localhost:9999");

        let restored = manager.reset_network_config(NetworkId::LocalNet).unwrap();
        assert_eq!(restored, default_network_config(NetworkId::LocalNet));
        assert_eq!(manager.node_client().base_url(), "http://localhost:8645");
    }
}
