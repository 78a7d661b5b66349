use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::Mutex;
use secrecy::SecretString;

use flint_connect::{
    EnableResponse, InjectedProvider, LogLevel, MemoryPersistence, MnemonicWalletConfig, NetworkId,
    PersistenceAdapter, SignedTransaction, Transaction, TransactionGroup, WalletError,
    WalletManager, WalletManagerOptions, WalletResult, WireTransaction,
};

const TEST_PHRASE: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// Provider double standing in for a browser extension: a fixed account
/// set, and a signer that signs exactly the entries without a do-not-sign
/// hint.
struct ExtensionDouble {
    accounts: Vec<String>,
    enable_calls: Mutex<usize>,
    reachable: Mutex<bool>,
}

impl ExtensionDouble {
    fn new(accounts: Vec<&str>) -> Self {
        Self {
            accounts: accounts.into_iter().map(String::from).collect(),
            enable_calls: Mutex::new(0),
            reachable: Mutex::new(true),
        }
    }

    fn set_reachable(&self, reachable: bool) {
        *self.reachable.lock() = reachable;
    }
}

#[async_trait]
impl InjectedProvider for ExtensionDouble {
    async fn enable(&self) -> WalletResult<EnableResponse> {
        *self.enable_calls.lock() += 1;
        if !*self.reachable.lock() {
            return Err(WalletError::BackendError("extension not installed".into()));
        }
        Ok(EnableResponse {
            accounts: self.accounts.clone(),
            genesis_id: Some("flint-testnet-v1".to_string()),
        })
    }

    async fn disable(&self) -> WalletResult<()> {
        Ok(())
    }

    async fn sign_transactions(
        &self,
        entries: Vec<WireTransaction>,
    ) -> WalletResult<Vec<Option<String>>> {
        entries
            .iter()
            .map(|entry| {
                if entry.signers.as_deref() == Some(&[]) {
                    Ok(None)
                } else {
                    let bytes = BASE64.decode(&entry.transaction).map_err(|e| {
                        WalletError::ValidationError(format!("bad wire entry: {}", e))
                    })?;
                    let signed = SignedTransaction {
                        transaction: Transaction::decode(&bytes)?,
                        signature: "ee".repeat(64),
                        signer: None,
                    };
                    Ok(Some(BASE64.encode(signed.encode()?)))
                }
            })
            .collect()
    }
}

fn options(
    persistence: Arc<dyn PersistenceAdapter>,
    provider: Arc<ExtensionDouble>,
) -> WalletManagerOptions {
    WalletManagerOptions {
        wallets: vec![
            flint_connect::WalletId::Injected,
            flint_connect::WalletId::Mnemonic,
        ],
        network: NetworkId::TestNet,
        network_overrides: HashMap::new(),
        persistence: Some(persistence),
        injected_provider: Some(provider),
        relay_transport: None,
        kmd: None,
        mnemonic: Some(MnemonicWalletConfig::new(SecretString::from(
            TEST_PHRASE.to_string(),
        ))),
        log_level: LogLevel::Off,
    }
}

#[tokio::test]
async fn connect_persist_resume_sign_disconnect_flow() -> anyhow::Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let persistence: Arc<dyn PersistenceAdapter> = Arc::new(MemoryPersistence::new());
    let provider = Arc::new(ExtensionDouble::new(vec!["addrA", "addrC"]));

    // First application run: connect the injected wallet
    let manager = WalletManager::new(options(persistence.clone(), provider.clone()))?;
    let injected = manager
        .wallet(flint_connect::WalletId::Injected)
        .expect("injected adapter must be instantiated");

    let accounts = injected.connect().await?;
    assert_eq!(accounts.len(), 2);
    assert_eq!(
        manager.active_wallet_id(),
        Some(flint_connect::WalletId::Injected)
    );
    assert_eq!(manager.active_address().as_deref(), Some("addrA"));

    // Application restart: a fresh manager over the same persistence
    // reconciles against the live provider
    drop(manager);
    let manager = WalletManager::new(options(persistence.clone(), provider.clone()))?;
    assert_eq!(
        manager.active_wallet_id(),
        Some(flint_connect::WalletId::Injected),
        "persisted session must load before resume"
    );

    manager.resume_sessions().await?;
    assert_eq!(manager.active_wallet_accounts().len(), 2);

    // Sign a mixed group through the bound signer: positions 0 and 3 are
    // this wallet's and selected; 2 is a foreign sender; 1 is excluded
    let signer = manager.transaction_signer()?;
    let group = TransactionGroup::from(vec![
        Transaction::payment("addrA", "flr", 1),
        Transaction::payment("addrA", "flr", 2),
        Transaction::payment("addrB", "flr", 3),
        Transaction::payment("addrC", "flr", 4),
    ]);
    let results = signer
        .sign_transactions(group, Some(vec![0, 2, 3]))
        .await?;
    assert_eq!(results.len(), 4);

    let signed = |i: usize| SignedTransaction::decode(results[i].as_ref().unwrap());
    assert!(signed(0).is_ok());
    assert!(signed(1).is_err(), "excluded entry stays unsigned");
    assert!(signed(2).is_err(), "foreign sender stays unsigned");
    assert!(signed(3).is_ok());

    // Disconnect tears the session down and the change persists
    injected_disconnect(&manager).await?;
    assert_eq!(manager.active_wallet_id(), None);

    let manager = WalletManager::new(options(persistence, provider))?;
    assert_eq!(manager.active_wallet_id(), None);
    assert!(manager
        .state()
        .wallet(flint_connect::WalletId::Injected)
        .is_none());
    Ok(())
}

async fn injected_disconnect(manager: &WalletManager) -> WalletResult<()> {
    manager
        .wallet(flint_connect::WalletId::Injected)
        .expect("adapter present")
        .disconnect()
        .await
}

#[tokio::test]
async fn unreachable_backend_fails_resume_but_cleans_up() -> anyhow::Result<()> {
    let persistence: Arc<dyn PersistenceAdapter> = Arc::new(MemoryPersistence::new());
    let provider = Arc::new(ExtensionDouble::new(vec!["addrA"]));

    let manager = WalletManager::new(options(persistence.clone(), provider.clone()))?;
    manager
        .wallet(flint_connect::WalletId::Injected)
        .unwrap()
        .connect()
        .await?;

    // Restart with the extension gone
    provider.set_reachable(false);
    let manager = WalletManager::new(options(persistence, provider))?;
    let err = manager.resume_sessions().await.unwrap_err();
    assert!(matches!(err, WalletError::BackendError(_)));

    // The failed adapter cleaned its own entry before rejecting
    assert!(manager
        .state()
        .wallet(flint_connect::WalletId::Injected)
        .is_none());
    assert_eq!(manager.active_wallet_id(), None);
    Ok(())
}

#[tokio::test]
async fn two_wallets_cosign_one_atomic_group() -> anyhow::Result<()> {
    let persistence: Arc<dyn PersistenceAdapter> = Arc::new(MemoryPersistence::new());
    let provider = Arc::new(ExtensionDouble::new(vec!["addrA"]));

    let manager = WalletManager::new(options(persistence, provider))?;
    let injected = manager.wallet(flint_connect::WalletId::Injected).unwrap();
    let mnemonic = manager.wallet(flint_connect::WalletId::Mnemonic).unwrap();

    injected.connect().await?;
    let mnemonic_accounts = mnemonic.connect().await?;
    let mnemonic_address = mnemonic_accounts[0].address.clone();

    // A two-sender atomic group: the mnemonic wallet signs its own entry
    // first, then the injected wallet fills in the rest
    let group = vec![
        Transaction::payment(mnemonic_address.clone(), "flr", 10),
        Transaction::payment("addrA", "flr", 20),
    ];

    let first_pass = mnemonic
        .sign_transactions(TransactionGroup::from(group.clone()), None, true)
        .await?;
    let partially_signed: Vec<flint_connect::TransactionInput> = first_pass
        .into_iter()
        .map(|bytes| flint_connect::TransactionInput::Encoded(bytes.unwrap()))
        .collect();

    let final_pass = injected
        .sign_transactions(
            TransactionGroup::Flat(partially_signed),
            None,
            true,
        )
        .await?;

    // Every position now carries a signature envelope
    for bytes in &final_pass {
        let decoded = flint_connect::decode_any(bytes.as_ref().unwrap())?;
        assert!(decoded.is_signed());
    }
    Ok(())
}
