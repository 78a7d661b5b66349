use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use crate::account::{address_from_public_key, WalletAccount};
use crate::errors::{WalletError, WalletResult};
use crate::logging::ComponentLogger;
use crate::network::NetworkId;
use crate::secure_key::with_secure_key_sync;
use crate::store::{StateStore, WalletState};
use crate::transactions::{decode_any, DecodedTransaction, SignedTransaction, TransactionGroup};

use super::{build_signing_plan, connected_addresses, merge_signed_results, WalletAdapter, WalletId};

const ACCOUNT_NAME_PREFIX: &str = "Mnemonic Account";

/// Configuration for the in-memory mnemonic backend.
#[derive(Clone)]
pub struct MnemonicWalletConfig {
    /// BIP39 phrase; held as a secret, only materialized during key
    /// derivation.
    pub phrase: SecretString,
    /// How many accounts to derive from the phrase.
    pub account_count: usize,
}

impl MnemonicWalletConfig {
    pub fn new(phrase: SecretString) -> Self {
        Self {
            phrase,
            account_count: 1,
        }
    }

    pub fn with_account_count(mut self, count: usize) -> Self {
        self.account_count = count.max(1);
        self
    }
}

impl std::fmt::Debug for MnemonicWalletConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MnemonicWalletConfig")
            .field("account_count", &self.account_count)
            .finish_non_exhaustive()
    }
}

/// Adapter for locally held mnemonic-derived keys.
///
/// Intended for development and testing; to keep a pasted phrase from
/// controlling real funds, every operation is refused on MainNet with the
/// same restriction error, raised before the store or any key material is
/// touched.
pub struct MnemonicWallet {
    config: MnemonicWalletConfig,
    store: Arc<StateStore>,
    logger: ComponentLogger,
    op_guard: Mutex<()>,
}

impl MnemonicWallet {
    pub fn new(
        config: MnemonicWalletConfig,
        store: Arc<StateStore>,
        logger: ComponentLogger,
    ) -> Self {
        Self {
            config,
            store,
            logger,
            op_guard: Mutex::new(()),
        }
    }

    fn ensure_network_allowed(&self) -> WalletResult<()> {
        let network = self.store.snapshot().active_network;
        if network == NetworkId::MainNet {
            return Err(WalletError::NetworkRestricted(
                "Mnemonic wallet is disabled on mainnet".to_string(),
            ));
        }
        Ok(())
    }

    /// The BIP39 seed for the configured phrase.
    fn seed(&self) -> WalletResult<Zeroizing<Vec<u8>>> {
        let mnemonic = bip39::Mnemonic::parse(self.config.phrase.expose_secret())
            .map_err(|e| WalletError::KeyDerivation(format!("Invalid mnemonic phrase: {}", e)))?;
        Ok(Zeroizing::new(mnemonic.to_seed("").to_vec()))
    }

    /// Derive the accounts' signing keys from seed bytes. Per-account keys
    /// come from domain-separated blake3 derivation over the seed.
    fn derive_keys(&self, seed: &[u8]) -> Vec<SigningKey> {
        (0..self.config.account_count)
            .map(|index| {
                let context = format!("flint-connect mnemonic account {}", index);
                SigningKey::from_bytes(&blake3::derive_key(&context, seed))
            })
            .collect()
    }

    fn derive_accounts(&self) -> WalletResult<Vec<WalletAccount>> {
        let seed = self.seed()?;
        with_secure_key_sync(&seed, |seed| {
            Ok(self
                .derive_keys(seed)
                .iter()
                .enumerate()
                .map(|(i, key)| {
                    WalletAccount::new(
                        format!("{} {}", ACCOUNT_NAME_PREFIX, i + 1),
                        address_from_public_key(&key.verifying_key()),
                    )
                })
                .collect())
        })
    }
}

#[async_trait]
impl WalletAdapter for MnemonicWallet {
    fn id(&self) -> WalletId {
        WalletId::Mnemonic
    }

    async fn connect(&self) -> WalletResult<Vec<WalletAccount>> {
        let _guard = self.op_guard.lock().await;
        self.ensure_network_allowed()?;

        let accounts = self.derive_accounts()?;
        self.store
            .add_wallet(self.id(), WalletState::new(accounts.clone()));
        self.logger
            .info(format!("Derived {} account(s) from mnemonic", accounts.len()));
        Ok(accounts)
    }

    async fn disconnect(&self) -> WalletResult<()> {
        let _guard = self.op_guard.lock().await;
        // No backend handle to tear down; only the store entry goes
        self.store.remove_wallet(self.id());
        Ok(())
    }

    async fn resume_session(&self) -> WalletResult<()> {
        let _guard = self.op_guard.lock().await;
        self.ensure_network_allowed()?;

        let persisted = match self.store.snapshot().wallet(self.id()) {
            Some(wallet) => wallet.accounts.clone(),
            None => return Ok(()),
        };

        // The phrase is live configuration, so the persisted account set
        // can be re-validated by re-deriving it
        let accounts = match self.derive_accounts() {
            Ok(accounts) => accounts,
            Err(err) => {
                self.logger
                    .warn(format!("Mnemonic re-derivation failed, disconnecting: {}", err));
                self.store.remove_wallet(self.id());
                return Err(err);
            }
        };

        if accounts != persisted {
            self.logger
                .info("Persisted accounts diverge from derivation, reconciling");
            self.store.set_accounts(self.id(), accounts);
        }
        Ok(())
    }

    async fn sign_transactions(
        &self,
        group: TransactionGroup,
        indexes_to_sign: Option<Vec<usize>>,
        return_group: bool,
    ) -> WalletResult<Vec<Option<Vec<u8>>>> {
        self.ensure_network_allowed()?;

        let addresses = connected_addresses(&self.store, self.id());
        let plan = build_signing_plan(group, indexes_to_sign.as_deref(), &addresses)?;

        let seed = self.seed()?;
        let mut results: Vec<Option<Vec<u8>>> = vec![None; plan.transactions.len()];

        // Keys live only for the duration of this scope
        with_secure_key_sync(&seed, |seed| {
            let keys = self.derive_keys(seed);
            for &index in &plan.indexes_to_sign {
                let entry = &plan.transactions[index];
                let key = keys
                    .iter()
                    .find(|key| address_from_public_key(&key.verifying_key()) == entry.sender)
                    .ok_or_else(|| {
                        WalletError::SigningError(format!(
                            "No derived key for sender {}",
                            entry.sender
                        ))
                    })?;

                let transaction = match decode_any(&entry.encoded)? {
                    DecodedTransaction::Unsigned(txn) => txn,
                    DecodedTransaction::Signed(_) => continue,
                };
                let signature = key.sign(&transaction.signing_bytes()?);
                let signed = SignedTransaction {
                    transaction,
                    signature: hex::encode(signature.to_bytes()),
                    signer: None,
                };
                results[index] = Some(signed.encode()?);
            }
            Ok(())
        })?;

        merge_signed_results(&plan, results, return_group)
    }
}
