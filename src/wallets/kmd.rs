use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use parking_lot::Mutex as SyncMutex;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use crate::account::WalletAccount;
use crate::errors::{WalletError, WalletResult};
use crate::logging::ComponentLogger;
use crate::secure_key::with_secure_key_sync;
use crate::store::{StateStore, WalletState};
use crate::transactions::{decode_any, DecodedTransaction, SignedTransaction, TransactionGroup};

use super::{
    build_signing_plan, connected_addresses, merge_signed_results, named_accounts, WalletAdapter,
    WalletId,
};

const API_TOKEN_HEADER: &str = "X-KMD-API-Token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ACCOUNT_NAME_PREFIX: &str = "KMD Account";

/// Connection parameters for a local key-management daemon.
#[derive(Clone)]
pub struct KmdConfig {
    pub endpoint: String,
    pub port: Option<u16>,
    pub token: String,
    pub wallet_name: String,
    pub wallet_password: SecretString,
}

impl KmdConfig {
    pub fn new(wallet_name: impl Into<String>, wallet_password: SecretString) -> Self {
        Self {
            endpoint: "http://127.0.0.1".to_string(),
            port: Some(7833),
            token: String::new(),
            wallet_name: wallet_name.into(),
            wallet_password,
        }
    }

    fn base_url(&self) -> String {
        let trimmed = self.endpoint.trim_end_matches('/');
        match self.port {
            Some(port) => format!("{}:{}", trimmed, port),
            None => trimmed.to_string(),
        }
    }
}

impl std::fmt::Debug for KmdConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KmdConfig")
            .field("endpoint", &self.endpoint)
            .field("port", &self.port)
            .field("wallet_name", &self.wallet_name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct KmdWalletInfo {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ListWalletsResponse {
    #[serde(default)]
    wallets: Vec<KmdWalletInfo>,
}

#[derive(Debug, Serialize)]
struct InitHandleRequest<'a> {
    wallet_id: &'a str,
    wallet_password: &'a str,
}

#[derive(Debug, Deserialize)]
struct InitHandleResponse {
    wallet_handle_token: String,
}

#[derive(Debug, Serialize)]
struct HandleRequest<'a> {
    wallet_handle_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListKeysResponse {
    #[serde(default)]
    addresses: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ExportKeyRequest<'a> {
    wallet_handle_token: &'a str,
    address: &'a str,
    wallet_password: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExportKeyResponse {
    private_key: Vec<u8>,
}

/// Exported keys arrive as either the 32-byte seed or the 64-byte
/// seed-plus-public concatenation; only the seed half feeds the signer.
fn seed_from_exported(private_key: &[u8]) -> WalletResult<[u8; 32]> {
    match private_key.len() {
        32 | 64 => {
            let mut seed = [0u8; 32];
            seed.copy_from_slice(&private_key[..32]);
            Ok(seed)
        }
        other => Err(WalletError::SigningError(format!(
            "Exported key has unsupported length {}",
            other
        ))),
    }
}

/// Adapter for wallets resident in a key-management daemon.
///
/// The daemon stores the keys; signing exports each needed key for the
/// duration of one scoped signing call and never caches it.
pub struct KmdWallet {
    config: KmdConfig,
    client: Client,
    handle: SyncMutex<Option<String>>,
    store: Arc<StateStore>,
    logger: ComponentLogger,
    op_guard: Mutex<()>,
}

impl KmdWallet {
    pub fn new(
        config: KmdConfig,
        store: Arc<StateStore>,
        logger: ComponentLogger,
    ) -> WalletResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| WalletError::NetworkError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            config,
            client,
            handle: SyncMutex::new(None),
            store,
            logger,
            op_guard: Mutex::new(()),
        })
    }

    fn current_handle(&self) -> Option<String> {
        self.handle.lock().clone()
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> WalletResult<T> {
        let url = format!("{}{}", self.config.base_url(), path);
        let response = self
            .client
            .get(&url)
            .header(API_TOKEN_HEADER, &self.config.token)
            .send()
            .await
            .map_err(|e| WalletError::NetworkError(format!("KMD request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(WalletError::BackendError(format!(
                "KMD responded {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| WalletError::BackendError(format!("Invalid KMD response: {}", e)))
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> WalletResult<T> {
        let url = format!("{}{}", self.config.base_url(), path);
        let response = self
            .client
            .post(&url)
            .header(API_TOKEN_HEADER, &self.config.token)
            .json(body)
            .send()
            .await
            .map_err(|e| WalletError::NetworkError(format!("KMD request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(WalletError::BackendError(format!(
                "KMD responded {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| WalletError::BackendError(format!("Invalid KMD response: {}", e)))
    }

    async fn fetch_wallet_id(&self) -> WalletResult<String> {
        let response: ListWalletsResponse = self.get("/v1/wallets").await?;
        response
            .wallets
            .into_iter()
            .find(|wallet| wallet.name == self.config.wallet_name)
            .map(|wallet| wallet.id)
            .ok_or_else(|| {
                WalletError::NotFound(format!(
                    "KMD wallet '{}' not found",
                    self.config.wallet_name
                ))
            })
    }

    async fn init_handle(&self, wallet_id: &str) -> WalletResult<String> {
        let response: InitHandleResponse = self
            .post(
                "/v1/wallet/init",
                &InitHandleRequest {
                    wallet_id,
                    wallet_password: self.config.wallet_password.expose_secret(),
                },
            )
            .await?;
        Ok(response.wallet_handle_token)
    }

    async fn release_handle(&self, handle: &str) -> WalletResult<()> {
        let url = format!("{}/v1/wallet/release", self.config.base_url());
        let response = self
            .client
            .post(&url)
            .header(API_TOKEN_HEADER, &self.config.token)
            .json(&HandleRequest {
                wallet_handle_token: handle,
            })
            .send()
            .await
            .map_err(|e| WalletError::NetworkError(format!("KMD request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(WalletError::BackendError(format!(
                "KMD responded {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn list_keys(&self, handle: &str) -> WalletResult<Vec<String>> {
        let response: ListKeysResponse = self
            .post(
                "/v1/key/list",
                &HandleRequest {
                    wallet_handle_token: handle,
                },
            )
            .await?;
        Ok(response.addresses)
    }

    async fn export_key(&self, handle: &str, address: &str) -> WalletResult<Zeroizing<Vec<u8>>> {
        let response: ExportKeyResponse = self
            .post(
                "/v1/key/export",
                &ExportKeyRequest {
                    wallet_handle_token: handle,
                    address,
                    wallet_password: self.config.wallet_password.expose_secret(),
                },
            )
            .await?;
        Ok(Zeroizing::new(response.private_key))
    }

    async fn open_session(&self) -> WalletResult<(String, Vec<String>)> {
        let wallet_id = self.fetch_wallet_id().await?;
        let handle = self.init_handle(&wallet_id).await?;
        match self.list_keys(&handle).await {
            Ok(addresses) => Ok((handle, addresses)),
            Err(err) => {
                let _ = self.release_handle(&handle).await;
                Err(err)
            }
        }
    }
}

#[async_trait]
impl WalletAdapter for KmdWallet {
    fn id(&self) -> WalletId {
        WalletId::Kmd
    }

    async fn connect(&self) -> WalletResult<Vec<WalletAccount>> {
        let _guard = self.op_guard.lock().await;

        let (handle, addresses) = self.open_session().await.map_err(|err| {
            self.logger.error(format!("KMD connect failed: {}", err));
            err
        })?;

        if addresses.is_empty() {
            let _ = self.release_handle(&handle).await;
            return Err(WalletError::BackendError(
                "KMD wallet holds no keys".to_string(),
            ));
        }

        let accounts = named_accounts(ACCOUNT_NAME_PREFIX, &addresses);
        *self.handle.lock() = Some(handle);
        self.store
            .add_wallet(self.id(), WalletState::new(accounts.clone()));
        self.logger
            .info(format!("Connected with {} key(s)", accounts.len()));
        Ok(accounts)
    }

    async fn disconnect(&self) -> WalletResult<()> {
        let _guard = self.op_guard.lock().await;

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = self.release_handle(&handle).await {
                self.logger
                    .warn(format!("KMD handle release failed: {}", err));
            }
        }
        self.store.remove_wallet(self.id());
        Ok(())
    }

    async fn resume_session(&self) -> WalletResult<()> {
        let _guard = self.op_guard.lock().await;

        let persisted = match self.store.snapshot().wallet(self.id()) {
            Some(wallet) => wallet.accounts.clone(),
            None => return Ok(()),
        };

        // The daemon is authoritative; re-open a session and reconcile
        let (handle, addresses) = match self.open_session().await {
            Ok(session) => session,
            Err(err) => {
                self.logger
                    .warn(format!("KMD resume failed, disconnecting: {}", err));
                self.store.remove_wallet(self.id());
                return Err(err);
            }
        };

        let live = named_accounts(ACCOUNT_NAME_PREFIX, &addresses);
        *self.handle.lock() = Some(handle);
        if live.is_empty() {
            self.logger.warn("KMD wallet lost its keys, disconnecting");
            self.store.remove_wallet(self.id());
            return Ok(());
        }
        if live != persisted {
            self.logger
                .info("Persisted accounts diverge from KMD, reconciling");
            self.store.set_accounts(self.id(), live);
        }
        Ok(())
    }

    async fn sign_transactions(
        &self,
        group: TransactionGroup,
        indexes_to_sign: Option<Vec<usize>>,
        return_group: bool,
    ) -> WalletResult<Vec<Option<Vec<u8>>>> {
        let handle = self.current_handle().ok_or_else(|| {
            WalletError::NotInitialized("KMD wallet handle not initialized".to_string())
        })?;

        let addresses = connected_addresses(&self.store, self.id());
        let plan = build_signing_plan(group, indexes_to_sign.as_deref(), &addresses)?;

        let mut results: Vec<Option<Vec<u8>>> = vec![None; plan.transactions.len()];
        for &index in &plan.indexes_to_sign {
            let entry = &plan.transactions[index];
            // Export, sign inside the scoped container, forget: the key
            // never outlives one position's signing call
            let exported = self.export_key(&handle, &entry.sender).await.map_err(|err| {
                self.logger
                    .error(format!("KMD key export failed for {}: {}", entry.sender, err));
                err
            })?;

            let encoded = with_secure_key_sync(&exported, |key_bytes| {
                let seed = seed_from_exported(key_bytes)?;
                let key = SigningKey::from_bytes(&seed);
                let transaction = match decode_any(&entry.encoded)? {
                    DecodedTransaction::Unsigned(txn) => txn,
                    DecodedTransaction::Signed(_) => {
                        return Err(WalletError::SigningError(
                            "Refusing to re-sign a signed transaction".to_string(),
                        ))
                    }
                };
                let signature = key.sign(&transaction.signing_bytes()?);
                SignedTransaction {
                    transaction,
                    signature: hex::encode(signature.to_bytes()),
                    signer: None,
                }
                .encode()
            })?;
            results[index] = Some(encoded);
        }

        merge_signed_results(&plan, results, return_group)
    }
}
