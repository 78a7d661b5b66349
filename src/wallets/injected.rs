use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::account::WalletAccount;
use crate::errors::{WalletError, WalletResult};
use crate::logging::ComponentLogger;
use crate::store::{StateStore, WalletState};
use crate::transactions::TransactionGroup;

use super::{
    build_signing_plan, connected_addresses, decode_base64_result, merge_signed_results,
    named_accounts, WalletAdapter, WalletId, WireTransaction,
};

/// What an injected provider reports on `enable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnableResponse {
    pub accounts: Vec<String>,
    pub genesis_id: Option<String>,
}

/// Transport contract for provider objects the host environment injects
/// (browser extensions and their ilk). The provider owns its own pairing
/// UX; this layer only sees the three calls below.
#[async_trait]
pub trait InjectedProvider: Send + Sync {
    async fn enable(&self) -> WalletResult<EnableResponse>;

    async fn disable(&self) -> WalletResult<()>;

    /// Sign an ordered batch; one result per entry, `None` where the
    /// provider declined or the entry carried a do-not-sign hint. Results
    /// are base64 of the signed encoding.
    async fn sign_transactions(
        &self,
        entries: Vec<WireTransaction>,
    ) -> WalletResult<Vec<Option<String>>>;
}

const ACCOUNT_NAME_PREFIX: &str = "Injected Account";

/// Adapter for injected-provider wallets.
pub struct InjectedWallet {
    provider: Arc<dyn InjectedProvider>,
    store: Arc<StateStore>,
    logger: ComponentLogger,
    // Serializes connect/disconnect/resume on this adapter instance
    op_guard: Mutex<()>,
}

impl InjectedWallet {
    pub fn new(
        provider: Arc<dyn InjectedProvider>,
        store: Arc<StateStore>,
        logger: ComponentLogger,
    ) -> Self {
        Self {
            provider,
            store,
            logger,
            op_guard: Mutex::new(()),
        }
    }
}

#[async_trait]
impl WalletAdapter for InjectedWallet {
    fn id(&self) -> WalletId {
        WalletId::Injected
    }

    async fn connect(&self) -> WalletResult<Vec<WalletAccount>> {
        let _guard = self.op_guard.lock().await;

        let response = self.provider.enable().await.map_err(|err| {
            self.logger.error(format!("Provider enable failed: {}", err));
            err
        })?;

        if response.accounts.is_empty() {
            return Err(WalletError::BackendError(
                "Provider enabled with no accounts".to_string(),
            ));
        }

        let accounts = named_accounts(ACCOUNT_NAME_PREFIX, &response.accounts);
        self.store
            .add_wallet(self.id(), WalletState::new(accounts.clone()));
        self.logger
            .info(format!("Connected with {} account(s)", accounts.len()));
        Ok(accounts)
    }

    async fn disconnect(&self) -> WalletResult<()> {
        let _guard = self.op_guard.lock().await;

        if let Err(err) = self.provider.disable().await {
            // Teardown is best-effort; the store entry goes regardless
            self.logger
                .warn(format!("Provider disable failed: {}", err));
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

        let response = match self.provider.enable().await {
            Ok(response) => response,
            Err(err) => {
                // Cleanup first, then reject: the store must not keep an
                // entry pointing at an unreachable provider
                self.logger
                    .warn(format!("Session resume failed, disconnecting: {}", err));
                self.store.remove_wallet(self.id());
                return Err(err);
            }
        };

        let live = named_accounts(ACCOUNT_NAME_PREFIX, &response.accounts);
        if live.is_empty() {
            self.logger.warn("Provider reports no accounts, disconnecting");
            self.store.remove_wallet(self.id());
            return Ok(());
        }

        if live != persisted {
            self.logger.info("Persisted accounts diverge from provider, reconciling");
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
        let addresses = connected_addresses(&self.store, self.id());
        let plan = build_signing_plan(group, indexes_to_sign.as_deref(), &addresses)?;

        // The whole batch goes to the provider, unselected entries tagged
        // do-not-sign, so it can see complete atomic groups
        let responses = self
            .provider
            .sign_transactions(plan.wire_entries())
            .await
            .map_err(|err| {
                self.logger.error(format!("Provider signing failed: {}", err));
                err
            })?;

        let mut results = Vec::with_capacity(responses.len());
        for response in responses {
            results.push(match response {
                Some(encoded) => Some(decode_base64_result(&encoded)?),
                None => None,
            });
        }

        merge_signed_results(&plan, results, return_group)
    }
}
