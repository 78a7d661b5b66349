use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::account::WalletAccount;
use crate::errors::{WalletError, WalletResult};
use crate::logging::ComponentLogger;
use crate::store::{StateStore, WalletState};
use crate::transactions::TransactionGroup;

use super::{
    build_signing_plan, connected_addresses, merge_signed_results, named_accounts, WalletAdapter,
    WalletId, WireTransaction,
};

/// A live pairing with a remote signer over the relay protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySession {
    /// Opaque session identifier (the relay implementation typically uses
    /// a UUID; see [`RelaySession::with_generated_id`]).
    pub session_id: String,
    pub accounts: Vec<String>,
}

impl RelaySession {
    pub fn with_generated_id(accounts: Vec<String>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            accounts,
        }
    }
}

/// Transport contract for QR/relay signing protocols. Pairing UX (QR
/// rendering, deep links) lives behind this boundary.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Establish a fresh pairing and report the remote signer's accounts.
    async fn open_session(&self) -> WalletResult<RelaySession>;

    async fn close_session(&self, session_id: &str) -> WalletResult<()>;

    /// Request signatures for an ordered batch; one result per entry,
    /// `None` where the remote signer declined or the entry carried a
    /// do-not-sign hint.
    async fn request_signatures(
        &self,
        session_id: &str,
        entries: Vec<WireTransaction>,
    ) -> WalletResult<Vec<Option<Vec<u8>>>>;
}

const ACCOUNT_NAME_PREFIX: &str = "Relay Account";

/// Adapter for relay/QR-protocol wallets.
///
/// Sessions are pairing-scoped: they do not survive an application
/// restart, so `resume_session` clears any persisted entry instead of
/// trusting it.
pub struct RelayWallet {
    transport: Arc<dyn RelayTransport>,
    session: SyncMutex<Option<RelaySession>>,
    store: Arc<StateStore>,
    logger: ComponentLogger,
    op_guard: Mutex<()>,
}

impl RelayWallet {
    pub fn new(
        transport: Arc<dyn RelayTransport>,
        store: Arc<StateStore>,
        logger: ComponentLogger,
    ) -> Self {
        Self {
            transport,
            session: SyncMutex::new(None),
            store,
            logger,
            op_guard: Mutex::new(()),
        }
    }

    fn current_session_id(&self) -> Option<String> {
        self.session
            .lock()
            .as_ref()
            .map(|session| session.session_id.clone())
    }
}

#[async_trait]
impl WalletAdapter for RelayWallet {
    fn id(&self) -> WalletId {
        WalletId::Relay
    }

    async fn connect(&self) -> WalletResult<Vec<WalletAccount>> {
        let _guard = self.op_guard.lock().await;

        let session = self.transport.open_session().await.map_err(|err| {
            self.logger
                .error(format!("Relay session open failed: {}", err));
            err
        })?;

        if session.accounts.is_empty() {
            // Close the half-open pairing before surfacing the failure so
            // the remote end is not left waiting
            let _ = self.transport.close_session(&session.session_id).await;
            return Err(WalletError::BackendError(
                "Relay session exposed no accounts".to_string(),
            ));
        }

        let accounts = named_accounts(ACCOUNT_NAME_PREFIX, &session.accounts);
        *self.session.lock() = Some(session);
        self.store
            .add_wallet(self.id(), WalletState::new(accounts.clone()));
        self.logger
            .info(format!("Paired with {} account(s)", accounts.len()));
        Ok(accounts)
    }

    /// Tear down the pairing. A missing session handle while the store
    /// still holds an entry is tolerated (the entry is cleared); a
    /// disconnect with neither is fatal, since there is nothing to
    /// disconnect.
    async fn disconnect(&self) -> WalletResult<()> {
        let _guard = self.op_guard.lock().await;

        let session = self.session.lock().take();
        let has_entry = self.store.snapshot().wallet(self.id()).is_some();

        match session {
            Some(session) => {
                if let Err(err) = self.transport.close_session(&session.session_id).await {
                    self.logger
                        .warn(format!("Relay session close failed: {}", err));
                }
            }
            None if !has_entry => {
                return Err(WalletError::NotConnected(
                    "No relay session to disconnect".to_string(),
                ));
            }
            None => {}
        }

        self.store.remove_wallet(self.id());
        Ok(())
    }

    async fn resume_session(&self) -> WalletResult<()> {
        let _guard = self.op_guard.lock().await;

        if self.store.snapshot().wallet(self.id()).is_none() {
            return Ok(());
        }

        // A relay pairing requires an explicit re-handshake; a persisted
        // entry necessarily points at a dead session
        self.logger
            .info("Relay sessions cannot be re-validated, clearing persisted entry");
        self.store.remove_wallet(self.id());
        Ok(())
    }

    async fn sign_transactions(
        &self,
        group: TransactionGroup,
        indexes_to_sign: Option<Vec<usize>>,
        return_group: bool,
    ) -> WalletResult<Vec<Option<Vec<u8>>>> {
        let session_id = self.current_session_id().ok_or_else(|| {
            WalletError::NotInitialized("Relay session not established".to_string())
        })?;

        let addresses = connected_addresses(&self.store, self.id());
        let plan = build_signing_plan(group, indexes_to_sign.as_deref(), &addresses)?;

        let results = self
            .transport
            .request_signatures(&session_id, plan.wire_entries())
            .await
            .map_err(|err| {
                self.logger
                    .error(format!("Relay signing request failed: {}", err));
                err
            })?;

        merge_signed_results(&plan, results, return_group)
    }
}
