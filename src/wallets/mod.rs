//! The wallet-adapter layer: one uniform contract over heterogeneous
//! signing backends, plus the transaction-group normalization and
//! selective-signing algorithm every backend shares. Only the final
//! "ask the backend to sign" step differs per backend.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::account::WalletAccount;
use crate::errors::{WalletError, WalletResult};
use crate::store::StateStore;
use crate::transactions::{decode_any, TransactionGroup, TransactionInput};

pub mod injected;
pub mod kmd;
pub mod mnemonic;
pub mod relay;

pub use injected::{EnableResponse, InjectedProvider, InjectedWallet};
pub use kmd::{KmdConfig, KmdWallet};
pub use mnemonic::{MnemonicWallet, MnemonicWalletConfig};
pub use relay::{RelaySession, RelayTransport, RelayWallet};

/// Identifiers for the supported wallet backends. Selected at manager
/// construction; the store's wallet map is keyed by this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletId {
    Injected,
    Relay,
    Kmd,
    Mnemonic,
}

impl WalletId {
    pub const ALL: [WalletId; 4] = [
        WalletId::Injected,
        WalletId::Relay,
        WalletId::Kmd,
        WalletId::Mnemonic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WalletId::Injected => "injected",
            WalletId::Relay => "relay",
            WalletId::Kmd => "kmd",
            WalletId::Mnemonic => "mnemonic",
        }
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a backend signing request: the transaction in its wire
/// form plus an optional signer hint. `signers: Some(vec![])` marks an
/// entry the backend must pass through unsigned, which is how mixed
/// multi-signer atomic groups stay assemblable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTransaction {
    /// Base64 of the transaction encoding.
    pub transaction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signers: Option<Vec<String>>,
}

/// The uniform capability set every backend satisfies.
///
/// Adapters write to the store exclusively through its named mutation
/// operations; a connected `WalletState` in the store is the only
/// "connected" signal this layer exposes.
#[async_trait]
pub trait WalletAdapter: Send + Sync {
    fn id(&self) -> WalletId;

    /// Backend handshake. On success the fresh `WalletState` has been
    /// written and the accounts are returned; on failure the store is
    /// untouched; partial connection state is never written.
    async fn connect(&self) -> WalletResult<Vec<WalletAccount>>;

    /// Best-effort backend teardown followed by unconditional removal of
    /// the wallet's store entry (unless the backend contract defines the
    /// missing-handle case as fatal).
    async fn disconnect(&self) -> WalletResult<()>;

    /// Reconcile persisted state with live backend reality at startup.
    /// No-op when nothing was persisted for this wallet; otherwise the
    /// persisted accounts are re-validated against the backend or the
    /// entry is cleared.
    async fn resume_session(&self) -> WalletResult<()>;

    /// Sign the selected subset of a transaction group. See the module
    /// docs for the selection rules; `None` entries mean the backend
    /// declined that position, never infrastructure failure.
    async fn sign_transactions(
        &self,
        group: TransactionGroup,
        indexes_to_sign: Option<Vec<usize>>,
        return_group: bool,
    ) -> WalletResult<Vec<Option<Vec<u8>>>>;
}

/// Addresses currently connected for a wallet, from the store snapshot.
pub(crate) fn connected_addresses(store: &StateStore, id: WalletId) -> HashSet<String> {
    store
        .snapshot()
        .wallet(id)
        .map(|wallet| {
            wallet
                .accounts
                .iter()
                .map(|account| account.address.clone())
                .collect()
        })
        .unwrap_or_default()
}

/// Label a backend's bare address list for display.
pub(crate) fn named_accounts(prefix: &str, addresses: &[String]) -> Vec<WalletAccount> {
    addresses
        .iter()
        .enumerate()
        .map(|(i, address)| WalletAccount::new(format!("{} {}", prefix, i + 1), address.clone()))
        .collect()
}

/// One flattened transaction with the facts selection needs.
#[derive(Debug, Clone)]
pub(crate) struct NormalizedTransaction {
    pub encoded: Vec<u8>,
    pub sender: String,
    pub already_signed: bool,
}

fn normalize(input: TransactionInput) -> WalletResult<NormalizedTransaction> {
    match input {
        TransactionInput::Transaction(txn) => Ok(NormalizedTransaction {
            encoded: txn.encode()?,
            sender: txn.sender,
            already_signed: false,
        }),
        TransactionInput::Encoded(bytes) => {
            let decoded = decode_any(&bytes)?;
            Ok(NormalizedTransaction {
                sender: decoded.sender().to_string(),
                already_signed: decoded.is_signed(),
                encoded: bytes,
            })
        }
    }
}

/// The shared front half of every backend's `sign_transactions`: the
/// flattened group plus the positions this wallet is responsible for.
#[derive(Debug)]
pub(crate) struct SigningPlan {
    pub transactions: Vec<NormalizedTransaction>,
    pub indexes_to_sign: Vec<usize>,
}

/// Flatten the group, keep the original order as the index space, and
/// select each position that is unsigned, covered by `indexes_to_sign`
/// (or its absence), and sent by one of this wallet's connected
/// addresses.
pub(crate) fn build_signing_plan(
    group: TransactionGroup,
    indexes_to_sign: Option<&[usize]>,
    addresses: &HashSet<String>,
) -> WalletResult<SigningPlan> {
    let transactions = group
        .flatten()
        .into_iter()
        .map(normalize)
        .collect::<WalletResult<Vec<_>>>()?;

    if let Some(indexes) = indexes_to_sign {
        if let Some(out_of_range) = indexes.iter().find(|i| **i >= transactions.len()) {
            return Err(WalletError::ValidationError(format!(
                "Signing index {} out of range for group of {}",
                out_of_range,
                transactions.len()
            )));
        }
    }

    let selected = transactions
        .iter()
        .enumerate()
        .filter(|(i, txn)| {
            !txn.already_signed
                && indexes_to_sign.map_or(true, |indexes| indexes.contains(i))
                && addresses.contains(&txn.sender)
        })
        .map(|(i, _)| i)
        .collect();

    Ok(SigningPlan {
        transactions,
        indexes_to_sign: selected,
    })
}

impl SigningPlan {
    pub fn is_selected(&self, index: usize) -> bool {
        self.indexes_to_sign.contains(&index)
    }

    /// The full batch in wire form, unselected entries tagged with the
    /// do-not-sign hint.
    pub fn wire_entries(&self) -> Vec<WireTransaction> {
        self.transactions
            .iter()
            .enumerate()
            .map(|(i, txn)| WireTransaction {
                transaction: BASE64.encode(&txn.encoded),
                signers: if self.is_selected(i) {
                    None
                } else {
                    Some(Vec::new())
                },
            })
            .collect()
    }
}

/// The shared back half: fold per-position backend results into the final
/// shape. `results` must cover every flattened position (`None` where the
/// backend declined or was not asked).
///
/// With `return_group` the output matches the flattened input's length,
/// substituting the original encoding wherever no signature came back;
/// otherwise only the selected positions' results are returned, in
/// original relative order.
pub(crate) fn merge_signed_results(
    plan: &SigningPlan,
    results: Vec<Option<Vec<u8>>>,
    return_group: bool,
) -> WalletResult<Vec<Option<Vec<u8>>>> {
    if results.len() != plan.transactions.len() {
        return Err(WalletError::BackendError(format!(
            "Backend returned {} results for {} transactions",
            results.len(),
            plan.transactions.len()
        )));
    }

    if return_group {
        Ok(results
            .into_iter()
            .zip(plan.transactions.iter())
            .map(|(result, txn)| Some(result.unwrap_or_else(|| txn.encoded.clone())))
            .collect())
    } else {
        Ok(results
            .into_iter()
            .enumerate()
            .filter(|(i, _)| plan.is_selected(*i))
            .map(|(_, result)| result)
            .collect())
    }
}

/// Decode one backend base64 result, mapping failures to backend errors.
pub(crate) fn decode_base64_result(value: &str) -> WalletResult<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|e| WalletError::BackendError(format!("Backend returned invalid base64: {}", e)))
}
