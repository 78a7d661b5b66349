use serde::{Deserialize, Serialize};

use crate::errors::{WalletError, WalletResult};

/// Domain separator prepended to the canonical encoding before signing.
pub const TXN_SIGNING_DOMAIN: &[u8] = b"FLINTTX1";

/// A Flint payment transaction.
///
/// Fields serialize in declaration order, which makes the JSON encoding
/// canonical for signing purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub receiver: String,
    pub amount: u64,
    pub fee: u64,
    pub first_valid: u64,
    pub last_valid: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genesis_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Transaction {
    pub fn payment(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        amount: u64,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
            fee: 1000,
            first_valid: 0,
            last_valid: 1000,
            genesis_id: None,
            note: None,
        }
    }

    /// Canonical JSON encoding.
    pub fn encode(&self) -> WalletResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> WalletResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// The byte string a signer commits to: domain separator plus the
    /// canonical encoding.
    pub fn signing_bytes(&self) -> WalletResult<Vec<u8>> {
        let encoded = self.encode()?;
        let mut bytes = Vec::with_capacity(TXN_SIGNING_DOMAIN.len() + encoded.len());
        bytes.extend_from_slice(TXN_SIGNING_DOMAIN);
        bytes.extend_from_slice(&encoded);
        Ok(bytes)
    }
}

/// A transaction wrapped in its signature envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    /// Hex-encoded ed25519 signature over [`Transaction::signing_bytes`].
    pub signature: String,
    /// Set when the signing address differs from the sender (rekeyed or
    /// delegated accounts).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<String>,
}

impl SignedTransaction {
    pub fn encode(&self) -> WalletResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> WalletResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Result of structurally decoding transaction bytes: the presence of the
/// signature envelope is what distinguishes signed from unsigned.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DecodedTransaction {
    Signed(SignedTransaction),
    Unsigned(Transaction),
}

impl DecodedTransaction {
    pub fn sender(&self) -> &str {
        match self {
            DecodedTransaction::Signed(signed) => &signed.transaction.sender,
            DecodedTransaction::Unsigned(txn) => &txn.sender,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, DecodedTransaction::Signed(_))
    }
}

/// Decode arbitrary transaction bytes, signed or not.
pub fn decode_any(bytes: &[u8]) -> WalletResult<DecodedTransaction> {
    serde_json::from_slice(bytes).map_err(|e| {
        WalletError::ValidationError(format!("Unrecognized transaction encoding: {}", e))
    })
}

/// One entry of a signing request: either a decoded transaction or bytes
/// produced elsewhere (possibly already signed).
#[derive(Debug, Clone)]
pub enum TransactionInput {
    Transaction(Transaction),
    Encoded(Vec<u8>),
}

impl From<Transaction> for TransactionInput {
    fn from(txn: Transaction) -> Self {
        TransactionInput::Transaction(txn)
    }
}

impl From<Vec<u8>> for TransactionInput {
    fn from(bytes: Vec<u8>) -> Self {
        TransactionInput::Encoded(bytes)
    }
}

/// A signing request: a flat batch or a batch of atomic groups. Nested
/// input flattens to one ordered sequence, which is the index space for
/// `indexes_to_sign`.
#[derive(Debug, Clone)]
pub enum TransactionGroup {
    Flat(Vec<TransactionInput>),
    Nested(Vec<Vec<TransactionInput>>),
}

impl TransactionGroup {
    pub fn flatten(self) -> Vec<TransactionInput> {
        match self {
            TransactionGroup::Flat(entries) => entries,
            TransactionGroup::Nested(groups) => groups.into_iter().flatten().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            TransactionGroup::Flat(entries) => entries.is_empty(),
            TransactionGroup::Nested(groups) => groups.iter().all(|g| g.is_empty()),
        }
    }
}

impl From<Vec<Transaction>> for TransactionGroup {
    fn from(txns: Vec<Transaction>) -> Self {
        TransactionGroup::Flat(txns.into_iter().map(TransactionInput::from).collect())
    }
}
