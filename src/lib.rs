// lib.rs - Core library structure for flint-connect

pub mod account;
pub mod errors;
pub mod logging;
pub mod manager;
pub mod network;
pub mod node_client;
pub mod persistence;
pub mod secure_key;
pub mod store;
pub mod transactions;
pub mod wallets;

// Re-export common types
pub use account::{address_from_public_key, is_valid_address, validate_address, WalletAccount};
pub use errors::{WalletError, WalletResult};
pub use logging::{ComponentLogger, LogLevel};
pub use manager::{TransactionSigner, WalletManager, WalletManagerOptions};
pub use network::{
    default_network_config, default_network_configs, NetworkConfig, NetworkConfigOverride,
    NetworkId,
};
pub use node_client::NodeClient;
pub use persistence::{
    load_persisted_state, serialize_state, FilePersistence, MemoryPersistence, PersistenceAdapter,
    STORAGE_KEY,
};
pub use secure_key::{with_secure_key, with_secure_key_sync, SecureKeyContainer};
pub use store::{State, StateStore, WalletState};
pub use transactions::{
    decode_any, DecodedTransaction, SignedTransaction, Transaction, TransactionGroup,
    TransactionInput,
};
pub use wallets::{
    EnableResponse, InjectedProvider, InjectedWallet, KmdConfig, KmdWallet, MnemonicWallet,
    MnemonicWalletConfig, RelaySession, RelayTransport, RelayWallet, WalletAdapter, WalletId,
    WireTransaction,
};
