use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::account::WalletAccount;
use crate::logging::ComponentLogger;
use crate::network::NetworkId;
use crate::wallets::WalletId;

/// Connection state for one wallet. Present in the store only while the
/// wallet is connected; absence from the wallet map *is* the disconnected
/// signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletState {
    pub accounts: Vec<WalletAccount>,
    pub active_account: Option<WalletAccount>,
}

impl WalletState {
    /// Build a fresh state with the first account active.
    pub fn new(accounts: Vec<WalletAccount>) -> Self {
        let active_account = accounts.first().cloned();
        Self {
            accounts,
            active_account,
        }
    }

    /// The WalletState invariant: a non-null active account must appear in
    /// the account list (same address).
    pub fn check_integrity(&self) -> bool {
        match &self.active_account {
            None => true,
            Some(active) => self
                .accounts
                .iter()
                .any(|account| account.address == active.address),
        }
    }
}

/// The whole persisted snapshot. Immutable: every mutation operation is a
/// pure function producing a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub wallets: HashMap<WalletId, WalletState>,
    pub active_wallet: Option<WalletId>,
    pub active_network: NetworkId,
}

impl State {
    pub fn empty(network: NetworkId) -> Self {
        Self {
            wallets: HashMap::new(),
            active_wallet: None,
            active_network: network,
        }
    }

    pub fn wallet(&self, id: WalletId) -> Option<&WalletState> {
        self.wallets.get(&id)
    }

    pub fn active_wallet_state(&self) -> Option<&WalletState> {
        self.active_wallet.and_then(|id| self.wallets.get(&id))
    }

    /// Insert or overwrite the wallet entry and make it the active wallet.
    pub fn add_wallet(&self, id: WalletId, wallet: WalletState) -> State {
        let mut next = self.clone();
        next.wallets.insert(id, wallet);
        next.active_wallet = Some(id);
        next
    }

    /// Delete the entry; a deleted active wallet leaves no active wallet.
    /// No-op when the id is absent.
    pub fn remove_wallet(&self, id: WalletId) -> State {
        if !self.wallets.contains_key(&id) {
            return self.clone();
        }
        let mut next = self.clone();
        next.wallets.remove(&id);
        if next.active_wallet == Some(id) {
            next.active_wallet = None;
        }
        next
    }

    /// Unconditionally set the active wallet field.
    ///
    /// Deliberately does not check that `id` has a connected entry; callers
    /// rely on the lenient behavior, and the manager's construction-time
    /// reconciliation clears dangling references.
    pub fn set_active_wallet(&self, id: Option<WalletId>) -> State {
        let mut next = self.clone();
        next.active_wallet = id;
        next
    }

    /// Make `address` the wallet's active account. No-op unless the wallet
    /// is connected and the address is one of its accounts.
    pub fn set_active_account(&self, id: WalletId, address: &str) -> State {
        let Some(wallet) = self.wallets.get(&id) else {
            return self.clone();
        };
        let Some(account) = wallet
            .accounts
            .iter()
            .find(|account| account.address == address)
        else {
            return self.clone();
        };
        let mut next = self.clone();
        if let Some(entry) = next.wallets.get_mut(&id) {
            entry.active_account = Some(account.clone());
        }
        next
    }

    /// Replace the wallet's account list. No-op when the wallet is not
    /// connected. The previous active account survives if its address is
    /// still present; otherwise the first new account (or nothing) becomes
    /// active.
    pub fn set_accounts(&self, id: WalletId, accounts: Vec<WalletAccount>) -> State {
        if !self.wallets.contains_key(&id) {
            return self.clone();
        }
        let mut next = self.clone();
        if let Some(entry) = next.wallets.get_mut(&id) {
            let retained = entry.active_account.as_ref().and_then(|active| {
                accounts
                    .iter()
                    .find(|account| account.address == active.address)
                    .cloned()
            });
            entry.active_account = retained.or_else(|| accounts.first().cloned());
            entry.accounts = accounts;
        }
        next
    }

    /// Unconditionally set the active network field.
    pub fn set_active_network(&self, network: NetworkId) -> State {
        let mut next = self.clone();
        next.active_network = network;
        next
    }

    /// Structural validation used at load time: every wallet entry must
    /// satisfy the WalletState invariant and the active wallet, if set,
    /// must be a connected entry. (Unrecognized wallet/network identifiers
    /// already fail deserialization.)
    pub fn check_integrity(&self) -> bool {
        if let Some(active) = self.active_wallet {
            if !self.wallets.contains_key(&active) {
                return false;
            }
        }
        self.wallets.values().all(WalletState::check_integrity)
    }
}

type Subscriber = Box<dyn Fn(&State) + Send + Sync>;

/// The single mutable source of truth.
///
/// Holds the current snapshot behind a lock and fans changed snapshots out
/// to subscribers. Mutations are synchronous and atomic; a mutation that
/// leaves the state equal to the previous snapshot notifies nobody.
/// Subscribers run on the mutating call's stack, in application order, and
/// must not call back into the store.
pub struct StateStore {
    snapshot: RwLock<Arc<State>>,
    version: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
    logger: ComponentLogger,
}

impl StateStore {
    pub fn new(initial: State, logger: ComponentLogger) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(initial)),
            version: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
            logger,
        }
    }

    /// The current complete snapshot.
    pub fn snapshot(&self) -> Arc<State> {
        self.snapshot.read().clone()
    }

    /// Monotonic stamp incremented on every applied (changed) mutation.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&State) + Send + Sync + 'static,
    {
        self.subscribers.lock().push(Box::new(subscriber));
    }

    pub fn add_wallet(&self, id: WalletId, wallet: WalletState) {
        self.logger
            .debug(format!("add_wallet {} ({} accounts)", id, wallet.accounts.len()));
        self.apply(|state| state.add_wallet(id, wallet));
    }

    pub fn remove_wallet(&self, id: WalletId) {
        self.logger.debug(format!("remove_wallet {}", id));
        self.apply(|state| state.remove_wallet(id));
    }

    pub fn set_active_wallet(&self, id: Option<WalletId>) {
        self.apply(|state| state.set_active_wallet(id));
    }

    pub fn set_active_account(&self, id: WalletId, address: &str) {
        self.apply(|state| state.set_active_account(id, address));
    }

    pub fn set_accounts(&self, id: WalletId, accounts: Vec<WalletAccount>) {
        self.apply(|state| state.set_accounts(id, accounts));
    }

    pub fn set_active_network(&self, network: NetworkId) {
        self.apply(|state| state.set_active_network(network));
    }

    fn apply<F>(&self, mutate: F)
    where
        F: FnOnce(&State) -> State,
    {
        // The write lock is held across the subscriber fan-out so that
        // notification order always matches application order.
        let mut guard = self.snapshot.write();
        let next = mutate(&guard);
        if next == **guard {
            return;
        }
        *guard = Arc::new(next);
        self.version.fetch_add(1, Ordering::SeqCst);
        let current = guard.clone();
        let subscribers = self.subscribers.lock();
        for subscriber in subscribers.iter() {
            subscriber(&current);
        }
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("state", &*self.snapshot())
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogLevel;
    use std::sync::atomic::AtomicUsize;

    fn account(name: &str, address: &str) -> WalletAccount {
        WalletAccount::new(name, address)
    }

    fn store() -> StateStore {
        StateStore::new(
            State::empty(NetworkId::TestNet),
            ComponentLogger::new("store", LogLevel::Off),
        )
    }

    #[test]
    fn add_wallet_sets_active_wallet() {
        let store = store();
        store.add_wallet(
            WalletId::Injected,
            WalletState::new(vec![account("a1", "addr1")]),
        );
        let state = store.snapshot();
        assert_eq!(state.active_wallet, Some(WalletId::Injected));
        let wallet = state.wallet(WalletId::Injected).unwrap();
        assert_eq!(wallet.active_account.as_ref().unwrap().address, "addr1");
        assert!(wallet.check_integrity());
    }

    #[test]
    fn remove_wallet_clears_active_and_is_idempotent() {
        let store = store();
        store.add_wallet(WalletId::Relay, WalletState::new(vec![account("a", "x")]));
        store.remove_wallet(WalletId::Relay);
        let once = store.snapshot();
        assert!(once.wallets.is_empty());
        assert_eq!(once.active_wallet, None);

        let version = store.version();
        store.remove_wallet(WalletId::Relay);
        let twice = store.snapshot();
        assert_eq!(*once, *twice);
        // Second removal was a no-op: no new version, no notification
        assert_eq!(store.version(), version);
    }

    #[test]
    fn remove_other_wallet_keeps_active() {
        let store = store();
        store.add_wallet(WalletId::Relay, WalletState::new(vec![account("a", "x")]));
        store.add_wallet(WalletId::Kmd, WalletState::new(vec![account("b", "y")]));
        store.remove_wallet(WalletId::Relay);
        let state = store.snapshot();
        assert_eq!(state.active_wallet, Some(WalletId::Kmd));
        assert!(state.wallet(WalletId::Kmd).is_some());
    }

    #[test]
    fn set_active_wallet_is_unvalidated() {
        let store = store();
        store.set_active_wallet(Some(WalletId::Mnemonic));
        // Documented sharp edge: the reference dangles until reconciled
        assert_eq!(store.snapshot().active_wallet, Some(WalletId::Mnemonic));
        assert!(!store.snapshot().check_integrity());
    }

    #[test]
    fn set_active_account_requires_connected_member() {
        let store = store();
        store.add_wallet(
            WalletId::Injected,
            WalletState::new(vec![account("a1", "addr1"), account("a2", "addr2")]),
        );

        store.set_active_account(WalletId::Injected, "addr2");
        assert_eq!(
            store
                .snapshot()
                .wallet(WalletId::Injected)
                .unwrap()
                .active_account
                .as_ref()
                .unwrap()
                .address,
            "addr2"
        );

        let before = store.version();
        store.set_active_account(WalletId::Injected, "addr9");
        store.set_active_account(WalletId::Kmd, "addr1");
        assert_eq!(store.version(), before);
    }

    #[test]
    fn set_accounts_repairs_active_account() {
        let store = store();
        store.add_wallet(
            WalletId::Injected,
            WalletState::new(vec![account("a1", "addr1"), account("a2", "addr2")]),
        );
        store.set_active_account(WalletId::Injected, "addr2");

        // Active account survives when its address is still present
        store.set_accounts(
            WalletId::Injected,
            vec![account("renamed", "addr2"), account("a3", "addr3")],
        );
        let state = store.snapshot();
        let wallet = state.wallet(WalletId::Injected).unwrap();
        assert_eq!(wallet.active_account.as_ref().unwrap().address, "addr2");

        // Otherwise the first new entry takes over
        store.set_accounts(WalletId::Injected, vec![account("a4", "addr4")]);
        let state = store.snapshot();
        let wallet = state.wallet(WalletId::Injected).unwrap();
        assert_eq!(wallet.active_account.as_ref().unwrap().address, "addr4");

        // An empty list leaves no active account
        store.set_accounts(WalletId::Injected, Vec::new());
        let state = store.snapshot();
        let wallet = state.wallet(WalletId::Injected).unwrap();
        assert!(wallet.active_account.is_none());
        assert!(wallet.check_integrity());
    }

    #[test]
    fn set_accounts_on_disconnected_wallet_is_noop() {
        let store = store();
        let before = store.version();
        store.set_accounts(WalletId::Relay, vec![account("a", "x")]);
        assert_eq!(store.version(), before);
        assert!(store.snapshot().wallets.is_empty());
    }

    #[test]
    fn subscribers_observe_mutations_in_order() {
        let store = store();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.subscribe(move |state| {
            sink.lock().push(state.active_network);
        });

        store.set_active_network(NetworkId::LocalNet);
        store.set_active_network(NetworkId::MainNet);
        // Unchanged mutation: no notification
        store.set_active_network(NetworkId::MainNet);

        assert_eq!(
            *seen.lock(),
            vec![NetworkId::LocalNet, NetworkId::MainNet]
        );
    }

    #[test]
    fn noop_mutation_returns_same_snapshot() {
        let store = store();
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        store.remove_wallet(WalletId::Injected);
        assert_eq!(notified.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn integrity_check_rejects_dangling_references() {
        let mut state = State::empty(NetworkId::TestNet);
        assert!(state.check_integrity());

        state.active_wallet = Some(WalletId::Kmd);
        assert!(!state.check_integrity());

        state.active_wallet = None;
        state.wallets.insert(
            WalletId::Kmd,
            WalletState {
                accounts: vec![account("a", "x")],
                active_account: Some(account("ghost", "y")),
            },
        );
        assert!(!state.check_integrity());
    }
}
