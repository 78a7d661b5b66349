use futures::future::BoxFuture;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::errors::{WalletError, WalletResult};

/// Scoped-access wrapper around one owned copy of raw private-key bytes.
///
/// The container copies the caller's buffer on construction and never
/// references it again. Its lifecycle is `live -> cleared`, one way:
/// clearing overwrites every byte (randomize, then a volatile zero pass)
/// and any later access fails with [`WalletError::KeyCleared`]. Clearing
/// twice is a safe no-op.
///
/// Direct `use_key`/`use_key_sync` calls clear only when the callback
/// errors. One-shot signing must go through [`with_secure_key`] /
/// [`with_secure_key_sync`], which clear unconditionally after the
/// callback regardless of outcome.
pub struct SecureKeyContainer {
    bytes: Vec<u8>,
    cleared: bool,
}

impl SecureKeyContainer {
    pub fn new(key: &[u8]) -> Self {
        Self {
            bytes: key.to_vec(),
            cleared: false,
        }
    }

    pub fn is_cleared(&self) -> bool {
        self.cleared
    }

    /// Grant the callback bounded read access to the live key bytes.
    ///
    /// The container clears itself if the callback errors; on success it
    /// stays live for further use within the owning scope.
    pub fn use_key_sync<T, F>(&mut self, op: F) -> WalletResult<T>
    where
        F: FnOnce(&[u8]) -> WalletResult<T>,
    {
        if self.cleared {
            return Err(WalletError::KeyCleared);
        }
        match op(&self.bytes) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.clear();
                Err(err)
            }
        }
    }

    /// Async variant of [`use_key_sync`](Self::use_key_sync); the callback
    /// borrows the key bytes for the duration of the returned future.
    pub async fn use_key<T, F>(&mut self, op: F) -> WalletResult<T>
    where
        F: for<'a> FnOnce(&'a [u8]) -> BoxFuture<'a, WalletResult<T>>,
    {
        if self.cleared {
            return Err(WalletError::KeyCleared);
        }
        match op(&self.bytes).await {
            Ok(value) => Ok(value),
            Err(err) => {
                self.clear();
                Err(err)
            }
        }
    }

    /// Overwrite the key material and mark the container cleared.
    ///
    /// Writes random bytes first, then zeroes through `zeroize` so the
    /// final pass survives dead-store elimination. Idempotent.
    pub fn clear(&mut self) {
        if self.cleared {
            return;
        }
        OsRng.fill_bytes(&mut self.bytes);
        self.bytes.zeroize();
        self.cleared = true;
    }
}

impl Drop for SecureKeyContainer {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for SecureKeyContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureKeyContainer")
            .field("cleared", &self.cleared)
            .finish_non_exhaustive()
    }
}

/// Run one synchronous operation against key material, clearing on every
/// exit path. This is the required top-level pattern for one-shot signing.
pub fn with_secure_key_sync<T, F>(key: &[u8], op: F) -> WalletResult<T>
where
    F: FnOnce(&[u8]) -> WalletResult<T>,
{
    let mut container = SecureKeyContainer::new(key);
    let result = container.use_key_sync(op);
    container.clear();
    result
}

/// Async counterpart of [`with_secure_key_sync`]: the container is cleared
/// after the callback's future resolves, on success and on error alike.
pub async fn with_secure_key<T, F>(key: &[u8], op: F) -> WalletResult<T>
where
    F: for<'a> FnOnce(&'a [u8]) -> BoxFuture<'a, WalletResult<T>>,
{
    let mut container = SecureKeyContainer::new(key);
    let result = container.use_key(op).await;
    container.clear();
    result
}
