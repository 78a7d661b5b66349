use blake3::Hasher as Blake3;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::WalletResult;
use crate::logging::ComponentLogger;
use crate::network::NetworkId;
use crate::store::State;

/// Fixed key the whole session snapshot is persisted under.
pub const STORAGE_KEY: &str = "flint-connect:session";

const STATE_VERSION: u16 = 1;

/// External key/value capability the session state survives reloads
/// through. Implementations map onto whatever medium the host application
/// has (browser storage, a settings file, a database row).
pub trait PersistenceAdapter: Send + Sync {
    fn get_item(&self, key: &str) -> WalletResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> WalletResult<()>;
}

/// In-memory adapter; the default when the host supplies none, and the
/// workhorse of the test suite.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceAdapter for MemoryPersistence {
    fn get_item(&self, key: &str) -> WalletResult<Option<String>> {
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> WalletResult<()> {
        self.items.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// File-backed adapter: each key becomes one JSON document in the base
/// directory, written atomically (temp file, fsync, rename).
#[derive(Debug, Clone)]
pub struct FilePersistence {
    base_dir: PathBuf,
}

impl FilePersistence {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys carry a namespace separator; keep file names flat
        let file_name: String = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.base_dir.join(format!("{}.json", file_name))
    }
}

impl PersistenceAdapter for FilePersistence {
    fn get_item(&self, key: &str) -> WalletResult<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn set_item(&self, key: &str, value: &str) -> WalletResult<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("new");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(tmp_path, path)?;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StateEnvelope {
    version: u16,
    checksum: [u8; 32],
    saved_at: DateTime<Utc>,
    payload: State,
}

fn checksum(state: &State) -> [u8; 32] {
    let mut hasher = Blake3::new();
    let encoded = serde_json::to_vec(state).expect("state serialization must succeed");
    hasher.update(&encoded);
    let mut output = [0u8; 32];
    output.copy_from_slice(hasher.finalize().as_bytes());
    output
}

/// Serialize a snapshot into the versioned, checksummed envelope document.
pub fn serialize_state(state: &State) -> WalletResult<String> {
    let envelope = StateEnvelope {
        version: STATE_VERSION,
        checksum: checksum(state),
        saved_at: Utc::now(),
        payload: state.clone(),
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Load the persisted snapshot, falling back to the default state seeded
/// with `default_network` on any failure: missing document, JSON error,
/// version or checksum mismatch, or structural invariant violation. A bad
/// document is discarded wholesale, never partially repaired, and no error
/// propagates past this boundary.
pub fn load_persisted_state(
    adapter: &dyn PersistenceAdapter,
    key: &str,
    default_network: NetworkId,
    logger: &ComponentLogger,
) -> State {
    let document = match adapter.get_item(key) {
        Ok(Some(document)) => document,
        Ok(None) => return State::empty(default_network),
        Err(err) => {
            logger.warn(format!("Failed to read persisted state: {}", err));
            return State::empty(default_network);
        }
    };

    let envelope: StateEnvelope = match serde_json::from_str(&document) {
        Ok(envelope) => envelope,
        Err(err) => {
            logger.warn(format!("Discarding unreadable persisted state: {}", err));
            return State::empty(default_network);
        }
    };

    if envelope.version != STATE_VERSION {
        logger.warn(format!(
            "Discarding persisted state with unsupported version {}",
            envelope.version
        ));
        return State::empty(default_network);
    }

    if checksum(&envelope.payload) != envelope.checksum {
        logger.warn("Discarding persisted state: integrity verification failed");
        return State::empty(default_network);
    }

    if !envelope.payload.check_integrity() {
        logger.warn("Discarding persisted state: structural validation failed");
        return State::empty(default_network);
    }

    envelope.payload
}
