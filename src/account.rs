use ed25519_dalek::VerifyingKey;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{WalletError, WalletResult};

/// Flint addresses are the lowercase hex encoding of an ed25519 public key
/// behind a fixed prefix.
pub const ADDRESS_PREFIX: &str = "fl";
const ADDRESS_HEX_LEN: usize = 64;

static ADDRESS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^fl[0-9a-f]{64}$").expect("address regex must compile"));

/// One account exposed by a connected wallet.
///
/// `address` is the stable identity within a wallet's account list; `name`
/// is a display label with no uniqueness requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAccount {
    pub name: String,
    pub address: String,
}

impl WalletAccount {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// Render the canonical address for an ed25519 public key.
pub fn address_from_public_key(key: &VerifyingKey) -> String {
    format!("{}{}", ADDRESS_PREFIX, hex::encode(key.to_bytes()))
}

pub fn is_valid_address(address: &str) -> bool {
    ADDRESS_PATTERN.is_match(address)
}

/// Validate a Flint address string.
pub fn validate_address(address: &str) -> WalletResult<()> {
    if address.is_empty() {
        return Err(WalletError::InvalidAddress(
            "Address cannot be empty".to_string(),
        ));
    }

    if address.len() != ADDRESS_PREFIX.len() + ADDRESS_HEX_LEN {
        return Err(WalletError::InvalidAddress(format!(
            "Address must be {} characters",
            ADDRESS_PREFIX.len() + ADDRESS_HEX_LEN
        )));
    }

    if !ADDRESS_PATTERN.is_match(address) {
        return Err(WalletError::InvalidAddress(
            "Address format is invalid".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    #[test]
    fn derived_address_round_trips_validation() {
        let key = SigningKey::from_bytes(&[7u8; 32]);
        let address = address_from_public_key(&key.verifying_key());
        assert!(address.starts_with(ADDRESS_PREFIX));
        assert!(is_valid_address(&address));
        validate_address(&address).expect("derived address must validate");
    }

    #[test]
    fn malformed_addresses_rejected() {
        assert!(validate_address("").is_err());
        assert!(validate_address("fl1234").is_err());
        // Uppercase hex is not canonical
        let upper = format!("fl{}", "A".repeat(64));
        assert!(validate_address(&upper).is_err());
        // Wrong prefix
        let wrong = format!("fx{}", "a".repeat(64));
        assert!(validate_address(&wrong).is_err());
    }

    #[test]
    fn account_holds_name_and_address() {
        let account = WalletAccount::new("Main", format!("fl{}", "0".repeat(64)));
        assert_eq!(account.name, "Main");
        assert!(is_valid_address(&account.address));
    }
}
