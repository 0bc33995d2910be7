//! Dev account keyring
//!
//! The devnet impersonates callers by address, but signing capabilities needs
//! real keys. Supports two key modes:
//! - `mnemonic`: derive `DEV_ACCOUNT_COUNT` accounts from MNEMONIC (defaults
//!   to the standard test mnemonic)
//! - `private_keys`: comma-separated DEV_PRIVATE_KEYS

use alloy::primitives::Address;
use alloy::signers::local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner};
use std::env;
use tracing::info;

/// Standard development mnemonic (DO NOT USE IN PRODUCTION)
pub const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";

const DEFAULT_ACCOUNT_COUNT: u32 = 10;

/// Key mode for keyring initialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMode {
    /// Derive from MNEMONIC
    Mnemonic,
    /// Use DEV_PRIVATE_KEYS directly
    PrivateKeys,
    /// No dev accounts; signing endpoints disabled
    None,
}

impl KeyMode {
    /// Detect key mode from environment
    pub fn from_env() -> Self {
        // Check for explicit mode override
        if let Ok(mode) = env::var("KEY_MODE") {
            match mode.to_lowercase().as_str() {
                "mnemonic" => return KeyMode::Mnemonic,
                "private_keys" | "private_key" | "keys" => return KeyMode::PrivateKeys,
                "none" | "off" => return KeyMode::None,
                _ => {} // Fall through to auto-detect
            }
        }

        if env::var("DEV_PRIVATE_KEYS").is_ok() && env::var("MNEMONIC").is_err() {
            KeyMode::PrivateKeys
        } else {
            KeyMode::Mnemonic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyMode::Mnemonic => "mnemonic",
            KeyMode::PrivateKeys => "private_keys",
            KeyMode::None => "none",
        }
    }
}

/// Unlocked accounts the devnet can sign with
#[derive(Clone)]
pub struct DevAccounts {
    pub mode: KeyMode,
    signers: Vec<PrivateKeySigner>,
}

impl DevAccounts {
    /// Initialize from environment variables
    ///
    /// - `KEY_MODE`: Optional. "mnemonic", "private_keys" or "none". Auto-detects if not set.
    /// - `MNEMONIC`: BIP-39 phrase. Default: the standard test mnemonic.
    /// - `DEV_ACCOUNT_COUNT`: Accounts to derive in mnemonic mode. Default: 10.
    /// - `DEV_PRIVATE_KEYS`: Comma-separated hex keys for private_keys mode.
    pub fn from_env() -> anyhow::Result<Self> {
        let mode = KeyMode::from_env();

        let accounts = match mode {
            KeyMode::Mnemonic => {
                let phrase = env::var("MNEMONIC").unwrap_or_else(|_| TEST_MNEMONIC.to_string());
                let count: u32 = env::var("DEV_ACCOUNT_COUNT")
                    .unwrap_or_else(|_| DEFAULT_ACCOUNT_COUNT.to_string())
                    .parse()?;
                Self::from_mnemonic(&phrase, count)?
            }
            KeyMode::PrivateKeys => {
                let keys = env::var("DEV_PRIVATE_KEYS").map_err(|_| {
                    anyhow::anyhow!("DEV_PRIVATE_KEYS env var required for private_keys mode")
                })?;
                let keys: Vec<&str> = keys.split(',').map(str::trim).filter(|k| !k.is_empty()).collect();
                Self::from_private_keys(&keys)?
            }
            KeyMode::None => Self::none(),
        };

        info!(
            "Dev accounts initialized (mode: {}, accounts: {})",
            accounts.mode.as_str(),
            accounts.len()
        );
        Ok(accounts)
    }

    /// Derive accounts `0..count` on the standard Ethereum path m/44'/60'/0'/0/{index}
    pub fn from_mnemonic(phrase: &str, count: u32) -> anyhow::Result<Self> {
        let signers = (0..count)
            .map(|index| {
                MnemonicBuilder::<English>::default()
                    .phrase(phrase)
                    .index(index)
                    .map_err(|e| anyhow::anyhow!("Invalid derivation index: {}", e))?
                    .build()
                    .map_err(|e| anyhow::anyhow!("Failed to derive from mnemonic: {}", e))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            mode: KeyMode::Mnemonic,
            signers,
        })
    }

    pub fn from_private_keys(keys: &[&str]) -> anyhow::Result<Self> {
        let signers = keys
            .iter()
            .map(|key| {
                let key = key.strip_prefix("0x").unwrap_or(key);
                key.parse::<PrivateKeySigner>()
                    .map_err(|e| anyhow::anyhow!("Invalid private key: {}", e))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            mode: KeyMode::PrivateKeys,
            signers,
        })
    }

    pub fn none() -> Self {
        Self {
            mode: KeyMode::None,
            signers: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.signers.iter().map(|s| s.address()).collect()
    }

    /// Account 0, the default registry owner
    pub fn first(&self) -> Option<Address> {
        self.signers.first().map(|s| s.address())
    }

    /// Signer for an unlocked address
    pub fn signer(&self, address: Address) -> Option<&PrivateKeySigner> {
        self.signers.iter().find(|s| s.address() == address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_from_mnemonic() {
        let accounts = DevAccounts::from_mnemonic(TEST_MNEMONIC, 3).unwrap();

        assert_eq!(accounts.len(), 3);
        assert_eq!(
            format!("{:?}", accounts.first().unwrap()).to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert_eq!(
            format!("{:?}", accounts.addresses()[1]).to_lowercase(),
            "0x70997970c51812dc3a010c7d01b50e0d17dc79c8"
        );
    }

    #[test]
    fn test_from_private_keys() {
        // Known test key
        let accounts = DevAccounts::from_private_keys(&[
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        ])
        .unwrap();

        let address = accounts.first().unwrap();
        assert_eq!(
            format!("{:?}", address).to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert!(accounts.signer(address).is_some());
        assert!(accounts.signer(Address::ZERO).is_none());
    }

    #[test]
    fn test_invalid_private_key() {
        assert!(DevAccounts::from_private_keys(&["0x1234"]).is_err());
    }

    #[test]
    fn test_key_mode_names() {
        assert_eq!(KeyMode::PrivateKeys.as_str(), "private_keys");
        assert_eq!(KeyMode::Mnemonic.as_str(), "mnemonic");
        assert_eq!(KeyMode::None.as_str(), "none");
        assert!(DevAccounts::none().is_empty());
    }
}
