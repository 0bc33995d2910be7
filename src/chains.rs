use alloy::primitives::Address;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Network profile the devnet can impersonate
///
/// Registry addresses are the canonical deployments on that network. The
/// devnet installs its registries at these addresses so capabilities signed
/// for the real network bind to the same `identityRegistry`.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: &'static str,
    pub identity_address: Option<&'static str>,
    pub reputation_address: Option<&'static str>,
    pub validation_address: Option<&'static str>,
    pub is_testnet: bool,
}

impl ChainConfig {
    pub fn identity(&self) -> Option<Address> {
        self.identity_address.and_then(|a| a.parse().ok())
    }

    pub fn reputation(&self) -> Option<Address> {
        self.reputation_address.and_then(|a| a.parse().ok())
    }

    pub fn validation(&self) -> Option<Address> {
        self.validation_address.and_then(|a| a.parse().ok())
    }

    /// Check if this network has a canonical identity registry
    pub fn has_registry(&self) -> bool {
        self.identity_address.is_some()
    }
}

/// Static registry of all known networks
pub static CHAINS: LazyLock<HashMap<u64, ChainConfig>> = LazyLock::new(|| {
    let chains = vec![
        // ===== LOCAL =====
        ChainConfig {
            chain_id: 31337,
            name: "devnet",
            identity_address: None,
            reputation_address: None,
            validation_address: None,
            is_testnet: true,
        },
        // ===== MAINNETS =====
        ChainConfig {
            chain_id: 8453,
            name: "base",
            identity_address: Some("0x8004A169FB4a3325136EB29fA0ceB6D2e539a432"),
            reputation_address: Some("0x8004BAa17C55a88189AE136b182e5fdA19dE9b63"),
            validation_address: None,
            is_testnet: false,
        },
        ChainConfig {
            chain_id: 1,
            name: "ethereum",
            identity_address: Some("0x8004A169FB4a3325136EB29fA0ceB6D2e539a432"),
            reputation_address: Some("0x8004BAa17C55a88189AE136b182e5fdA19dE9b63"),
            validation_address: None,
            is_testnet: false,
        },
        // ===== TESTNETS =====
        ChainConfig {
            chain_id: 84532,
            name: "base-sepolia",
            identity_address: Some("0x8004A818BFB912233c491871b3d84c89A494BD9e"),
            reputation_address: Some("0x8004B663056A597Dffe9eCcC1965A193B7388713"),
            validation_address: None,
            is_testnet: true,
        },
        ChainConfig {
            chain_id: 11155111,
            name: "sepolia",
            identity_address: Some("0x8004A818BFB912233c491871b3d84c89A494BD9e"),
            reputation_address: Some("0x8004B663056A597Dffe9eCcC1965A193B7388713"),
            validation_address: None,
            is_testnet: true,
        },
    ];

    chains.into_iter().map(|c| (c.chain_id, c)).collect()
});

/// Get chain config by chain ID
pub fn get_chain(chain_id: u64) -> Option<&'static ChainConfig> {
    CHAINS.get(&chain_id)
}

/// List all supported chain IDs, ascending
pub fn supported_chain_ids() -> Vec<u64> {
    let mut ids: Vec<u64> = CHAINS.keys().copied().collect();
    ids.sort_unstable();
    ids
}

/// Chains with canonical registry deployments, ascending by id
pub fn chains_with_registry() -> Vec<&'static ChainConfig> {
    let mut chains: Vec<&ChainConfig> = CHAINS.values().filter(|c| c.has_registry()).collect();
    chains.sort_unstable_by_key(|c| c.chain_id);
    chains
}
