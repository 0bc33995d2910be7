use alloy::primitives::Address;
use anyhow::Result;
use std::env;

use crate::chains;
use crate::wallet::{DevAccounts, KeyMode};

/// Application configuration
///
/// Network-specific settings (canonical registry addresses) are stored in
/// chains.rs and looked up by chain_id at startup. This config holds global
/// settings only.
#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub chain_id: u64,
    pub redis_url: Option<String>,
    /// Unlocked dev accounts (mnemonic or private key list)
    pub dev_accounts: DevAccounts,
    /// Owner of both registry proxies; defaults to dev account 0
    pub registry_owner: Address,
    /// API key for service-to-service authentication (optional)
    pub api_key: Option<String>,
    /// Admin API key for upgrades and ownership changes (admin routes disabled when unset)
    pub admin_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Initialize dev accounts from environment
        let dev_accounts = DevAccounts::from_env()?;

        let chain_id: u64 = env::var("CHAIN_ID")
            .unwrap_or_else(|_| "31337".to_string())
            .parse()?;
        if chains::get_chain(chain_id).is_none() {
            anyhow::bail!(
                "Unsupported CHAIN_ID {} (known: {:?})",
                chain_id,
                chains::supported_chain_ids()
            );
        }

        let registry_owner = match env::var("REGISTRY_OWNER") {
            Ok(owner) => owner
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid REGISTRY_OWNER: {}", e))?,
            Err(_) => dev_accounts
                .first()
                .ok_or_else(|| anyhow::anyhow!("REGISTRY_OWNER required when no dev accounts are configured"))?,
        };

        Ok(Self {
            // APP_PORT takes precedence over PORT
            port: env::var("APP_PORT")
                .or_else(|_| env::var("PORT"))
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,

            chain_id,

            // Redis for the event journal (optional, falls back to in-memory)
            redis_url: env::var("REDIS_URL").ok(),

            dev_accounts,

            registry_owner,

            // API key for service-to-service auth (if set, all requests must include X-API-Key header)
            api_key: env::var("API_KEY").ok(),

            // Admin API key for upgrades and ownership changes
            admin_api_key: env::var("ADMIN_API_KEY").ok(),
        })
    }

    /// Get the dev account key mode
    pub fn key_mode(&self) -> &KeyMode {
        &self.dev_accounts.mode
    }
}
