use alloy::primitives::{Address, FixedBytes, B256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::reputation::ReputationLogic;
use crate::upgrade::RegistryCore;
use crate::validation::ValidationLogic;

/// Contract account that validates signatures through the ERC-1271 callback
pub trait ContractWallet: Send + Sync {
    /// Returns the ERC-1271 magic value when `signature` is valid for `hash`
    fn is_valid_signature(&self, hash: B256, signature: &[u8]) -> FixedBytes<4>;
}

/// Executable code deployed at an address
#[derive(Clone)]
pub enum Code {
    Wallet(Arc<dyn ContractWallet>),
    Reputation(Arc<dyn ReputationLogic>),
    Validation(Arc<dyn ValidationLogic>),
}

impl Code {
    pub fn kind(&self) -> &'static str {
        match self {
            Code::Wallet(_) => "wallet",
            Code::Reputation(_) => "reputation_implementation",
            Code::Validation(_) => "validation_implementation",
        }
    }
}

struct Account {
    code: Code,
    /// Storage of an implementation code unit when called directly, not through a proxy
    own_storage: Option<RegistryCore>,
}

/// Address → code table of the host chain
#[derive(Default)]
pub struct CodeHost {
    accounts: HashMap<Address, Account>,
    nonces: HashMap<Address, u64>,
}

impl CodeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume `deployer`'s next nonce and return the CREATE address it yields
    pub fn reserve(&mut self, deployer: Address) -> Address {
        let nonce = self.nonces.entry(deployer).or_insert(0);
        let address = deployer.create(*nonce);
        *nonce += 1;
        address
    }

    /// Deploy `code` at the CREATE address of `deployer`'s next nonce
    pub fn deploy(&mut self, deployer: Address, code: Code) -> Address {
        let address = self.reserve(deployer);
        self.install(address, code);
        address
    }

    /// Place `code` at a fixed address
    ///
    /// Implementation code units get their own storage with initializers
    /// permanently disabled, so they can never be initialized directly.
    pub fn install(&mut self, address: Address, code: Code) {
        let own_storage = match code {
            Code::Reputation(_) | Code::Validation(_) => Some(RegistryCore::disabled()),
            Code::Wallet(_) => None,
        };

        debug!("Installed {} code at {:?}", code.kind(), address);
        self.accounts.insert(address, Account { code, own_storage });
    }

    pub fn has_code(&self, address: Address) -> bool {
        self.accounts.contains_key(&address)
    }

    pub fn code(&self, address: Address) -> Option<&Code> {
        self.accounts.get(&address).map(|a| &a.code)
    }

    pub fn wallet(&self, address: Address) -> Option<&dyn ContractWallet> {
        match self.code(address) {
            Some(Code::Wallet(wallet)) => Some(wallet.as_ref()),
            _ => None,
        }
    }

    /// Storage of a code unit when it is called directly
    pub fn own_storage(&self, address: Address) -> Option<&RegistryCore> {
        self.accounts
            .get(&address)
            .and_then(|a| a.own_storage.as_ref())
    }

    pub fn own_storage_mut(&mut self, address: Address) -> Option<&mut RegistryCore> {
        self.accounts
            .get_mut(&address)
            .and_then(|a| a.own_storage.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reputation::ReputationRegistryV1;

    #[test]
    fn test_deploy_uses_create_addresses() {
        let mut host = CodeHost::new();
        let deployer = Address::repeat_byte(0x01);

        let first = host.deploy(deployer, Code::Reputation(Arc::new(ReputationRegistryV1)));
        let second = host.deploy(deployer, Code::Reputation(Arc::new(ReputationRegistryV1)));

        assert_eq!(first, deployer.create(0));
        assert_eq!(second, deployer.create(1));
        assert!(host.has_code(first));
        assert!(host.has_code(second));
        assert!(!host.has_code(deployer));

        // A reserved address consumes a nonce without placing code
        let reserved = host.reserve(deployer);
        assert_eq!(reserved, deployer.create(2));
        assert!(!host.has_code(reserved));
    }

    #[test]
    fn test_implementation_storage_is_disabled_at_deploy() {
        let mut host = CodeHost::new();
        let address = host.deploy(
            Address::repeat_byte(0x01),
            Code::Reputation(Arc::new(ReputationRegistryV1)),
        );

        let storage = host.own_storage(address).unwrap();
        assert!(storage.init.is_disabled());
        assert!(host.own_storage(Address::repeat_byte(0x01)).is_none());
    }
}
