//! Upgrade guard
//!
//! A [`Proxy`] owns a registry's storage and a single-slot pointer to the
//! implementation code that runs against it. Two independent flags govern
//! initialization: every code unit's own storage is disabled at deploy time
//! ([`Initializable::disabled`]), and every proxy's storage is initialized
//! exactly once through [`Proxy::initialize`].

use alloy::primitives::{b256, Address, B256};
use std::sync::Arc;
use tracing::{info, warn};

use crate::runtime::{Code, CodeHost, Tx};
use crate::types::{RegistryError, RegistryEvent};

/// `bytes32(uint256(keccak256("eip1967.proxy.implementation")) - 1)`
pub const IMPLEMENTATION_SLOT: B256 =
    b256!("360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc");

/// Monotonic initialization counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Initializable {
    initialized: u64,
}

impl Initializable {
    /// Permanently locked: no initializer or reinitializer can run
    pub fn disabled() -> Self {
        Self {
            initialized: u64::MAX,
        }
    }

    pub fn version(&self) -> u64 {
        self.initialized
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized > 0
    }

    pub fn is_disabled(&self) -> bool {
        self.initialized == u64::MAX
    }

    /// First initialization, version 1
    pub fn initializer(&mut self) -> Result<u64, RegistryError> {
        if self.initialized != 0 {
            return Err(RegistryError::AlreadyInitialized);
        }
        self.initialized = 1;
        Ok(1)
    }

    /// Move to `version`, which must be greater than the current one
    pub fn reinitializer(&mut self, version: u64) -> Result<u64, RegistryError> {
        if version == u64::MAX || self.initialized >= version {
            return Err(RegistryError::AlreadyInitialized);
        }
        self.initialized = version;
        Ok(version)
    }
}

/// Storage shared by every registry: initializer state, owner and the bound identity registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryCore {
    pub init: Initializable,
    pub owner: Address,
    pub identity_registry: Address,
}

impl RegistryCore {
    pub fn disabled() -> Self {
        Self {
            init: Initializable::disabled(),
            ..Self::default()
        }
    }

    /// One-time setup: the caller becomes the owner
    pub fn initialize(
        &mut self,
        tx: &mut Tx,
        identity_registry: Address,
    ) -> Result<(), RegistryError> {
        if identity_registry.is_zero() {
            return Err(RegistryError::InvalidAddress(
                "identity registry must not be zero".to_string(),
            ));
        }

        let version = self.init.initializer()?;
        self.owner = tx.caller();
        self.identity_registry = identity_registry;

        tx.emit(RegistryEvent::OwnershipTransferred {
            previous_owner: Address::ZERO,
            new_owner: self.owner,
        });
        tx.emit(RegistryEvent::Initialized { version });
        Ok(())
    }

    pub fn require_initialized(&self) -> Result<(), RegistryError> {
        if !self.init.is_initialized() || self.init.is_disabled() {
            return Err(RegistryError::NotInitialized);
        }
        Ok(())
    }

    pub fn require_owner(&self, caller: Address) -> Result<(), RegistryError> {
        if self.owner.is_zero() || caller != self.owner {
            return Err(RegistryError::UpgradeUnauthorized(caller));
        }
        Ok(())
    }

    pub fn transfer_ownership(&mut self, tx: &mut Tx, new_owner: Address) -> Result<(), RegistryError> {
        self.require_owner(tx.caller())?;
        if new_owner.is_zero() {
            return Err(RegistryError::InvalidOwner(new_owner));
        }

        let previous_owner = self.owner;
        self.owner = new_owner;
        tx.emit(RegistryEvent::OwnershipTransferred {
            previous_owner,
            new_owner,
        });
        Ok(())
    }

    /// Drop ownership for good; upgrades become impossible
    pub fn renounce_ownership(&mut self, tx: &mut Tx) -> Result<(), RegistryError> {
        self.require_owner(tx.caller())?;

        let previous_owner = self.owner;
        self.owner = Address::ZERO;
        tx.emit(RegistryEvent::OwnershipTransferred {
            previous_owner,
            new_owner: Address::ZERO,
        });
        Ok(())
    }
}

/// Code that can be placed behind a proxy holding storage `S`
pub trait Implementation<S>: Send + Sync {
    fn version(&self) -> &'static str;

    /// Storage layout generation; a migration reinitializes to this version
    fn storage_version(&self) -> u64 {
        1
    }

    /// ERC-1822 proxiable UUID; must equal the ERC-1967 implementation slot
    fn proxiable_uuid(&self) -> B256 {
        IMPLEMENTATION_SLOT
    }

    /// One-shot post-upgrade call
    fn migrate(&self, _storage: &mut S, _tx: &mut Tx) -> Result<(), RegistryError> {
        Ok(())
    }
}

/// Registry storage kept behind a proxy
pub trait ProxyStorage: Clone + Default + Send + Sync + 'static {
    type Logic: ?Sized + Implementation<Self>;

    /// The logic for this storage, if `code` provides it
    fn resolve(code: &Code) -> Option<Arc<Self::Logic>>;

    fn core(&self) -> &RegistryCore;

    fn core_mut(&mut self) -> &mut RegistryCore;
}

/// Storage-bearing instance with a mutable implementation pointer
#[derive(Clone)]
pub struct Proxy<S: ProxyStorage> {
    address: Address,
    implementation: Address,
    storage: S,
}

impl<S: ProxyStorage> Proxy<S> {
    /// Create a proxy pointing at `implementation`, which must already be deployed
    pub fn deploy(
        host: &CodeHost,
        address: Address,
        implementation: Address,
    ) -> Result<Self, RegistryError> {
        check_target::<S>(host, implementation)?;

        Ok(Self {
            address,
            implementation,
            storage: S::default(),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn implementation(&self) -> Address {
        self.implementation
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Resolve the current implementation's logic
    pub fn logic(&self, host: &CodeHost) -> Result<Arc<S::Logic>, RegistryError> {
        host.code(self.implementation)
            .and_then(S::resolve)
            .ok_or_else(|| {
                RegistryError::Internal(format!(
                    "implementation {:?} is missing",
                    self.implementation
                ))
            })
    }

    /// Logic plus mutable storage for a ledger call; refuses uninitialized instances
    pub fn dispatch_mut(
        &mut self,
        host: &CodeHost,
    ) -> Result<(Arc<S::Logic>, &mut S), RegistryError> {
        let logic = self.logic(host)?;
        self.storage.core().require_initialized()?;
        Ok((logic, &mut self.storage))
    }

    /// Logic plus storage for a read
    pub fn dispatch(&self, host: &CodeHost) -> Result<(Arc<S::Logic>, &S), RegistryError> {
        let logic = self.logic(host)?;
        self.storage.core().require_initialized()?;
        Ok((logic, &self.storage))
    }

    pub fn initialize(&mut self, tx: &mut Tx, identity_registry: Address) -> Result<(), RegistryError> {
        self.storage.core_mut().initialize(tx, identity_registry)?;
        info!(
            "Proxy {:?} initialized (owner {:?}, identity registry {:?})",
            self.address,
            tx.caller(),
            identity_registry
        );
        Ok(())
    }

    pub fn transfer_ownership(&mut self, tx: &mut Tx, new_owner: Address) -> Result<(), RegistryError> {
        self.storage.core_mut().transfer_ownership(tx, new_owner)
    }

    pub fn renounce_ownership(&mut self, tx: &mut Tx) -> Result<(), RegistryError> {
        self.storage.core_mut().renounce_ownership(tx)
    }

    /// Repoint the proxy, optionally running the new code's migration
    ///
    /// All-or-nothing: the migration runs against a staged copy of the
    /// storage, and the pointer and storage are swapped only if it succeeds.
    pub fn upgrade_to_and_call(
        &mut self,
        tx: &mut Tx,
        new_implementation: Address,
        migrate: bool,
    ) -> Result<(), RegistryError> {
        if let Err(e) = self.storage.core().require_owner(tx.caller()) {
            warn!(
                "Rejected upgrade of {:?} by non-owner {:?}",
                self.address,
                tx.caller()
            );
            return Err(e);
        }

        let logic = check_target::<S>(tx.host, new_implementation)?;

        let mut staged = None;
        if migrate {
            let mut storage = self.storage.clone();
            let version = storage.core_mut().init.reinitializer(logic.storage_version())?;
            logic.migrate(&mut storage, tx)?;
            staged = Some((storage, version));
        }

        let previous = self.implementation;
        self.implementation = new_implementation;
        tx.emit(RegistryEvent::Upgraded {
            implementation: new_implementation,
        });

        if let Some((storage, version)) = staged {
            self.storage = storage;
            tx.emit(RegistryEvent::Initialized { version });
        }

        info!(
            "Proxy {:?} upgraded {:?} -> {:?} (version {})",
            self.address,
            previous,
            new_implementation,
            logic.version()
        );
        Ok(())
    }
}

/// Validate an implementation target: non-zero, has code, speaks this storage, UUPS-compatible
fn check_target<S: ProxyStorage>(
    host: &CodeHost,
    target: Address,
) -> Result<Arc<S::Logic>, RegistryError> {
    if target.is_zero() {
        return Err(RegistryError::UpgradeZeroAddress);
    }

    let code = host
        .code(target)
        .ok_or(RegistryError::UpgradeNotContract(target))?;

    let logic = S::resolve(code).ok_or(RegistryError::UpgradeIncompatible(target))?;
    if logic.proxiable_uuid() != IMPLEMENTATION_SLOT {
        return Err(RegistryError::UpgradeIncompatible(target));
    }

    Ok(logic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::keccak256;
    use alloy::primitives::U256;

    #[test]
    fn test_implementation_slot_constant() {
        let slot = U256::from_be_bytes(keccak256("eip1967.proxy.implementation").0) - U256::from(1);
        assert_eq!(B256::from(slot), IMPLEMENTATION_SLOT);
    }

    #[test]
    fn test_initializer_runs_once() {
        let mut init = Initializable::default();
        assert!(!init.is_initialized());
        assert_eq!(init.initializer(), Ok(1));
        assert_eq!(init.initializer(), Err(RegistryError::AlreadyInitialized));
    }

    #[test]
    fn test_reinitializer_is_monotonic() {
        let mut init = Initializable::default();
        init.initializer().unwrap();
        assert_eq!(init.reinitializer(1), Err(RegistryError::AlreadyInitialized));
        assert_eq!(init.reinitializer(3), Ok(3));
        assert_eq!(init.reinitializer(2), Err(RegistryError::AlreadyInitialized));
        assert_eq!(init.version(), 3);
    }

    #[test]
    fn test_disabled_rejects_everything() {
        let mut init = Initializable::disabled();
        assert_eq!(init.initializer(), Err(RegistryError::AlreadyInitialized));
        assert_eq!(init.reinitializer(2), Err(RegistryError::AlreadyInitialized));
        assert!(init.is_disabled());
    }

    #[test]
    fn test_disabled_core_is_not_usable() {
        let core = RegistryCore::disabled();
        assert_eq!(core.require_initialized(), Err(RegistryError::NotInitialized));
        assert_eq!(
            core.require_owner(Address::ZERO),
            Err(RegistryError::UpgradeUnauthorized(Address::ZERO))
        );
    }
}
