//! Execution host for the registries
//!
//! Models the guarantees of the target chain: every state-changing call sees a
//! single `CallContext` (sender, chain id, block timestamp), calls are totally
//! ordered by the caller holding the chain lock, and events only leave a call
//! once it has committed.

pub mod code;

use alloy::primitives::Address;

use crate::identity::IdentityLookup;
use crate::types::RegistryEvent;

pub use code::{Code, CodeHost, ContractWallet};

/// Live context of a call (`msg.sender`, `block.chainid`, `block.timestamp`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub chain_id: u64,
    pub timestamp: u64,
    pub block: u64,
}

/// Block timestamp source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clock {
    /// Wall clock
    System,
    /// Fixed timestamp, advanced explicitly
    Manual(u64),
}

impl Clock {
    pub fn now(&self) -> u64 {
        match self {
            Clock::System => chrono::Utc::now().timestamp().max(0) as u64,
            Clock::Manual(t) => *t,
        }
    }

    /// Move a manual clock to `timestamp`; a system clock switches to manual
    pub fn warp(&mut self, timestamp: u64) {
        *self = Clock::Manual(timestamp);
    }
}

/// A call in flight
///
/// Logic code reads the context and collaborators through this and buffers
/// events into it. The buffer is dropped if the call fails.
pub struct Tx<'a> {
    pub ctx: CallContext,
    pub identity: &'a dyn IdentityLookup,
    pub host: &'a CodeHost,
    events: Vec<RegistryEvent>,
}

impl<'a> Tx<'a> {
    pub fn new(ctx: CallContext, identity: &'a dyn IdentityLookup, host: &'a CodeHost) -> Self {
        Self {
            ctx,
            identity,
            host,
            events: Vec::new(),
        }
    }

    pub fn caller(&self) -> Address {
        self.ctx.caller
    }

    pub fn emit(&mut self, event: RegistryEvent) {
        self.events.push(event);
    }

    #[cfg(test)]
    pub fn events(&self) -> &[RegistryEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<RegistryEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let mut clock = Clock::Manual(1_000);
        assert_eq!(clock.now(), 1_000);
        clock.warp(2_000);
        assert_eq!(clock.now(), 2_000);
    }

    #[test]
    fn test_system_clock_is_recent() {
        // 2024-01-01T00:00:00Z
        assert!(Clock::System.now() > 1_704_067_200);
    }
}
