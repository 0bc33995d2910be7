//! Identity registry (ERC-721 style agent ownership)
//!
//! The reputation and validation registries only read ownership through
//! [`IdentityLookup`]. [`IdentityRegistry`] is the in-memory registry the
//! devnet hosts; it is a plain id → owner table with per-id URI, metadata and
//! approvals.

use alloy::primitives::{Address, Bytes, U256};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::types::{AgentId, RegistryError};

/// Read-only ownership view consumed by the registries
pub trait IdentityLookup: Send + Sync {
    fn exists(&self, agent_id: AgentId) -> bool;

    /// Fails with `AgentNotFound` if the agent does not exist
    fn owner_of(&self, agent_id: AgentId) -> Result<Address, RegistryError>;

    fn is_approved_for_all(&self, owner: Address, operator: Address) -> bool;

    /// Single-token approval, if any
    fn get_approved(&self, agent_id: AgentId) -> Option<Address>;

    /// Owner, operator approved for all of the owner's agents, or token-approved address
    fn is_authorized_or_owner(&self, spender: Address, agent_id: AgentId) -> bool {
        let Ok(owner) = self.owner_of(agent_id) else {
            return false;
        };

        spender == owner
            || self.is_approved_for_all(owner, spender)
            || self.get_approved(agent_id) == Some(spender)
    }
}

#[derive(Debug, Clone)]
struct AgentRecord {
    owner: Address,
    uri: String,
    approved: Option<Address>,
    metadata: HashMap<String, Bytes>,
}

/// In-memory identity registry
#[derive(Debug, Clone)]
pub struct IdentityRegistry {
    next_id: U256,
    agents: HashMap<AgentId, AgentRecord>,
    operators: HashSet<(Address, Address)>,
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self {
            next_id: U256::from(1),
            agents: HashMap::new(),
            operators: HashSet::new(),
        }
    }

    /// Mint a new agent to `owner`
    pub fn register(&mut self, owner: Address, uri: &str) -> Result<AgentId, RegistryError> {
        if owner.is_zero() {
            return Err(RegistryError::InvalidAddress(
                "agent owner must not be zero".to_string(),
            ));
        }

        let agent_id = self.next_id;
        self.next_id += U256::from(1);

        self.agents.insert(
            agent_id,
            AgentRecord {
                owner,
                uri: uri.to_string(),
                approved: None,
                metadata: HashMap::new(),
            },
        );

        info!("Agent {} registered to {:?}", agent_id, owner);
        Ok(agent_id)
    }

    fn record(&self, agent_id: AgentId) -> Result<&AgentRecord, RegistryError> {
        self.agents
            .get(&agent_id)
            .ok_or(RegistryError::AgentNotFound(agent_id))
    }

    fn authorized_record_mut(
        &mut self,
        caller: Address,
        agent_id: AgentId,
    ) -> Result<&mut AgentRecord, RegistryError> {
        if !self.exists(agent_id) {
            return Err(RegistryError::AgentNotFound(agent_id));
        }
        if !self.is_authorized_or_owner(caller, agent_id) {
            return Err(RegistryError::NotAuthorized(caller));
        }

        self.agents
            .get_mut(&agent_id)
            .ok_or(RegistryError::AgentNotFound(agent_id))
    }

    pub fn token_uri(&self, agent_id: AgentId) -> Result<&str, RegistryError> {
        Ok(self.record(agent_id)?.uri.as_str())
    }

    pub fn set_agent_uri(
        &mut self,
        caller: Address,
        agent_id: AgentId,
        uri: &str,
    ) -> Result<(), RegistryError> {
        self.authorized_record_mut(caller, agent_id)?.uri = uri.to_string();
        debug!("Agent {} URI updated by {:?}", agent_id, caller);
        Ok(())
    }

    pub fn get_metadata(&self, agent_id: AgentId, key: &str) -> Result<Bytes, RegistryError> {
        Ok(self
            .record(agent_id)?
            .metadata
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    pub fn set_metadata(
        &mut self,
        caller: Address,
        agent_id: AgentId,
        key: &str,
        value: Bytes,
    ) -> Result<(), RegistryError> {
        self.authorized_record_mut(caller, agent_id)?
            .metadata
            .insert(key.to_string(), value);
        Ok(())
    }

    /// Approve `spender` for a single agent; zero clears the approval
    pub fn approve(
        &mut self,
        caller: Address,
        spender: Address,
        agent_id: AgentId,
    ) -> Result<(), RegistryError> {
        let owner = self.owner_of(agent_id)?;
        if caller != owner && !self.is_approved_for_all(owner, caller) {
            return Err(RegistryError::NotAuthorized(caller));
        }

        let record = self
            .agents
            .get_mut(&agent_id)
            .ok_or(RegistryError::AgentNotFound(agent_id))?;
        record.approved = (!spender.is_zero()).then_some(spender);
        Ok(())
    }

    pub fn set_approval_for_all(
        &mut self,
        owner: Address,
        operator: Address,
        approved: bool,
    ) -> Result<(), RegistryError> {
        if operator.is_zero() {
            return Err(RegistryError::InvalidAddress(
                "operator must not be zero".to_string(),
            ));
        }

        if approved {
            self.operators.insert((owner, operator));
        } else {
            self.operators.remove(&(owner, operator));
        }
        debug!(
            "Operator {:?} approval for {:?} set to {}",
            operator, owner, approved
        );
        Ok(())
    }

    /// Transfer an agent; clears the single-token approval
    pub fn transfer_from(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        agent_id: AgentId,
    ) -> Result<(), RegistryError> {
        if to.is_zero() {
            return Err(RegistryError::InvalidAddress(
                "transfer target must not be zero".to_string(),
            ));
        }

        let record = self.authorized_record_mut(caller, agent_id)?;
        if record.owner != from {
            return Err(RegistryError::NotAgentOwner(from));
        }

        record.owner = to;
        record.approved = None;

        info!("Agent {} transferred {:?} -> {:?}", agent_id, from, to);
        Ok(())
    }

    /// Number of agents minted so far
    pub fn total_supply(&self) -> usize {
        self.agents.len()
    }
}

impl IdentityLookup for IdentityRegistry {
    fn exists(&self, agent_id: AgentId) -> bool {
        self.agents.contains_key(&agent_id)
    }

    fn owner_of(&self, agent_id: AgentId) -> Result<Address, RegistryError> {
        Ok(self.record(agent_id)?.owner)
    }

    fn is_approved_for_all(&self, owner: Address, operator: Address) -> bool {
        self.operators.contains(&(owner, operator))
    }

    fn get_approved(&self, agent_id: AgentId) -> Option<Address> {
        self.agents.get(&agent_id).and_then(|r| r.approved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[test]
    fn test_register_assigns_sequential_ids() {
        let mut identity = IdentityRegistry::new();
        let first = identity.register(addr(1), "ipfs://one").unwrap();
        let second = identity.register(addr(2), "ipfs://two").unwrap();

        assert_eq!(first, U256::from(1));
        assert_eq!(second, U256::from(2));
        assert_eq!(identity.owner_of(second).unwrap(), addr(2));
        assert_eq!(identity.token_uri(first).unwrap(), "ipfs://one");
        assert_eq!(identity.total_supply(), 2);
    }

    #[test]
    fn test_owner_of_missing_agent() {
        let identity = IdentityRegistry::new();
        assert!(!identity.exists(U256::from(9)));
        assert_eq!(
            identity.owner_of(U256::from(9)),
            Err(RegistryError::AgentNotFound(U256::from(9)))
        );
    }

    #[test]
    fn test_authorization_paths() {
        let mut identity = IdentityRegistry::new();
        let agent = identity.register(addr(1), "").unwrap();

        assert!(identity.is_authorized_or_owner(addr(1), agent));
        assert!(!identity.is_authorized_or_owner(addr(2), agent));

        identity.set_approval_for_all(addr(1), addr(2), true).unwrap();
        assert!(identity.is_authorized_or_owner(addr(2), agent));

        identity.approve(addr(1), addr(3), agent).unwrap();
        assert_eq!(identity.get_approved(agent), Some(addr(3)));
        assert!(identity.is_authorized_or_owner(addr(3), agent));

        identity.set_approval_for_all(addr(1), addr(2), false).unwrap();
        assert!(!identity.is_authorized_or_owner(addr(2), agent));
    }

    #[test]
    fn test_transfer_clears_token_approval() {
        let mut identity = IdentityRegistry::new();
        let agent = identity.register(addr(1), "").unwrap();
        identity.approve(addr(1), addr(3), agent).unwrap();

        identity.transfer_from(addr(1), addr(1), addr(4), agent).unwrap();

        assert_eq!(identity.owner_of(agent).unwrap(), addr(4));
        assert_eq!(identity.get_approved(agent), None);
        assert_eq!(
            identity.set_agent_uri(addr(1), agent, "ipfs://x"),
            Err(RegistryError::NotAuthorized(addr(1)))
        );
    }

    #[test]
    fn test_metadata_round_trip() {
        let mut identity = IdentityRegistry::new();
        let agent = identity.register(addr(1), "").unwrap();

        identity
            .set_metadata(addr(1), agent, "agentWallet", Bytes::from(vec![1, 2, 3]))
            .unwrap();

        assert_eq!(
            identity.get_metadata(agent, "agentWallet").unwrap(),
            Bytes::from(vec![1, 2, 3])
        );
        assert!(identity.get_metadata(agent, "missing").unwrap().is_empty());
    }
}
