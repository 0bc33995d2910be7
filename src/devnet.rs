//! Single-node chain hosting the registries
//!
//! One identity registry, one reputation proxy and one validation proxy. Every
//! state-changing method is one call: it runs against a fresh [`CallContext`],
//! either commits with a [`Receipt`] carrying its events or fails leaving all
//! state untouched. Callers serialize access by holding `&mut Chain`.

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::aggregate::{FeedbackColumns, FeedbackQuery, Summary};
use crate::auth::{FeedbackAuth, SmartAccount};
use crate::chains;
use crate::identity::IdentityRegistry;
use crate::reputation::{
    FeedbackView, NewFeedback, ReputationLogic, ReputationRegistryV1, ReputationStorage,
};
use crate::runtime::{CallContext, Clock, Code, CodeHost, Tx};
use crate::types::{AgentId, RegistryError, RegistryEvent};
use crate::upgrade::{Proxy, ProxyStorage};
use crate::validation::ledger::ValidationStatus;
use crate::validation::{
    ValidationAnswer, ValidationLogic, ValidationRegistryV1, ValidationStorage,
};

/// A committed call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_id: String,
    pub block: u64,
    pub timestamp: u64,
    /// Contract called, or the contract created by a deployment
    pub to: Address,
    pub events: Vec<RegistryEvent>,
}

/// Which proxy an admin call targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    Reputation,
    Validation,
}

impl RegistryKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reputation" => Some(RegistryKind::Reputation),
            "validation" => Some(RegistryKind::Validation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryKind::Reputation => "reputation",
            RegistryKind::Validation => "validation",
        }
    }

    /// Fresh implementation code for this registry
    fn implementation_code(&self) -> Code {
        match self {
            RegistryKind::Reputation => Code::Reputation(Arc::new(ReputationRegistryV1)),
            RegistryKind::Validation => Code::Validation(Arc::new(ValidationRegistryV1)),
        }
    }
}

/// Proxy state as reported by the admin API
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatus {
    pub registry: &'static str,
    pub address: String,
    pub implementation: String,
    pub version: String,
    pub owner: String,
    pub identity_registry: String,
    pub initialized_version: u64,
}

pub struct Chain {
    chain_id: u64,
    clock: Clock,
    block: u64,
    host: CodeHost,
    identity: IdentityRegistry,
    identity_address: Address,
    reputation: Proxy<ReputationStorage>,
    validation: Proxy<ValidationStorage>,
}

/// Run `op` against one proxy as a single call, returning its events on success
fn run<S: ProxyStorage, T>(
    ctx: CallContext,
    identity: &IdentityRegistry,
    host: &CodeHost,
    proxy: &mut Proxy<S>,
    op: impl FnOnce(&mut Proxy<S>, &mut Tx) -> Result<T, RegistryError>,
) -> Result<(T, Vec<RegistryEvent>), RegistryError> {
    let mut tx = Tx::new(ctx, identity, host);
    let value = op(proxy, &mut tx)?;
    Ok((value, tx.into_events()))
}

impl Chain {
    /// Boot a chain: deploy both V1 implementations and their proxies, and
    /// initialize the proxies from `owner`, one block each
    ///
    /// Registries land at the network profile's canonical addresses when it
    /// has them, otherwise at CREATE addresses of `owner`.
    pub fn genesis(chain_id: u64, owner: Address, clock: Clock) -> Result<(Self, Vec<Receipt>), RegistryError> {
        let profile = chains::get_chain(chain_id).ok_or_else(|| {
            RegistryError::InvalidRequest(format!("Unsupported chain: {}", chain_id))
        })?;

        let mut host = CodeHost::new();
        let identity_address = match profile.identity() {
            Some(address) => address,
            None => host.reserve(owner),
        };

        let reputation_impl = host.deploy(owner, RegistryKind::Reputation.implementation_code());
        let validation_impl = host.deploy(owner, RegistryKind::Validation.implementation_code());

        let reputation_address = match profile.reputation() {
            Some(address) => address,
            None => host.reserve(owner),
        };
        let validation_address = match profile.validation() {
            Some(address) => address,
            None => host.reserve(owner),
        };

        let mut chain = Self {
            chain_id,
            clock,
            block: 0,
            reputation: Proxy::deploy(&host, reputation_address, reputation_impl)?,
            validation: Proxy::deploy(&host, validation_address, validation_impl)?,
            host,
            identity: IdentityRegistry::new(),
            identity_address,
        };

        let receipts = vec![
            chain.initialize(RegistryKind::Reputation, owner, identity_address)?,
            chain.initialize(RegistryKind::Validation, owner, identity_address)?,
        ];

        info!(
            "Genesis on {} ({}): identity {:?}, reputation {:?}, validation {:?}, owner {:?}",
            profile.name, chain_id, identity_address, reputation_address, validation_address, owner
        );

        Ok((chain, receipts))
    }

    fn next_context(&self, caller: Address) -> CallContext {
        CallContext {
            caller,
            chain_id: self.chain_id,
            timestamp: self.clock.now(),
            block: self.block + 1,
        }
    }

    /// Commit a call: advance the block and stamp the receipt
    fn seal(&mut self, ctx: CallContext, to: Address, events: Vec<RegistryEvent>) -> Receipt {
        self.block = ctx.block;
        let receipt = Receipt {
            tx_id: format!("tx_{}", uuid::Uuid::new_v4().simple()),
            block: ctx.block,
            timestamp: ctx.timestamp,
            to,
            events,
        };
        debug!(
            "Block {} sealed: {} ({} events)",
            receipt.block,
            receipt.tx_id,
            receipt.events.len()
        );
        receipt
    }

    fn reputation_call<T>(
        &mut self,
        from: Address,
        op: impl FnOnce(&dyn ReputationLogic, &mut ReputationStorage, &mut Tx) -> Result<T, RegistryError>,
    ) -> Result<(T, Receipt), RegistryError> {
        let ctx = self.next_context(from);
        let (value, events) = {
            let mut tx = Tx::new(ctx, &self.identity, &self.host);
            let (logic, storage) = self.reputation.dispatch_mut(&self.host)?;
            let value = op(logic.as_ref(), storage, &mut tx)?;
            (value, tx.into_events())
        };
        let to = self.reputation.address();
        Ok((value, self.seal(ctx, to, events)))
    }

    fn validation_call<T>(
        &mut self,
        from: Address,
        op: impl FnOnce(&dyn ValidationLogic, &mut ValidationStorage, &mut Tx) -> Result<T, RegistryError>,
    ) -> Result<(T, Receipt), RegistryError> {
        let ctx = self.next_context(from);
        let (value, events) = {
            let mut tx = Tx::new(ctx, &self.identity, &self.host);
            let (logic, storage) = self.validation.dispatch_mut(&self.host)?;
            let value = op(logic.as_ref(), storage, &mut tx)?;
            (value, tx.into_events())
        };
        let to = self.validation.address();
        Ok((value, self.seal(ctx, to, events)))
    }

    fn identity_call<T>(
        &mut self,
        from: Address,
        op: impl FnOnce(&mut IdentityRegistry, Address) -> Result<T, RegistryError>,
    ) -> Result<(T, Receipt), RegistryError> {
        let ctx = self.next_context(from);
        let value = op(&mut self.identity, from)?;
        let to = self.identity_address;
        Ok((value, self.seal(ctx, to, Vec::new())))
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn block_number(&self) -> u64 {
        self.block
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Pin the block timestamp
    pub fn warp(&mut self, timestamp: u64) {
        self.clock.warp(timestamp);
        info!("Clock warped to {}", timestamp);
    }

    pub fn identity_address(&self) -> Address {
        self.identity_address
    }

    pub fn registry_address(&self, kind: RegistryKind) -> Address {
        match kind {
            RegistryKind::Reputation => self.reputation.address(),
            RegistryKind::Validation => self.validation.address(),
        }
    }

    // ----- identity -----

    pub fn identity(&self) -> &IdentityRegistry {
        &self.identity
    }

    pub fn register_agent(&mut self, from: Address, uri: &str) -> Result<(AgentId, Receipt), RegistryError> {
        self.identity_call(from, |identity, caller| identity.register(caller, uri))
    }

    pub fn set_agent_uri(&mut self, from: Address, agent_id: AgentId, uri: &str) -> Result<Receipt, RegistryError> {
        self.identity_call(from, |identity, caller| identity.set_agent_uri(caller, agent_id, uri))
            .map(|((), receipt)| receipt)
    }

    pub fn set_metadata(
        &mut self,
        from: Address,
        agent_id: AgentId,
        key: &str,
        value: Bytes,
    ) -> Result<Receipt, RegistryError> {
        self.identity_call(from, |identity, caller| {
            identity.set_metadata(caller, agent_id, key, value)
        })
        .map(|((), receipt)| receipt)
    }

    pub fn approve(&mut self, from: Address, spender: Address, agent_id: AgentId) -> Result<Receipt, RegistryError> {
        self.identity_call(from, |identity, caller| identity.approve(caller, spender, agent_id))
            .map(|((), receipt)| receipt)
    }

    pub fn set_approval_for_all(
        &mut self,
        from: Address,
        operator: Address,
        approved: bool,
    ) -> Result<Receipt, RegistryError> {
        self.identity_call(from, |identity, caller| {
            identity.set_approval_for_all(caller, operator, approved)
        })
        .map(|((), receipt)| receipt)
    }

    pub fn transfer_agent(
        &mut self,
        from: Address,
        owner: Address,
        to: Address,
        agent_id: AgentId,
    ) -> Result<Receipt, RegistryError> {
        self.identity_call(from, |identity, caller| {
            identity.transfer_from(caller, owner, to, agent_id)
        })
        .map(|((), receipt)| receipt)
    }

    // ----- reputation -----

    pub fn give_feedback(&mut self, from: Address, feedback: NewFeedback) -> Result<(u64, Receipt), RegistryError> {
        self.reputation_call(from, |logic, storage, tx| logic.give_feedback(storage, tx, feedback))
    }

    pub fn revoke_feedback(&mut self, from: Address, agent_id: AgentId, index: u64) -> Result<Receipt, RegistryError> {
        self.reputation_call(from, |logic, storage, tx| {
            logic.revoke_feedback(storage, tx, agent_id, index)
        })
        .map(|((), receipt)| receipt)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn append_response(
        &mut self,
        from: Address,
        agent_id: AgentId,
        client: Address,
        index: u64,
        response_uri: String,
        response_hash: B256,
    ) -> Result<(u64, Receipt), RegistryError> {
        self.reputation_call(from, |logic, storage, tx| {
            logic.append_response(storage, tx, agent_id, client, index, response_uri, response_hash)
        })
    }

    pub fn last_index(&self, agent_id: AgentId, client: Address) -> Result<u64, RegistryError> {
        let (logic, storage) = self.reputation.dispatch(&self.host)?;
        Ok(logic.get_last_index(storage, agent_id, client))
    }

    pub fn read_feedback(&self, agent_id: AgentId, client: Address, index: u64) -> Result<FeedbackView, RegistryError> {
        let (logic, storage) = self.reputation.dispatch(&self.host)?;
        logic.read_feedback(storage, agent_id, client, index)
    }

    pub fn clients(&self, agent_id: AgentId) -> Result<Vec<Address>, RegistryError> {
        let (logic, storage) = self.reputation.dispatch(&self.host)?;
        Ok(logic.get_clients(storage, agent_id))
    }

    pub fn responders(&self, agent_id: AgentId, client: Address, index: u64) -> Result<Vec<Address>, RegistryError> {
        let (logic, storage) = self.reputation.dispatch(&self.host)?;
        logic.get_responders(storage, agent_id, client, index)
    }

    pub fn response_count(
        &self,
        agent_id: AgentId,
        client: Address,
        index: u64,
        responders: &[Address],
    ) -> Result<u64, RegistryError> {
        let (logic, storage) = self.reputation.dispatch(&self.host)?;
        Ok(logic.get_response_count(storage, agent_id, client, index, responders))
    }

    pub fn feedback_summary(
        &self,
        agent_id: AgentId,
        clients: &[Address],
        tag1: B256,
        tag2: B256,
    ) -> Result<Summary, RegistryError> {
        let (logic, storage) = self.reputation.dispatch(&self.host)?;
        Ok(logic.get_summary(storage, agent_id, clients, tag1, tag2))
    }

    pub fn read_all_feedback(&self, agent_id: AgentId, query: &FeedbackQuery) -> Result<FeedbackColumns, RegistryError> {
        let (logic, storage) = self.reputation.dispatch(&self.host)?;
        Ok(logic.read_all_feedback(storage, agent_id, query))
    }

    pub fn authorization_uses(&self, capability: B256) -> Result<u64, RegistryError> {
        let (logic, storage) = self.reputation.dispatch(&self.host)?;
        Ok(logic.get_authorization_uses(storage, capability))
    }

    /// Capability header bound to this chain's reputation instance
    pub fn feedback_auth_header(
        &self,
        agent_id: AgentId,
        client: Address,
        use_limit: u64,
        expiry: u64,
        signer: Address,
    ) -> Result<FeedbackAuth, RegistryError> {
        let (logic, storage) = self.reputation.dispatch(&self.host)?;
        Ok(FeedbackAuth {
            agentId: agent_id,
            clientAddress: client,
            useLimit: use_limit,
            expiry: U256::from(expiry),
            chainId: U256::from(self.chain_id),
            identityRegistry: logic.get_identity_registry(storage),
            signerAddress: signer,
        })
    }

    // ----- validation -----

    pub fn validation_request(
        &mut self,
        from: Address,
        validator: Address,
        agent_id: AgentId,
        request_uri: String,
        request_hash: B256,
    ) -> Result<Receipt, RegistryError> {
        self.validation_call(from, |logic, storage, tx| {
            logic.validation_request(storage, tx, validator, agent_id, request_uri, request_hash)
        })
        .map(|((), receipt)| receipt)
    }

    pub fn validation_response(&mut self, from: Address, answer: ValidationAnswer) -> Result<Receipt, RegistryError> {
        self.validation_call(from, |logic, storage, tx| logic.validation_response(storage, tx, answer))
            .map(|((), receipt)| receipt)
    }

    pub fn validation_status(&self, request_hash: B256) -> Result<ValidationStatus, RegistryError> {
        let (logic, storage) = self.validation.dispatch(&self.host)?;
        logic.get_validation_status(storage, request_hash)
    }

    pub fn agent_validations(&self, agent_id: AgentId) -> Result<Vec<B256>, RegistryError> {
        let (logic, storage) = self.validation.dispatch(&self.host)?;
        Ok(logic.get_agent_validations(storage, agent_id))
    }

    pub fn validator_requests(&self, validator: Address) -> Result<Vec<B256>, RegistryError> {
        let (logic, storage) = self.validation.dispatch(&self.host)?;
        Ok(logic.get_validator_requests(storage, validator))
    }

    pub fn validation_summary(
        &self,
        agent_id: AgentId,
        validators: &[Address],
        tag: B256,
    ) -> Result<Summary, RegistryError> {
        let (logic, storage) = self.validation.dispatch(&self.host)?;
        Ok(logic.get_summary(storage, agent_id, validators, tag))
    }

    // ----- code and upgrades -----

    /// Deploy arbitrary code from `from`
    pub fn deploy(&mut self, from: Address, code: Code) -> (Address, Receipt) {
        let ctx = self.next_context(from);
        let address = self.host.deploy(from, code);
        (address, self.seal(ctx, address, Vec::new()))
    }

    /// Deploy a fresh V1 implementation of `kind`
    pub fn deploy_implementation(&mut self, from: Address, kind: RegistryKind) -> (Address, Receipt) {
        let (address, receipt) = self.deploy(from, kind.implementation_code());
        info!("Deployed {} implementation at {:?}", kind.as_str(), address);
        (address, receipt)
    }

    /// Deploy a single-owner ERC-1271 smart account
    pub fn deploy_smart_account(&mut self, from: Address, owner: Address) -> (Address, Receipt) {
        let (address, receipt) = self.deploy(from, Code::Wallet(Arc::new(SmartAccount::new(owner))));
        info!("Deployed smart account {:?} owned by {:?}", address, owner);
        (address, receipt)
    }

    pub fn upgrade(
        &mut self,
        kind: RegistryKind,
        from: Address,
        new_implementation: Address,
        migrate: bool,
    ) -> Result<Receipt, RegistryError> {
        self.admin_call(kind, from, |proxy, tx| match proxy {
            AdminTarget::Reputation(p) => p.upgrade_to_and_call(tx, new_implementation, migrate),
            AdminTarget::Validation(p) => p.upgrade_to_and_call(tx, new_implementation, migrate),
        })
    }

    pub fn initialize(&mut self, kind: RegistryKind, from: Address, identity_registry: Address) -> Result<Receipt, RegistryError> {
        self.admin_call(kind, from, |proxy, tx| match proxy {
            AdminTarget::Reputation(p) => p.initialize(tx, identity_registry),
            AdminTarget::Validation(p) => p.initialize(tx, identity_registry),
        })
    }

    pub fn transfer_ownership(&mut self, kind: RegistryKind, from: Address, new_owner: Address) -> Result<Receipt, RegistryError> {
        self.admin_call(kind, from, |proxy, tx| match proxy {
            AdminTarget::Reputation(p) => p.transfer_ownership(tx, new_owner),
            AdminTarget::Validation(p) => p.transfer_ownership(tx, new_owner),
        })
    }

    pub fn renounce_ownership(&mut self, kind: RegistryKind, from: Address) -> Result<Receipt, RegistryError> {
        self.admin_call(kind, from, |proxy, tx| match proxy {
            AdminTarget::Reputation(p) => p.renounce_ownership(tx),
            AdminTarget::Validation(p) => p.renounce_ownership(tx),
        })
    }

    fn admin_call(
        &mut self,
        kind: RegistryKind,
        from: Address,
        op: impl FnOnce(AdminTarget<'_>, &mut Tx) -> Result<(), RegistryError>,
    ) -> Result<Receipt, RegistryError> {
        let ctx = self.next_context(from);
        let to = self.registry_address(kind);
        let ((), events) = match kind {
            RegistryKind::Reputation => run(ctx, &self.identity, &self.host, &mut self.reputation, |p, tx| {
                op(AdminTarget::Reputation(p), tx)
            })?,
            RegistryKind::Validation => run(ctx, &self.identity, &self.host, &mut self.validation, |p, tx| {
                op(AdminTarget::Validation(p), tx)
            })?,
        };
        Ok(self.seal(ctx, to, events))
    }

    /// Call `initialize` on an implementation code unit itself rather than through a proxy
    pub fn initialize_implementation(
        &mut self,
        from: Address,
        implementation: Address,
        identity_registry: Address,
    ) -> Result<Receipt, RegistryError> {
        let ctx = self.next_context(from);
        let mut core = self
            .host
            .own_storage(implementation)
            .cloned()
            .ok_or(RegistryError::UpgradeNotContract(implementation))?;

        let events = {
            let mut tx = Tx::new(ctx, &self.identity, &self.host);
            core.initialize(&mut tx, identity_registry)?;
            tx.into_events()
        };

        if let Some(storage) = self.host.own_storage_mut(implementation) {
            *storage = core;
        }
        Ok(self.seal(ctx, implementation, events))
    }

    pub fn registry_status(&self, kind: RegistryKind) -> Result<RegistryStatus, RegistryError> {
        match kind {
            RegistryKind::Reputation => {
                let logic = self.reputation.logic(&self.host)?;
                Ok(status_of(kind, &self.reputation, logic.version()))
            }
            RegistryKind::Validation => {
                let logic = self.validation.logic(&self.host)?;
                Ok(status_of(kind, &self.validation, logic.version()))
            }
        }
    }

    #[cfg(test)]
    fn reputation_storage(&self) -> &ReputationStorage {
        self.reputation.storage()
    }
}

/// Proxy handed to an admin operation
enum AdminTarget<'a> {
    Reputation(&'a mut Proxy<ReputationStorage>),
    Validation(&'a mut Proxy<ValidationStorage>),
}

fn status_of<S: ProxyStorage>(kind: RegistryKind, proxy: &Proxy<S>, version: &str) -> RegistryStatus {
    let core = proxy.storage().core();
    RegistryStatus {
        registry: kind.as_str(),
        address: format!("{:?}", proxy.address()),
        implementation: format!("{:?}", proxy.implementation()),
        version: version.to_string(),
        owner: format!("{:?}", core.owner),
        identity_registry: format!("{:?}", core.identity_registry),
        initialized_version: core.init.version(),
    }
}
