//! Validation registry
//!
//! An agent owner asks a validator to check some work, identified by a
//! caller-chosen request hash. The validator answers with a 0-100 response and
//! may answer again; each answer replaces the previous one.

pub mod ledger;

use alloy::primitives::{Address, B256};
use std::sync::Arc;
use tracing::info;

use crate::aggregate::{self, Summary};
use crate::runtime::{Code, Tx};
use crate::types::{AgentId, RegistryError, RegistryEvent};
use crate::upgrade::{Implementation, ProxyStorage, RegistryCore};

use ledger::{ValidationLedger, ValidationStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationStorage {
    pub core: RegistryCore,
    pub validations: ValidationLedger,
}

impl ProxyStorage for ValidationStorage {
    type Logic = dyn ValidationLogic;

    fn resolve(code: &Code) -> Option<Arc<dyn ValidationLogic>> {
        match code {
            Code::Validation(logic) => Some(logic.clone()),
            _ => None,
        }
    }

    fn core(&self) -> &RegistryCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut RegistryCore {
        &mut self.core
    }
}

/// Arguments of `validationResponse`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationAnswer {
    pub request_hash: B256,
    pub response: u8,
    pub response_uri: String,
    pub response_hash: B256,
    pub tag: B256,
}

pub trait ValidationLogic: Implementation<ValidationStorage> {
    /// Open a request; only the agent's owner may ask
    fn validation_request(
        &self,
        storage: &mut ValidationStorage,
        tx: &mut Tx,
        validator: Address,
        agent_id: AgentId,
        request_uri: String,
        request_hash: B256,
    ) -> Result<(), RegistryError> {
        if validator.is_zero() {
            return Err(RegistryError::ZeroValidator);
        }

        let caller = tx.caller();
        if tx.identity.owner_of(agent_id)? != caller {
            return Err(RegistryError::NotAgentOwner(caller));
        }
        if storage.validations.contains(&request_hash) {
            return Err(RegistryError::DuplicateRequest(request_hash));
        }

        storage.validations.insert(
            request_hash,
            ValidationStatus {
                validator,
                agent_id,
                request_uri: request_uri.clone(),
                response: 0,
                response_uri: String::new(),
                response_hash: B256::ZERO,
                tag: B256::ZERO,
                last_update: tx.ctx.timestamp,
                has_response: false,
            },
        );

        tx.emit(RegistryEvent::ValidationRequested {
            validator,
            agent_id,
            request_uri,
            request_hash,
        });

        info!(
            "Validation {} requested for agent {} from {:?}",
            request_hash, agent_id, validator
        );
        Ok(())
    }

    /// Record the validator's answer, replacing any earlier one
    fn validation_response(
        &self,
        storage: &mut ValidationStorage,
        tx: &mut Tx,
        answer: ValidationAnswer,
    ) -> Result<(), RegistryError> {
        let caller = tx.caller();
        let status = storage
            .validations
            .status_mut(&answer.request_hash)
            .ok_or(RegistryError::UnknownRequest(answer.request_hash))?;

        if status.validator != caller {
            return Err(RegistryError::NotValidator(caller));
        }
        if answer.response > 100 {
            return Err(RegistryError::ScoreOutOfRange(answer.response.into()));
        }

        status.response = answer.response;
        status.response_uri = answer.response_uri.clone();
        status.response_hash = answer.response_hash;
        status.tag = answer.tag;
        status.last_update = tx.ctx.timestamp;
        status.has_response = true;
        let agent_id = status.agent_id;

        tx.emit(RegistryEvent::ValidationResponded {
            validator: caller,
            agent_id,
            request_hash: answer.request_hash,
            response: answer.response,
            response_uri: answer.response_uri,
            response_hash: answer.response_hash,
            tag: answer.tag,
        });

        info!(
            "Validation {} answered with {} by {:?}",
            answer.request_hash, answer.response, caller
        );
        Ok(())
    }

    fn get_validation_status(
        &self,
        storage: &ValidationStorage,
        request_hash: B256,
    ) -> Result<ValidationStatus, RegistryError> {
        storage
            .validations
            .status(&request_hash)
            .cloned()
            .ok_or(RegistryError::UnknownRequest(request_hash))
    }

    fn get_agent_validations(&self, storage: &ValidationStorage, agent_id: AgentId) -> Vec<B256> {
        storage.validations.agent_requests(agent_id).to_vec()
    }

    fn get_validator_requests(&self, storage: &ValidationStorage, validator: Address) -> Vec<B256> {
        storage.validations.validator_requests(validator).to_vec()
    }

    fn get_summary(
        &self,
        storage: &ValidationStorage,
        agent_id: AgentId,
        validators: &[Address],
        tag: B256,
    ) -> Summary {
        aggregate::validation_summary(&storage.validations, agent_id, validators, tag)
    }

    fn get_identity_registry(&self, storage: &ValidationStorage) -> Address {
        storage.core.identity_registry
    }
}

/// Validation registry implementation, version 1
pub struct ValidationRegistryV1;

impl Implementation<ValidationStorage> for ValidationRegistryV1 {
    fn version(&self) -> &'static str {
        "1.0.0"
    }
}

impl ValidationLogic for ValidationRegistryV1 {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityRegistry;
    use crate::runtime::{CallContext, CodeHost};

    const NOW: u64 = 1_700_000_000;

    struct Fixture {
        host: CodeHost,
        identity: IdentityRegistry,
        storage: ValidationStorage,
        owner: Address,
        validator: Address,
        agent_id: AgentId,
    }

    impl Fixture {
        fn new() -> Self {
            let owner = Address::repeat_byte(0x0a);
            let mut identity = IdentityRegistry::new();
            let agent_id = identity.register(owner, "ipfs://agent").unwrap();

            Self {
                host: CodeHost::new(),
                identity,
                storage: ValidationStorage::default(),
                owner,
                validator: Address::repeat_byte(0x7a),
                agent_id,
            }
        }

        fn request(&mut self, caller: Address, hash: B256) -> Result<(), RegistryError> {
            let mut tx = Tx::new(ctx(caller, NOW), &self.identity, &self.host);
            ValidationRegistryV1.validation_request(
                &mut self.storage,
                &mut tx,
                self.validator,
                self.agent_id,
                "ipfs://request".to_string(),
                hash,
            )
        }

        fn respond(
            &mut self,
            caller: Address,
            hash: B256,
            response: u8,
            at: u64,
        ) -> Result<(), RegistryError> {
            let mut tx = Tx::new(ctx(caller, at), &self.identity, &self.host);
            ValidationRegistryV1.validation_response(
                &mut self.storage,
                &mut tx,
                ValidationAnswer {
                    request_hash: hash,
                    response,
                    response_uri: format!("ipfs://response/{}", response),
                    response_hash: B256::repeat_byte(response),
                    tag: B256::repeat_byte(0x33),
                },
            )
        }
    }

    fn ctx(caller: Address, timestamp: u64) -> CallContext {
        CallContext {
            caller,
            chain_id: 31337,
            timestamp,
            block: 1,
        }
    }

    #[test]
    fn test_progressive_finality_overwrites() {
        let mut fx = Fixture::new();
        let hash = B256::repeat_byte(0x01);
        fx.request(fx.owner, hash).unwrap();

        let pending = ValidationRegistryV1
            .get_validation_status(&fx.storage, hash)
            .unwrap();
        assert_eq!(pending.response, 0);
        assert!(!pending.has_response);

        fx.respond(fx.validator, hash, 80, NOW + 10).unwrap();
        fx.respond(fx.validator, hash, 100, NOW + 20).unwrap();

        let status = ValidationRegistryV1
            .get_validation_status(&fx.storage, hash)
            .unwrap();
        assert_eq!(status.response, 100);
        assert_eq!(status.response_uri, "ipfs://response/100");
        assert_eq!(status.last_update, NOW + 20);
        assert!(status.has_response);

        assert_eq!(
            ValidationRegistryV1.get_agent_validations(&fx.storage, fx.agent_id),
            vec![hash]
        );
        assert_eq!(
            ValidationRegistryV1.get_validator_requests(&fx.storage, fx.validator),
            vec![hash]
        );
    }

    #[test]
    fn test_only_owner_may_request() {
        let mut fx = Fixture::new();
        let stranger = Address::repeat_byte(0x55);

        assert_eq!(
            fx.request(stranger, B256::repeat_byte(1)),
            Err(RegistryError::NotAgentOwner(stranger))
        );
        assert!(fx.storage.validations.agent_requests(fx.agent_id).is_empty());
    }

    #[test]
    fn test_request_for_missing_agent() {
        let mut fx = Fixture::new();
        fx.agent_id = AgentId::from(77);

        assert_eq!(
            fx.request(fx.owner, B256::repeat_byte(1)),
            Err(RegistryError::AgentNotFound(AgentId::from(77)))
        );
    }

    #[test]
    fn test_duplicate_request_hash() {
        let mut fx = Fixture::new();
        let hash = B256::repeat_byte(0x02);

        fx.request(fx.owner, hash).unwrap();
        assert_eq!(
            fx.request(fx.owner, hash),
            Err(RegistryError::DuplicateRequest(hash))
        );
    }

    #[test]
    fn test_zero_validator_rejected() {
        let mut fx = Fixture::new();
        fx.validator = Address::ZERO;

        assert_eq!(
            fx.request(fx.owner, B256::repeat_byte(1)),
            Err(RegistryError::ZeroValidator)
        );
    }

    #[test]
    fn test_response_checks() {
        let mut fx = Fixture::new();
        let hash = B256::repeat_byte(0x03);
        let unknown = B256::repeat_byte(0x04);
        fx.request(fx.owner, hash).unwrap();

        assert_eq!(
            fx.respond(fx.validator, unknown, 50, NOW),
            Err(RegistryError::UnknownRequest(unknown))
        );
        assert_eq!(
            fx.respond(fx.owner, hash, 50, NOW),
            Err(RegistryError::NotValidator(fx.owner))
        );
        assert_eq!(
            fx.respond(fx.validator, hash, 101, NOW),
            Err(RegistryError::ScoreOutOfRange(101))
        );

        // Rejections leave the request untouched
        let status = ValidationRegistryV1
            .get_validation_status(&fx.storage, hash)
            .unwrap();
        assert!(!status.has_response);
        assert_eq!(status.last_update, NOW);
    }

    #[test]
    fn test_summary_counts_zero_answers() {
        let mut fx = Fixture::new();
        let (a, b, c) = (B256::repeat_byte(1), B256::repeat_byte(2), B256::repeat_byte(3));
        for hash in [a, b, c] {
            fx.request(fx.owner, hash).unwrap();
        }
        fx.respond(fx.validator, a, 0, NOW).unwrap();
        fx.respond(fx.validator, b, 90, NOW).unwrap();

        let summary = ValidationRegistryV1.get_summary(&fx.storage, fx.agent_id, &[], B256::ZERO);
        assert_eq!(summary, Summary { count: 2, average: 45 });

        let other = ValidationRegistryV1.get_summary(
            &fx.storage,
            fx.agent_id,
            &[Address::repeat_byte(0x99)],
            B256::ZERO,
        );
        assert_eq!(other, Summary::default());
    }

    #[test]
    fn test_events() {
        let mut fx = Fixture::new();
        let hash = B256::repeat_byte(0x05);

        let mut tx = Tx::new(ctx(fx.owner, NOW), &fx.identity, &fx.host);
        ValidationRegistryV1
            .validation_request(
                &mut fx.storage,
                &mut tx,
                fx.validator,
                fx.agent_id,
                "ipfs://request".to_string(),
                hash,
            )
            .unwrap();
        assert!(matches!(
            tx.events(),
            [RegistryEvent::ValidationRequested { request_hash, .. }] if *request_hash == hash
        ));
    }
}
