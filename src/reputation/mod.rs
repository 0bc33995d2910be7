//! Reputation registry
//!
//! Clients submit feedback about an agent under a capability signed by the
//! agent's owner or operator. Feedback is kept per (agent, client) with dense
//! 1-based indexes; entries are never deleted, only revoked or responded to.

pub mod ledger;

use alloy::primitives::{Address, Bytes, B256};
use std::sync::Arc;
use tracing::info;

use crate::aggregate::{self, FeedbackColumns, FeedbackQuery, Summary};
use crate::auth::{self, AuthContext, UsageLedger};
use crate::runtime::{Code, Tx};
use crate::types::{AgentId, RegistryError, RegistryEvent};
use crate::upgrade::{Implementation, ProxyStorage, RegistryCore};

use ledger::{FeedbackEntry, FeedbackLedger, ResponseTally};

/// Everything a reputation proxy persists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReputationStorage {
    pub core: RegistryCore,
    pub feedback: FeedbackLedger,
    pub auth_usage: UsageLedger,
}

impl ProxyStorage for ReputationStorage {
    type Logic = dyn ReputationLogic;

    fn resolve(code: &Code) -> Option<Arc<dyn ReputationLogic>> {
        match code {
            Code::Reputation(logic) => Some(logic.clone()),
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

/// Arguments of `giveFeedback`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFeedback {
    pub agent_id: AgentId,
    pub score: u8,
    pub tag1: B256,
    pub tag2: B256,
    pub file_uri: String,
    pub file_hash: B256,
    pub feedback_auth: Bytes,
}

/// Result of `readFeedback`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackView {
    pub score: u8,
    pub tag1: B256,
    pub tag2: B256,
    pub file_uri: String,
    pub file_hash: B256,
    pub is_revoked: bool,
    pub response_count: u64,
}

impl From<&FeedbackEntry> for FeedbackView {
    fn from(entry: &FeedbackEntry) -> Self {
        Self {
            score: entry.score,
            tag1: entry.tag1,
            tag2: entry.tag2,
            file_uri: entry.file_uri.clone(),
            file_hash: entry.file_hash,
            is_revoked: entry.is_revoked,
            response_count: entry.response_count(),
        }
    }
}

/// Reputation registry code. The provided methods are the registry's behavior;
/// implementations differ in version and migration.
pub trait ReputationLogic: Implementation<ReputationStorage> {
    fn give_feedback(
        &self,
        storage: &mut ReputationStorage,
        tx: &mut Tx,
        feedback: NewFeedback,
    ) -> Result<u64, RegistryError> {
        let agent_id = feedback.agent_id;
        let client = tx.caller();

        if !tx.identity.exists(agent_id) {
            return Err(RegistryError::AgentNotFound(agent_id));
        }
        if feedback.score > 100 {
            return Err(RegistryError::ScoreOutOfRange(feedback.score.into()));
        }
        if tx.identity.is_authorized_or_owner(client, agent_id) {
            return Err(RegistryError::SelfFeedbackNotAllowed);
        }

        let ctx = AuthContext {
            agent_id,
            client,
            chain_id: tx.ctx.chain_id,
            identity_registry: storage.core.identity_registry,
            timestamp: tx.ctx.timestamp,
        };
        let verified = auth::verify(
            &feedback.feedback_auth,
            &ctx,
            &storage.auth_usage,
            tx.identity,
            tx.host,
        )?;

        // Commit: capability use and entry land together
        storage.auth_usage.consume(&verified);
        let index = storage.feedback.append(
            agent_id,
            client,
            FeedbackEntry {
                score: feedback.score,
                tag1: feedback.tag1,
                tag2: feedback.tag2,
                file_uri: feedback.file_uri.clone(),
                file_hash: feedback.file_hash,
                is_revoked: false,
                responses: ResponseTally::default(),
            },
        );

        tx.emit(RegistryEvent::NewFeedback {
            agent_id,
            client,
            index,
            score: feedback.score,
            tag1: feedback.tag1,
            tag2: feedback.tag2,
            file_uri: feedback.file_uri,
            file_hash: feedback.file_hash,
        });

        info!(
            "Feedback {} recorded for agent {} by {:?} (score {}, signer {:?})",
            index, agent_id, client, feedback.score, verified.signer
        );
        Ok(index)
    }

    /// Revoke one of the caller's own entries
    fn revoke_feedback(
        &self,
        storage: &mut ReputationStorage,
        tx: &mut Tx,
        agent_id: AgentId,
        index: u64,
    ) -> Result<(), RegistryError> {
        let client = tx.caller();

        if storage.feedback.last_index(agent_id, client) == 0 {
            return Err(RegistryError::NotEntryOwner(client));
        }

        let entry = storage
            .feedback
            .entry_mut(agent_id, client, index)
            .ok_or(RegistryError::FeedbackNotFound(index))?;
        if entry.is_revoked {
            return Err(RegistryError::AlreadyRevoked(index));
        }
        entry.is_revoked = true;

        tx.emit(RegistryEvent::FeedbackRevoked {
            agent_id,
            client,
            index,
        });

        info!(
            "Feedback {} for agent {} revoked by {:?}",
            index, agent_id, client
        );
        Ok(())
    }

    /// Anyone may respond to any existing entry; returns the responder's count for it
    #[allow(clippy::too_many_arguments)]
    fn append_response(
        &self,
        storage: &mut ReputationStorage,
        tx: &mut Tx,
        agent_id: AgentId,
        client: Address,
        index: u64,
        response_uri: String,
        response_hash: B256,
    ) -> Result<u64, RegistryError> {
        if response_uri.is_empty() {
            return Err(RegistryError::EmptyResponseUri);
        }

        let responder = tx.caller();
        let entry = storage
            .feedback
            .entry_mut(agent_id, client, index)
            .ok_or(RegistryError::FeedbackNotFound(index))?;
        let count = entry.responses.record(responder);

        tx.emit(RegistryEvent::ResponseAppended {
            agent_id,
            client,
            index,
            responder,
            response_uri,
            response_hash,
        });

        info!(
            "Response to feedback {} ({:?}, agent {}) appended by {:?}",
            index, client, agent_id, responder
        );
        Ok(count)
    }

    fn get_last_index(&self, storage: &ReputationStorage, agent_id: AgentId, client: Address) -> u64 {
        storage.feedback.last_index(agent_id, client)
    }

    fn read_feedback(
        &self,
        storage: &ReputationStorage,
        agent_id: AgentId,
        client: Address,
        index: u64,
    ) -> Result<FeedbackView, RegistryError> {
        storage
            .feedback
            .entry(agent_id, client, index)
            .map(FeedbackView::from)
            .ok_or(RegistryError::FeedbackNotFound(index))
    }

    fn get_clients(&self, storage: &ReputationStorage, agent_id: AgentId) -> Vec<Address> {
        storage.feedback.clients(agent_id).to_vec()
    }

    /// Responders in first-response order for one entry
    fn get_responders(
        &self,
        storage: &ReputationStorage,
        agent_id: AgentId,
        client: Address,
        index: u64,
    ) -> Result<Vec<Address>, RegistryError> {
        storage
            .feedback
            .entry(agent_id, client, index)
            .map(|e| e.responses.responders().to_vec())
            .ok_or(RegistryError::FeedbackNotFound(index))
    }

    /// Count responses; a zero client, zero index or empty responder list matches everything
    fn get_response_count(
        &self,
        storage: &ReputationStorage,
        agent_id: AgentId,
        client: Address,
        index: u64,
        responders: &[Address],
    ) -> u64 {
        let clients = if client.is_zero() {
            storage.feedback.clients(agent_id).to_vec()
        } else {
            vec![client]
        };

        clients
            .into_iter()
            .flat_map(|c| {
                storage
                    .feedback
                    .entries(agent_id, c)
                    .iter()
                    .enumerate()
                    .filter(move |(slot, _)| index == 0 || *slot as u64 + 1 == index)
                    .map(|(_, entry)| entry.responses.count_from(responders))
            })
            .sum()
    }

    /// Count and average of non-revoked feedback
    fn get_summary(
        &self,
        storage: &ReputationStorage,
        agent_id: AgentId,
        clients: &[Address],
        tag1: B256,
        tag2: B256,
    ) -> Summary {
        let query = FeedbackQuery {
            clients: clients.to_vec(),
            tag1,
            tag2,
            include_revoked: false,
        };
        aggregate::feedback_summary(&storage.feedback, agent_id, &query)
    }

    fn read_all_feedback(
        &self,
        storage: &ReputationStorage,
        agent_id: AgentId,
        query: &FeedbackQuery,
    ) -> FeedbackColumns {
        aggregate::read_all_feedback(&storage.feedback, agent_id, query)
    }

    fn get_identity_registry(&self, storage: &ReputationStorage) -> Address {
        storage.core.identity_registry
    }

    /// Uses consumed so far by the capability with this message hash
    fn get_authorization_uses(&self, storage: &ReputationStorage, capability: B256) -> u64 {
        storage.auth_usage.used(&capability)
    }
}

/// Reputation registry implementation, version 1
pub struct ReputationRegistryV1;

impl Implementation<ReputationStorage> for ReputationRegistryV1 {
    fn version(&self) -> &'static str {
        "1.0.0"
    }
}

impl ReputationLogic for ReputationRegistryV1 {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{FeedbackAuth, FeedbackAuthorization};
    use crate::identity::{IdentityLookup, IdentityRegistry};
    use crate::runtime::{CallContext, CodeHost};
    use alloy::primitives::U256;
    use alloy::signers::local::PrivateKeySigner;

    const CHAIN_ID: u64 = 31337;
    const NOW: u64 = 1_700_000_000;

    struct Fixture {
        host: CodeHost,
        identity: IdentityRegistry,
        identity_address: Address,
        storage: ReputationStorage,
        owner: PrivateKeySigner,
        client: Address,
        agent_id: AgentId,
    }

    impl Fixture {
        fn new() -> Self {
            let owner = PrivateKeySigner::random();
            let mut identity = IdentityRegistry::new();
            let agent_id = identity.register(owner.address(), "ipfs://agent").unwrap();
            let identity_address = Address::repeat_byte(0x1d);

            let host = CodeHost::new();
            let mut storage = ReputationStorage::default();
            {
                let mut tx = Tx::new(ctx(Address::repeat_byte(0xde)), &identity, &host);
                storage.core.initialize(&mut tx, identity_address).unwrap();
            }

            Self {
                host,
                identity,
                identity_address,
                storage,
                owner,
                client: Address::repeat_byte(0xc1),
                agent_id,
            }
        }

        fn auth(&self, use_limit: u64) -> Bytes {
            let header = FeedbackAuth {
                agentId: self.agent_id,
                clientAddress: self.client,
                useLimit: use_limit,
                expiry: U256::from(NOW + 3600),
                chainId: U256::from(CHAIN_ID),
                identityRegistry: self.identity_address,
                signerAddress: self.owner.address(),
            };
            FeedbackAuthorization::sign(header, &self.owner)
                .unwrap()
                .encode()
                .into()
        }

        fn feedback(&self, score: u8, auth: &Bytes) -> NewFeedback {
            NewFeedback {
                agent_id: self.agent_id,
                score,
                tag1: B256::repeat_byte(0x01),
                tag2: B256::ZERO,
                file_uri: "ipfs://feedback".to_string(),
                file_hash: B256::repeat_byte(0xfe),
                feedback_auth: auth.clone(),
            }
        }

        fn give(&mut self, caller: Address, feedback: NewFeedback) -> Result<u64, RegistryError> {
            let mut tx = Tx::new(ctx(caller), &self.identity, &self.host);
            ReputationRegistryV1.give_feedback(&mut self.storage, &mut tx, feedback)
        }

        fn revoke(&mut self, caller: Address, index: u64) -> Result<(), RegistryError> {
            let mut tx = Tx::new(ctx(caller), &self.identity, &self.host);
            ReputationRegistryV1.revoke_feedback(&mut self.storage, &mut tx, self.agent_id, index)
        }

        fn respond(&mut self, responder: Address, index: u64) -> Result<u64, RegistryError> {
            let mut tx = Tx::new(ctx(responder), &self.identity, &self.host);
            ReputationRegistryV1.append_response(
                &mut self.storage,
                &mut tx,
                self.agent_id,
                self.client,
                index,
                "ipfs://response".to_string(),
                B256::ZERO,
            )
        }
    }

    fn ctx(caller: Address) -> CallContext {
        CallContext {
            caller,
            chain_id: CHAIN_ID,
            timestamp: NOW,
            block: 1,
        }
    }

    #[test]
    fn test_scores_in_range_succeed() {
        let mut fx = Fixture::new();
        let auth = fx.auth(101);

        for score in 0..=100u8 {
            let index = fx.give(fx.client, fx.feedback(score, &auth)).unwrap();
            assert_eq!(index, u64::from(score) + 1);
        }
        assert_eq!(fx.storage.feedback.last_index(fx.agent_id, fx.client), 101);
    }

    #[test]
    fn test_score_above_100_rejected_without_consuming() {
        let mut fx = Fixture::new();
        let auth = fx.auth(1);

        for score in [101u8, 150, 255] {
            assert_eq!(
                fx.give(fx.client, fx.feedback(score, &auth)),
                Err(RegistryError::ScoreOutOfRange(score.into()))
            );
        }

        // The capability is still unused
        assert_eq!(fx.give(fx.client, fx.feedback(50, &auth)), Ok(1));
    }

    #[test]
    fn test_missing_agent() {
        let mut fx = Fixture::new();
        let auth = fx.auth(1);
        let mut feedback = fx.feedback(50, &auth);
        feedback.agent_id = U256::from(404);

        assert_eq!(
            fx.give(fx.client, feedback),
            Err(RegistryError::AgentNotFound(U256::from(404)))
        );
    }

    #[test]
    fn test_single_use_capability_scenario() {
        let mut fx = Fixture::new();
        let auth = fx.auth(1);

        assert_eq!(fx.give(fx.client, fx.feedback(80, &auth)), Ok(1));
        assert_eq!(
            fx.give(fx.client, fx.feedback(80, &auth)),
            Err(RegistryError::AuthExhausted(1))
        );

        assert_eq!(fx.storage.feedback.last_index(fx.agent_id, fx.client), 1);
        let view = ReputationRegistryV1
            .read_feedback(&fx.storage, fx.agent_id, fx.client, 1)
            .unwrap();
        assert_eq!(view.score, 80);
        assert_eq!(view.file_uri, "ipfs://feedback");
    }

    #[test]
    fn test_use_limit_counts_exact_submissions() {
        let mut fx = Fixture::new();
        let auth = fx.auth(3);

        for expected in 1..=3 {
            assert_eq!(fx.give(fx.client, fx.feedback(70, &auth)), Ok(expected));
        }
        assert_eq!(
            fx.give(fx.client, fx.feedback(70, &auth)),
            Err(RegistryError::AuthExhausted(3))
        );

        let capability = FeedbackAuthorization::decode(&auth).unwrap().message_hash();
        assert_eq!(
            ReputationRegistryV1.get_authorization_uses(&fx.storage, capability),
            3
        );
    }

    #[test]
    fn test_capability_bound_to_client() {
        let mut fx = Fixture::new();
        let auth = fx.auth(5);
        let other = Address::repeat_byte(0xc2);

        assert_eq!(
            fx.give(other, fx.feedback(50, &auth)),
            Err(RegistryError::AuthContextMismatch("clientAddress"))
        );
    }

    #[test]
    fn test_owner_cannot_rate_own_agent() {
        let mut fx = Fixture::new();
        fx.client = fx.owner.address();
        let auth = fx.auth(1);

        assert_eq!(
            fx.give(fx.owner.address(), fx.feedback(100, &auth)),
            Err(RegistryError::SelfFeedbackNotAllowed)
        );
    }

    #[test]
    fn test_signer_loses_authority_after_transfer() {
        let mut fx = Fixture::new();
        let auth = fx.auth(2);
        assert_eq!(fx.give(fx.client, fx.feedback(60, &auth)), Ok(1));

        let new_owner = Address::repeat_byte(0x0e);
        fx.identity
            .transfer_from(fx.owner.address(), fx.owner.address(), new_owner, fx.agent_id)
            .unwrap();
        assert_eq!(fx.identity.owner_of(fx.agent_id).unwrap(), new_owner);

        assert_eq!(
            fx.give(fx.client, fx.feedback(60, &auth)),
            Err(RegistryError::AuthUnauthorizedSigner(fx.owner.address()))
        );
    }

    #[test]
    fn test_indexes_survive_revocation() {
        let mut fx = Fixture::new();
        let auth = fx.auth(3);

        fx.give(fx.client, fx.feedback(10, &auth)).unwrap();
        fx.give(fx.client, fx.feedback(20, &auth)).unwrap();
        fx.revoke(fx.client, 2).unwrap();
        assert_eq!(fx.give(fx.client, fx.feedback(30, &auth)), Ok(3));

        let entry = ReputationRegistryV1
            .read_feedback(&fx.storage, fx.agent_id, fx.client, 2)
            .unwrap();
        assert!(entry.is_revoked);
        assert_eq!(entry.score, 20);
    }

    #[test]
    fn test_revocation_rules() {
        let mut fx = Fixture::new();
        let auth = fx.auth(1);
        fx.give(fx.client, fx.feedback(10, &auth)).unwrap();

        let stranger = Address::repeat_byte(0x55);
        assert_eq!(
            fx.revoke(stranger, 1),
            Err(RegistryError::NotEntryOwner(stranger))
        );
        assert_eq!(fx.revoke(fx.client, 0), Err(RegistryError::FeedbackNotFound(0)));
        assert_eq!(fx.revoke(fx.client, 2), Err(RegistryError::FeedbackNotFound(2)));

        fx.revoke(fx.client, 1).unwrap();
        assert_eq!(fx.revoke(fx.client, 1), Err(RegistryError::AlreadyRevoked(1)));
    }

    #[test]
    fn test_responses_and_counts() {
        let mut fx = Fixture::new();
        let auth = fx.auth(2);
        fx.give(fx.client, fx.feedback(90, &auth)).unwrap();
        fx.give(fx.client, fx.feedback(40, &auth)).unwrap();

        let (r1, r2) = (Address::repeat_byte(0xa1), Address::repeat_byte(0xa2));
        assert_eq!(fx.respond(r1, 1), Ok(1));
        assert_eq!(fx.respond(r1, 1), Ok(2));
        assert_eq!(fx.respond(r2, 2), Ok(1));
        assert_eq!(fx.respond(r2, 3), Err(RegistryError::FeedbackNotFound(3)));

        let logic = ReputationRegistryV1;
        let s = &fx.storage;
        assert_eq!(logic.get_response_count(s, fx.agent_id, fx.client, 1, &[]), 2);
        assert_eq!(logic.get_response_count(s, fx.agent_id, fx.client, 0, &[]), 3);
        assert_eq!(logic.get_response_count(s, fx.agent_id, Address::ZERO, 0, &[r2]), 1);
        assert_eq!(logic.get_response_count(s, fx.agent_id, fx.client, 2, &[r1]), 0);
        assert_eq!(
            logic.get_responders(s, fx.agent_id, fx.client, 1).unwrap(),
            vec![r1]
        );
        assert_eq!(
            logic.read_feedback(s, fx.agent_id, fx.client, 1).unwrap().response_count,
            2
        );
    }

    #[test]
    fn test_empty_response_uri_rejected() {
        let mut fx = Fixture::new();
        let auth = fx.auth(1);
        fx.give(fx.client, fx.feedback(90, &auth)).unwrap();

        let mut tx = Tx::new(ctx(Address::repeat_byte(0xa1)), &fx.identity, &fx.host);
        let result = ReputationRegistryV1.append_response(
            &mut fx.storage,
            &mut tx,
            fx.agent_id,
            fx.client,
            1,
            String::new(),
            B256::ZERO,
        );
        assert_eq!(result, Err(RegistryError::EmptyResponseUri));
    }

    #[test]
    fn test_summary_excludes_revoked() {
        let mut fx = Fixture::new();
        let auth = fx.auth(4);
        for score in [80, 90, 100, 0] {
            fx.give(fx.client, fx.feedback(score, &auth)).unwrap();
        }
        fx.revoke(fx.client, 4).unwrap();

        let logic = ReputationRegistryV1;
        assert_eq!(
            logic.get_summary(&fx.storage, fx.agent_id, &[], B256::ZERO, B256::ZERO),
            Summary { count: 3, average: 90 }
        );
        assert_eq!(
            logic.get_summary(&fx.storage, fx.agent_id, &[], B256::repeat_byte(0x09), B256::ZERO),
            Summary::default()
        );
        assert_eq!(logic.get_clients(&fx.storage, fx.agent_id), vec![fx.client]);
    }

    #[test]
    fn test_events_emitted_on_success_only() {
        let mut fx = Fixture::new();
        let auth = fx.auth(1);

        let rejected = fx.feedback(101, &auth);
        let mut tx = Tx::new(ctx(fx.client), &fx.identity, &fx.host);
        ReputationRegistryV1
            .give_feedback(&mut fx.storage, &mut tx, rejected)
            .unwrap_err();
        assert!(tx.events().is_empty());

        let accepted = fx.feedback(77, &auth);
        let mut tx = Tx::new(ctx(fx.client), &fx.identity, &fx.host);
        ReputationRegistryV1
            .give_feedback(&mut fx.storage, &mut tx, accepted)
            .unwrap();
        let events = tx.into_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            RegistryEvent::NewFeedback { index: 1, score: 77, .. }
        ));
    }
}
