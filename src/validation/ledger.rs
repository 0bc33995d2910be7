use alloy::primitives::{Address, B256};
use std::collections::HashMap;

use crate::types::AgentId;

/// State of one validation request
///
/// `response` stays 0 until the validator answers; later answers overwrite
/// the previous one in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationStatus {
    pub validator: Address,
    pub agent_id: AgentId,
    pub request_uri: String,
    pub response: u8,
    pub response_uri: String,
    pub response_hash: B256,
    pub tag: B256,
    pub last_update: u64,
    pub has_response: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationLedger {
    statuses: HashMap<B256, ValidationStatus>,
    by_agent: HashMap<AgentId, Vec<B256>>,
    by_validator: HashMap<Address, Vec<B256>>,
}

impl ValidationLedger {
    pub fn contains(&self, request_hash: &B256) -> bool {
        self.statuses.contains_key(request_hash)
    }

    pub fn status(&self, request_hash: &B256) -> Option<&ValidationStatus> {
        self.statuses.get(request_hash)
    }

    pub fn status_mut(&mut self, request_hash: &B256) -> Option<&mut ValidationStatus> {
        self.statuses.get_mut(request_hash)
    }

    /// Record a new request; the caller has already rejected duplicates
    pub fn insert(&mut self, request_hash: B256, status: ValidationStatus) {
        self.by_agent
            .entry(status.agent_id)
            .or_default()
            .push(request_hash);
        self.by_validator
            .entry(status.validator)
            .or_default()
            .push(request_hash);
        self.statuses.insert(request_hash, status);
    }

    pub fn agent_requests(&self, agent_id: AgentId) -> &[B256] {
        self.by_agent
            .get(&agent_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn validator_requests(&self, validator: Address) -> &[B256] {
        self.by_validator
            .get(&validator)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;

    fn status(validator: Address, agent: u64) -> ValidationStatus {
        ValidationStatus {
            validator,
            agent_id: U256::from(agent),
            request_uri: "ipfs://request".to_string(),
            response: 0,
            response_uri: String::new(),
            response_hash: B256::ZERO,
            tag: B256::ZERO,
            last_update: 0,
            has_response: false,
        }
    }

    #[test]
    fn test_insert_indexes_by_agent_and_validator() {
        let mut ledger = ValidationLedger::default();
        let v = Address::repeat_byte(0x0a);
        let (r1, r2) = (B256::repeat_byte(1), B256::repeat_byte(2));

        ledger.insert(r1, status(v, 1));
        ledger.insert(r2, status(v, 2));

        assert!(ledger.contains(&r1));
        assert_eq!(ledger.agent_requests(U256::from(1)), &[r1]);
        assert_eq!(ledger.agent_requests(U256::from(2)), &[r2]);
        assert_eq!(ledger.validator_requests(v), &[r1, r2]);
        assert!(ledger.validator_requests(Address::ZERO).is_empty());
    }
}
