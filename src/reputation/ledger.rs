use alloy::primitives::{Address, B256};
use std::collections::HashMap;

use crate::types::AgentId;

/// Responses appended to one feedback entry, in first-response order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseTally {
    responders: Vec<Address>,
    counts: HashMap<Address, u64>,
}

impl ResponseTally {
    pub fn record(&mut self, responder: Address) -> u64 {
        let count = self.counts.entry(responder).or_insert(0);
        if *count == 0 {
            self.responders.push(responder);
        }
        *count += 1;
        *count
    }

    pub fn responders(&self) -> &[Address] {
        &self.responders
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Responses from `responders`, or from everyone when the filter is empty
    pub fn count_from(&self, responders: &[Address]) -> u64 {
        if responders.is_empty() {
            return self.total();
        }
        responders
            .iter()
            .map(|r| self.counts.get(r).copied().unwrap_or(0))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackEntry {
    pub score: u8,
    pub tag1: B256,
    pub tag2: B256,
    pub file_uri: String,
    pub file_hash: B256,
    pub is_revoked: bool,
    pub responses: ResponseTally,
}

impl FeedbackEntry {
    pub fn response_count(&self) -> u64 {
        self.responses.total()
    }
}

/// Per-(agent, client) feedback lists plus each agent's distinct clients
///
/// Entries are stored 0-based and exposed 1-based: index `n` is `entries[n - 1]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackLedger {
    entries: HashMap<(AgentId, Address), Vec<FeedbackEntry>>,
    clients: HashMap<AgentId, Vec<Address>>,
}

impl FeedbackLedger {
    pub fn last_index(&self, agent_id: AgentId, client: Address) -> u64 {
        self.entries(agent_id, client).len() as u64
    }

    pub fn entries(&self, agent_id: AgentId, client: Address) -> &[FeedbackEntry] {
        self.entries
            .get(&(agent_id, client))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn entry(&self, agent_id: AgentId, client: Address, index: u64) -> Option<&FeedbackEntry> {
        let slot = usize::try_from(index.checked_sub(1)?).ok()?;
        self.entries.get(&(agent_id, client))?.get(slot)
    }

    pub fn entry_mut(
        &mut self,
        agent_id: AgentId,
        client: Address,
        index: u64,
    ) -> Option<&mut FeedbackEntry> {
        let slot = usize::try_from(index.checked_sub(1)?).ok()?;
        self.entries.get_mut(&(agent_id, client))?.get_mut(slot)
    }

    /// Append at `last_index + 1` and return that index
    pub fn append(&mut self, agent_id: AgentId, client: Address, entry: FeedbackEntry) -> u64 {
        let list = self.entries.entry((agent_id, client)).or_default();
        list.push(entry);
        let index = list.len() as u64;

        let clients = self.clients.entry(agent_id).or_default();
        if !clients.contains(&client) {
            clients.push(client);
        }

        index
    }

    /// Distinct clients of an agent in first-feedback order
    pub fn clients(&self, agent_id: AgentId) -> &[Address] {
        self.clients
            .get(&agent_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;

    fn entry(score: u8) -> FeedbackEntry {
        FeedbackEntry {
            score,
            tag1: B256::ZERO,
            tag2: B256::ZERO,
            file_uri: String::new(),
            file_hash: B256::ZERO,
            is_revoked: false,
            responses: ResponseTally::default(),
        }
    }

    #[test]
    fn test_indices_are_one_based_and_dense() {
        let mut ledger = FeedbackLedger::default();
        let agent = U256::from(1);
        let client = Address::repeat_byte(0xc1);

        assert_eq!(ledger.last_index(agent, client), 0);
        assert_eq!(ledger.append(agent, client, entry(10)), 1);
        assert_eq!(ledger.append(agent, client, entry(20)), 2);
        assert_eq!(ledger.append(agent, client, entry(30)), 3);

        assert!(ledger.entry(agent, client, 0).is_none());
        assert_eq!(ledger.entry(agent, client, 1).unwrap().score, 10);
        assert_eq!(ledger.entry(agent, client, 3).unwrap().score, 30);
        assert!(ledger.entry(agent, client, 4).is_none());
    }

    #[test]
    fn test_clients_keep_insertion_order_without_duplicates() {
        let mut ledger = FeedbackLedger::default();
        let agent = U256::from(1);
        let (a, b) = (Address::repeat_byte(0xaa), Address::repeat_byte(0xbb));

        ledger.append(agent, b, entry(1));
        ledger.append(agent, a, entry(2));
        ledger.append(agent, b, entry(3));

        assert_eq!(ledger.clients(agent), &[b, a]);
        assert!(ledger.clients(U256::from(2)).is_empty());
    }

    #[test]
    fn test_response_tally() {
        let mut tally = ResponseTally::default();
        let (a, b) = (Address::repeat_byte(0xaa), Address::repeat_byte(0xbb));

        assert_eq!(tally.record(a), 1);
        assert_eq!(tally.record(b), 1);
        assert_eq!(tally.record(a), 2);

        assert_eq!(tally.responders(), &[a, b]);
        assert_eq!(tally.total(), 3);
        assert_eq!(tally.count_from(&[a]), 2);
        assert_eq!(tally.count_from(&[b, Address::ZERO]), 1);
        assert_eq!(tally.count_from(&[]), 3);
    }
}
