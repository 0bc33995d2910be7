//! Filtered count/average over ledger entries
//!
//! Filters follow one rule everywhere: a zero tag or an empty allow-list is a
//! wildcard; anything else must match exactly.

use alloy::primitives::{Address, B256};
use serde::Serialize;

use crate::reputation::ledger::FeedbackLedger;
use crate::types::AgentId;
use crate::validation::ledger::ValidationLedger;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub count: u64,
    /// `floor(sum / count)`, 0 when nothing matched
    pub average: u8,
}

impl Summary {
    pub fn from_scores<I: IntoIterator<Item = u8>>(scores: I) -> Self {
        let (count, sum) = scores
            .into_iter()
            .fold((0u64, 0u64), |(count, sum), s| (count + 1, sum + u64::from(s)));

        let average = if count == 0 { 0 } else { (sum / count) as u8 };
        Self { count, average }
    }
}

fn tag_matches(filter: &B256, value: &B256) -> bool {
    filter.is_zero() || filter == value
}

/// Which feedback entries to include
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackQuery {
    /// Client allow-list; empty means every client of the agent
    pub clients: Vec<Address>,
    pub tag1: B256,
    pub tag2: B256,
    pub include_revoked: bool,
}

/// Matching feedback as parallel columns, in ledger order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackColumns {
    pub clients: Vec<Address>,
    pub indexes: Vec<u64>,
    pub scores: Vec<u8>,
    pub tag1s: Vec<B256>,
    pub tag2s: Vec<B256>,
    pub revoked: Vec<bool>,
}

impl FeedbackColumns {
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Clients to scan: the allow-list without duplicates, or all clients in insertion order
fn scan_clients(ledger: &FeedbackLedger, agent_id: AgentId, allow: &[Address]) -> Vec<Address> {
    if allow.is_empty() {
        return ledger.clients(agent_id).to_vec();
    }

    let mut clients = Vec::with_capacity(allow.len());
    for client in allow {
        if !clients.contains(client) {
            clients.push(*client);
        }
    }
    clients
}

pub fn read_all_feedback(
    ledger: &FeedbackLedger,
    agent_id: AgentId,
    query: &FeedbackQuery,
) -> FeedbackColumns {
    let mut columns = FeedbackColumns::default();

    for client in scan_clients(ledger, agent_id, &query.clients) {
        for (slot, entry) in ledger.entries(agent_id, client).iter().enumerate() {
            if entry.is_revoked && !query.include_revoked {
                continue;
            }
            if !tag_matches(&query.tag1, &entry.tag1) || !tag_matches(&query.tag2, &entry.tag2) {
                continue;
            }

            columns.clients.push(client);
            columns.indexes.push(slot as u64 + 1);
            columns.scores.push(entry.score);
            columns.tag1s.push(entry.tag1);
            columns.tag2s.push(entry.tag2);
            columns.revoked.push(entry.is_revoked);
        }
    }

    columns
}

pub fn feedback_summary(ledger: &FeedbackLedger, agent_id: AgentId, query: &FeedbackQuery) -> Summary {
    Summary::from_scores(read_all_feedback(ledger, agent_id, query).scores)
}

/// Answered validations of an agent, optionally restricted to some validators and a tag
pub fn validation_summary(
    ledger: &ValidationLedger,
    agent_id: AgentId,
    validators: &[Address],
    tag: B256,
) -> Summary {
    let responses = ledger
        .agent_requests(agent_id)
        .iter()
        .filter_map(|hash| ledger.status(hash))
        .filter(|s| s.has_response)
        .filter(|s| validators.is_empty() || validators.contains(&s.validator))
        .filter(|s| tag_matches(&tag, &s.tag))
        .map(|s| s.response);

    Summary::from_scores(responses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reputation::ledger::{FeedbackEntry, ResponseTally};
    use crate::validation::ledger::ValidationStatus;
    use alloy::primitives::U256;

    fn entry(score: u8, tag1: u8, revoked: bool) -> FeedbackEntry {
        FeedbackEntry {
            score,
            tag1: if tag1 == 0 { B256::ZERO } else { B256::repeat_byte(tag1) },
            tag2: B256::ZERO,
            file_uri: String::new(),
            file_hash: B256::ZERO,
            is_revoked: revoked,
            responses: ResponseTally::default(),
        }
    }

    #[test]
    fn test_empty_summary_is_zero() {
        assert_eq!(Summary::from_scores(Vec::<u8>::new()), Summary { count: 0, average: 0 });
    }

    #[test]
    fn test_average_of_80_90_100() {
        assert_eq!(
            Summary::from_scores([80, 90, 100]),
            Summary { count: 3, average: 90 }
        );
    }

    #[test]
    fn test_average_floors() {
        assert_eq!(Summary::from_scores([100, 99]).average, 99);
        assert_eq!(Summary::from_scores([0, 1]).average, 0);
    }

    #[test]
    fn test_feedback_filters() {
        let mut ledger = FeedbackLedger::default();
        let agent = U256::from(1);
        let (a, b) = (Address::repeat_byte(0xaa), Address::repeat_byte(0xbb));

        ledger.append(agent, a, entry(80, 1, false));
        ledger.append(agent, a, entry(10, 2, true));
        ledger.append(agent, b, entry(90, 1, false));
        ledger.append(agent, b, entry(100, 2, false));

        let all = FeedbackQuery::default();
        assert_eq!(
            feedback_summary(&ledger, agent, &all),
            Summary { count: 3, average: 90 }
        );

        let tagged = FeedbackQuery {
            tag1: B256::repeat_byte(1),
            ..Default::default()
        };
        assert_eq!(
            feedback_summary(&ledger, agent, &tagged),
            Summary { count: 2, average: 85 }
        );

        let only_a = FeedbackQuery {
            clients: vec![a, a],
            include_revoked: true,
            ..Default::default()
        };
        let columns = read_all_feedback(&ledger, agent, &only_a);
        assert_eq!(columns.scores, vec![80, 10]);
        assert_eq!(columns.indexes, vec![1, 2]);
        assert_eq!(columns.revoked, vec![false, true]);
    }

    #[test]
    fn test_read_all_preserves_ledger_order() {
        let mut ledger = FeedbackLedger::default();
        let agent = U256::from(1);
        let (a, b) = (Address::repeat_byte(0xaa), Address::repeat_byte(0xbb));

        ledger.append(agent, b, entry(1, 0, false));
        ledger.append(agent, a, entry(2, 0, false));
        ledger.append(agent, b, entry(3, 0, false));

        let columns = read_all_feedback(&ledger, agent, &FeedbackQuery::default());
        assert_eq!(columns.clients, vec![b, b, a]);
        assert_eq!(columns.scores, vec![1, 3, 2]);
        assert_eq!(columns.len(), 3);
    }

    #[test]
    fn test_validation_summary_counts_answered_only() {
        let mut ledger = ValidationLedger::default();
        let agent = U256::from(1);
        let (v1, v2) = (Address::repeat_byte(0x01), Address::repeat_byte(0x02));

        let make = |validator, response, has_response, tag: u8| ValidationStatus {
            validator,
            agent_id: agent,
            request_uri: String::new(),
            response,
            response_uri: String::new(),
            response_hash: B256::ZERO,
            tag: B256::repeat_byte(tag),
            last_update: 0,
            has_response,
        };

        ledger.insert(B256::repeat_byte(1), make(v1, 80, true, 7));
        ledger.insert(B256::repeat_byte(2), make(v2, 100, true, 8));
        ledger.insert(B256::repeat_byte(3), make(v2, 0, false, 7));

        assert_eq!(
            validation_summary(&ledger, agent, &[], B256::ZERO),
            Summary { count: 2, average: 90 }
        );
        assert_eq!(
            validation_summary(&ledger, agent, &[v2], B256::ZERO),
            Summary { count: 1, average: 100 }
        );
        assert_eq!(
            validation_summary(&ledger, agent, &[], B256::repeat_byte(7)),
            Summary { count: 1, average: 80 }
        );
        assert_eq!(
            validation_summary(&ledger, U256::from(2), &[], B256::ZERO),
            Summary::default()
        );
    }
}
