use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::devnet::Receipt;

/// Redis key prefix for the per-chain event list
const EVENTS_KEY_PREFIX: &str = "agent_registry:events:";

/// One committed event, as an EVM log plus its decoded fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: String,
    pub chain_id: u64,
    pub block: u64,
    pub tx_id: String,
    pub log_index: u64,
    pub timestamp: u64,
    pub address: String,
    pub event: String,
    pub topics: Vec<String>,
    pub data: String,
    pub fields: serde_json::Value,
}

impl EventRecord {
    /// Flatten a receipt into one record per event, in emission order
    pub fn from_receipt(chain_id: u64, receipt: &Receipt) -> Vec<Self> {
        receipt
            .events
            .iter()
            .enumerate()
            .map(|(log_index, event)| {
                let log = event.log_data();
                Self {
                    id: format!("evt_{}", uuid::Uuid::new_v4().simple()),
                    chain_id,
                    block: receipt.block,
                    tx_id: receipt.tx_id.clone(),
                    log_index: log_index as u64,
                    timestamp: receipt.timestamp,
                    address: format!("{:?}", receipt.to),
                    event: event.name().to_string(),
                    topics: log.topics().iter().map(|t| format!("{:?}", t)).collect(),
                    data: format!("0x{}", hex::encode(&log.data)),
                    fields: event.fields(),
                }
            })
            .collect()
    }
}

/// Append-only event journal with Redis backend and in-memory fallback
pub struct EventJournal {
    key: String,
    redis: Option<RwLock<redis::aio::ConnectionManager>>,
    /// Fallback in-memory journal when Redis is unavailable
    fallback: RwLock<Vec<EventRecord>>,
}

impl EventJournal {
    /// Create a new journal with Redis connection
    pub async fn new(chain_id: u64, redis_url: Option<&str>) -> Self {
        let redis = if let Some(url) = redis_url {
            match Client::open(url) {
                Ok(client) => match client.get_connection_manager().await {
                    Ok(conn) => {
                        info!("Connected to Redis at {}", url);
                        Some(RwLock::new(conn))
                    }
                    Err(e) => {
                        warn!("Failed to connect to Redis: {}. Using in-memory fallback.", e);
                        None
                    }
                },
                Err(e) => {
                    warn!("Invalid Redis URL: {}. Using in-memory fallback.", e);
                    None
                }
            }
        } else {
            info!("No Redis URL configured. Using in-memory journal.");
            None
        };

        Self {
            key: Self::make_key(chain_id),
            redis,
            fallback: RwLock::new(Vec::new()),
        }
    }

    /// Create a new in-memory only journal (for testing)
    pub fn in_memory(chain_id: u64) -> Self {
        Self {
            key: Self::make_key(chain_id),
            redis: None,
            fallback: RwLock::new(Vec::new()),
        }
    }

    fn make_key(chain_id: u64) -> String {
        format!("{}{}", EVENTS_KEY_PREFIX, chain_id)
    }

    /// Append records in order
    pub async fn append(&self, records: Vec<EventRecord>) {
        if records.is_empty() {
            return;
        }

        if let Some(redis) = &self.redis {
            let encoded: Result<Vec<String>, _> = records.iter().map(serde_json::to_string).collect();
            match encoded {
                Ok(values) => {
                    let mut conn = redis.write().await;
                    let result: Result<(), redis::RedisError> = conn.rpush(&self.key, values).await;
                    match result {
                        Ok(()) => {
                            debug!("Journaled {} events in Redis", records.len());
                            return;
                        }
                        Err(e) => error!("Redis RPUSH failed: {}. Storing in memory.", e),
                    }
                }
                Err(e) => error!("Failed to serialize events: {}", e),
            }
        }

        self.fallback.write().await.extend(records);
    }

    /// Records `offset..offset + limit`, oldest first
    pub async fn list(&self, offset: usize, limit: usize) -> Vec<EventRecord> {
        if limit == 0 {
            return Vec::new();
        }

        if let Some(redis) = &self.redis {
            let start = offset as isize;
            let stop = (offset + limit - 1) as isize;
            let mut conn = redis.write().await;
            let result: Result<Vec<String>, redis::RedisError> = conn.lrange(&self.key, start, stop).await;
            match result {
                Ok(values) => {
                    return values
                        .iter()
                        .filter_map(|json| match serde_json::from_str(json) {
                            Ok(record) => Some(record),
                            Err(e) => {
                                error!("Failed to deserialize event: {}", e);
                                None
                            }
                        })
                        .collect();
                }
                Err(e) => error!("Redis LRANGE failed: {}. Reading fallback.", e),
            }
        }

        self.fallback
            .read()
            .await
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        if let Some(redis) = &self.redis {
            let mut conn = redis.write().await;
            let result: Result<usize, redis::RedisError> = conn.llen(&self.key).await;
            match result {
                Ok(len) => return len,
                Err(e) => error!("Redis LLEN failed: {}. Reading fallback.", e),
            }
        }

        self.fallback.read().await.len()
    }

    /// Check if Redis is connected
    pub fn has_redis(&self) -> bool {
        self.redis.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RegistryEvent;
    use alloy::primitives::{Address, U256};

    fn receipt(block: u64) -> Receipt {
        Receipt {
            tx_id: format!("tx_{}", block),
            block,
            timestamp: 1_700_000_000 + block,
            to: Address::repeat_byte(0x8e),
            events: vec![
                RegistryEvent::FeedbackRevoked {
                    agent_id: U256::from(1),
                    client: Address::repeat_byte(0xc1),
                    index: block,
                },
                RegistryEvent::Initialized { version: 1 },
            ],
        }
    }

    #[test]
    fn test_records_from_receipt() {
        let records = EventRecord::from_receipt(31337, &receipt(7));

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event, "FeedbackRevoked");
        assert_eq!(records[0].topics.len(), 4);
        assert_eq!(records[0].data, "0x");
        assert_eq!(records[1].log_index, 1);
        assert_eq!(records[1].block, 7);
        assert_eq!(records[1].address, format!("{:?}", Address::repeat_byte(0x8e)));
    }

    #[tokio::test]
    async fn test_in_memory_append_and_page() {
        let journal = EventJournal::in_memory(31337);
        assert!(!journal.has_redis());

        for block in 1..=3 {
            journal.append(EventRecord::from_receipt(31337, &receipt(block))).await;
        }
        journal.append(Vec::new()).await;

        assert_eq!(journal.len().await, 6);
        let page = journal.list(2, 3).await;
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].block, 2);
        assert_eq!(page[2].block, 3);
        assert!(journal.list(10, 5).await.is_empty());
        assert!(journal.list(0, 0).await.is_empty());
    }
}
