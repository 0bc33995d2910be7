use alloy::primitives::{Address, LogData, B256, U256};
use alloy::sol_types::SolEvent;
use serde_json::json;

use crate::abi::{IReputationRegistry, IUpgradeable, IValidationRegistry};

/// Events produced by committed registry calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    NewFeedback {
        agent_id: U256,
        client: Address,
        index: u64,
        score: u8,
        tag1: B256,
        tag2: B256,
        file_uri: String,
        file_hash: B256,
    },
    FeedbackRevoked {
        agent_id: U256,
        client: Address,
        index: u64,
    },
    ResponseAppended {
        agent_id: U256,
        client: Address,
        index: u64,
        responder: Address,
        response_uri: String,
        response_hash: B256,
    },
    ValidationRequested {
        validator: Address,
        agent_id: U256,
        request_uri: String,
        request_hash: B256,
    },
    ValidationResponded {
        validator: Address,
        agent_id: U256,
        request_hash: B256,
        response: u8,
        response_uri: String,
        response_hash: B256,
        tag: B256,
    },
    Upgraded {
        implementation: Address,
    },
    Initialized {
        version: u64,
    },
    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
    },
}

impl RegistryEvent {
    /// Solidity event name
    pub fn name(&self) -> &'static str {
        match self {
            RegistryEvent::NewFeedback { .. } => "NewFeedback",
            RegistryEvent::FeedbackRevoked { .. } => "FeedbackRevoked",
            RegistryEvent::ResponseAppended { .. } => "ResponseAppended",
            RegistryEvent::ValidationRequested { .. } => "ValidationRequest",
            RegistryEvent::ValidationResponded { .. } => "ValidationResponse",
            RegistryEvent::Upgraded { .. } => "Upgraded",
            RegistryEvent::Initialized { .. } => "Initialized",
            RegistryEvent::OwnershipTransferred { .. } => "OwnershipTransferred",
        }
    }

    /// Encode as an EVM log (topics + ABI data), as an indexer would see it
    pub fn log_data(&self) -> LogData {
        match self.clone() {
            RegistryEvent::NewFeedback {
                agent_id,
                client,
                index,
                score,
                tag1,
                tag2,
                file_uri,
                file_hash,
            } => IReputationRegistry::NewFeedback {
                agentId: agent_id,
                clientAddress: client,
                feedbackIndex: index,
                score,
                tag1,
                tag2,
                fileuri: file_uri,
                filehash: file_hash,
            }
            .encode_log_data(),
            RegistryEvent::FeedbackRevoked {
                agent_id,
                client,
                index,
            } => IReputationRegistry::FeedbackRevoked {
                agentId: agent_id,
                clientAddress: client,
                feedbackIndex: index,
            }
            .encode_log_data(),
            RegistryEvent::ResponseAppended {
                agent_id,
                client,
                index,
                responder,
                response_uri,
                response_hash,
            } => IReputationRegistry::ResponseAppended {
                agentId: agent_id,
                clientAddress: client,
                feedbackIndex: index,
                responder,
                responseUri: response_uri,
                responseHash: response_hash,
            }
            .encode_log_data(),
            RegistryEvent::ValidationRequested {
                validator,
                agent_id,
                request_uri,
                request_hash,
            } => IValidationRegistry::ValidationRequest {
                validatorAddress: validator,
                agentId: agent_id,
                requestUri: request_uri,
                requestHash: request_hash,
            }
            .encode_log_data(),
            RegistryEvent::ValidationResponded {
                validator,
                agent_id,
                request_hash,
                response,
                response_uri,
                response_hash,
                tag,
            } => IValidationRegistry::ValidationResponse {
                validatorAddress: validator,
                agentId: agent_id,
                requestHash: request_hash,
                response,
                responseUri: response_uri,
                responseHash: response_hash,
                tag,
            }
            .encode_log_data(),
            RegistryEvent::Upgraded { implementation } => {
                IUpgradeable::Upgraded { implementation }.encode_log_data()
            }
            RegistryEvent::Initialized { version } => {
                IUpgradeable::Initialized { version }.encode_log_data()
            }
            RegistryEvent::OwnershipTransferred {
                previous_owner,
                new_owner,
            } => IUpgradeable::OwnershipTransferred {
                previousOwner: previous_owner,
                newOwner: new_owner,
            }
            .encode_log_data(),
        }
    }

    /// Decoded fields for the journal and API
    pub fn fields(&self) -> serde_json::Value {
        match self {
            RegistryEvent::NewFeedback {
                agent_id,
                client,
                index,
                score,
                tag1,
                tag2,
                file_uri,
                file_hash,
            } => json!({
                "agentId": agent_id.to_string(),
                "clientAddress": format!("{:?}", client),
                "feedbackIndex": index,
                "score": score,
                "tag1": format!("{:?}", tag1),
                "tag2": format!("{:?}", tag2),
                "fileUri": file_uri,
                "fileHash": format!("{:?}", file_hash),
            }),
            RegistryEvent::FeedbackRevoked {
                agent_id,
                client,
                index,
            } => json!({
                "agentId": agent_id.to_string(),
                "clientAddress": format!("{:?}", client),
                "feedbackIndex": index,
            }),
            RegistryEvent::ResponseAppended {
                agent_id,
                client,
                index,
                responder,
                response_uri,
                response_hash,
            } => json!({
                "agentId": agent_id.to_string(),
                "clientAddress": format!("{:?}", client),
                "feedbackIndex": index,
                "responder": format!("{:?}", responder),
                "responseUri": response_uri,
                "responseHash": format!("{:?}", response_hash),
            }),
            RegistryEvent::ValidationRequested {
                validator,
                agent_id,
                request_uri,
                request_hash,
            } => json!({
                "validatorAddress": format!("{:?}", validator),
                "agentId": agent_id.to_string(),
                "requestUri": request_uri,
                "requestHash": format!("{:?}", request_hash),
            }),
            RegistryEvent::ValidationResponded {
                validator,
                agent_id,
                request_hash,
                response,
                response_uri,
                response_hash,
                tag,
            } => json!({
                "validatorAddress": format!("{:?}", validator),
                "agentId": agent_id.to_string(),
                "requestHash": format!("{:?}", request_hash),
                "response": response,
                "responseUri": response_uri,
                "responseHash": format!("{:?}", response_hash),
                "tag": format!("{:?}", tag),
            }),
            RegistryEvent::Upgraded { implementation } => json!({
                "implementation": format!("{:?}", implementation),
            }),
            RegistryEvent::Initialized { version } => json!({ "version": version }),
            RegistryEvent::OwnershipTransferred {
                previous_owner,
                new_owner,
            } => json!({
                "previousOwner": format!("{:?}", previous_owner),
                "newOwner": format!("{:?}", new_owner),
            }),
        }
    }
}
