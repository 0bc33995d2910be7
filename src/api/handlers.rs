use alloy::primitives::{Address, Bytes, B256, U256};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::aggregate::{FeedbackQuery, Summary};
use crate::auth::FeedbackAuthorization;
use crate::chains::{get_chain, supported_chain_ids};
use crate::devnet::{Receipt, RegistryKind, RegistryStatus};
use crate::identity::IdentityLookup;
use crate::reputation::NewFeedback;
use crate::store::EventRecord;
use crate::types::{AgentId, RegistryError};
use crate::validation::ValidationAnswer;
use crate::AppState;

/// Default lifetime of a dev-signed feedback authorization
const DEFAULT_AUTH_TTL_SECONDS: u64 = 3600;

// =============================================================================
// PARSING HELPERS
// =============================================================================

fn parse_address(field: &str, value: &str) -> Result<Address, RegistryError> {
    value
        .trim()
        .parse()
        .map_err(|_| RegistryError::InvalidAddress(format!("{}: '{}'", field, value)))
}

/// Optional 32-byte hex value; missing or empty means zero
fn parse_b256(field: &str, value: Option<&str>) -> Result<B256, RegistryError> {
    match value.map(str::trim) {
        None | Some("") => Ok(B256::ZERO),
        Some(v) => v.parse().map_err(|_| {
            RegistryError::InvalidRequest(format!("{} must be 32 bytes of hex, got '{}'", field, v))
        }),
    }
}

fn parse_hex_bytes(field: &str, value: &str) -> Result<Bytes, RegistryError> {
    let value = value.trim();
    hex::decode(value.strip_prefix("0x").unwrap_or(value))
        .map(Bytes::from)
        .map_err(|e| RegistryError::InvalidRequest(format!("{} is not valid hex: {}", field, e)))
}

/// Comma-separated addresses; missing or empty means an empty list
fn parse_address_list(field: &str, value: Option<&str>) -> Result<Vec<Address>, RegistryError> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_address(field, s))
        .collect()
}

fn parse_registry(registry: &str) -> Result<RegistryKind, RegistryError> {
    RegistryKind::parse(registry).ok_or_else(|| {
        RegistryError::InvalidRequest(format!(
            "Unknown registry '{}'. Expected 'reputation' or 'validation'",
            registry
        ))
    })
}

/// Scores and validation responses are 0-100
fn parse_score(value: u64) -> Result<u8, RegistryError> {
    if value > 100 {
        return Err(RegistryError::ScoreOutOfRange(value));
    }
    u8::try_from(value).map_err(|_| RegistryError::ScoreOutOfRange(value))
}

/// Log a rejected call and pass the error through
fn rejected(op: &'static str, from: Address) -> impl FnOnce(RegistryError) -> RegistryError {
    move |e| {
        warn!("{} from {:?} rejected: {}", op, from, e);
        e
    }
}

// =============================================================================
// RESPONSES
// =============================================================================

/// A committed transaction and the events it emitted
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxResponse {
    pub tx_id: String,
    pub block: u64,
    pub timestamp: u64,
    pub to: String,
    pub events: Vec<EventRecord>,
}

/// Journal a receipt's events; call while still holding the chain lock so
/// journal order matches block order
async fn commit(state: &AppState, receipt: Receipt) -> TxResponse {
    let records = EventRecord::from_receipt(state.config.chain_id, &receipt);
    state.journal.append(records.clone()).await;

    TxResponse {
        tx_id: receipt.tx_id,
        block: receipt.block,
        timestamp: receipt.timestamp,
        to: format!("{:?}", receipt.to),
        events: records,
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub agent_id: String,
    pub count: u64,
    pub average: u8,
}

impl SummaryResponse {
    fn new(agent_id: AgentId, summary: Summary) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            count: summary.count,
            average: summary.average,
        }
    }
}

// =============================================================================
// HEALTH
// =============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub chain_id: u64,
    pub chain_name: String,
    pub testnet: bool,
    pub supported_chains: Vec<u64>,
    pub block_number: u64,
    pub total_agents: usize,
    pub identity_registry: String,
    pub reputation_registry: String,
    pub validation_registry: String,
    pub storage: String,
    pub key_mode: String,
    pub dev_accounts: usize,
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let chain = state.chain.read().await;
    let profile = get_chain(chain.chain_id());

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        chain_id: chain.chain_id(),
        chain_name: profile.map(|c| c.name.to_string()).unwrap_or_default(),
        testnet: profile.is_some_and(|c| c.is_testnet),
        supported_chains: supported_chain_ids(),
        block_number: chain.block_number(),
        total_agents: chain.identity().total_supply(),
        identity_registry: format!("{:?}", chain.identity_address()),
        reputation_registry: format!("{:?}", chain.registry_address(RegistryKind::Reputation)),
        validation_registry: format!("{:?}", chain.registry_address(RegistryKind::Validation)),
        storage: if state.journal.has_redis() {
            "redis".to_string()
        } else {
            "memory".to_string()
        },
        key_mode: state.config.key_mode().as_str().to_string(),
        dev_accounts: state.config.dev_accounts.len(),
    })
}

// =============================================================================
// IDENTITY
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    pub from: String,
    #[serde(default)]
    pub uri: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRegisteredResponse {
    pub agent_id: String,
    pub owner: String,
    pub tx: TxResponse,
}

/// POST /identity/agents - Mint a new agent to `from`
pub async fn register_agent(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterAgentRequest>,
) -> Result<(StatusCode, Json<AgentRegisteredResponse>), RegistryError> {
    let from = parse_address("from", &request.from)?;

    let mut chain = state.chain.write().await;
    let (agent_id, receipt) = chain
        .register_agent(from, &request.uri)
        .map_err(rejected("register", from))?;
    let tx = commit(&state, receipt).await;

    Ok((
        StatusCode::CREATED,
        Json(AgentRegisteredResponse {
            agent_id: agent_id.to_string(),
            owner: format!("{:?}", from),
            tx,
        }),
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResponse {
    pub agent_id: String,
    pub owner: String,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved: Option<String>,
}

/// GET /identity/agents/:agent_id
pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<u64>,
) -> Result<Json<AgentResponse>, RegistryError> {
    let agent_id = U256::from(agent_id);
    let chain = state.chain.read().await;
    let identity = chain.identity();

    Ok(Json(AgentResponse {
        agent_id: agent_id.to_string(),
        owner: format!("{:?}", identity.owner_of(agent_id)?),
        uri: identity.token_uri(agent_id)?.to_string(),
        approved: identity.get_approved(agent_id).map(|a| format!("{:?}", a)),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SetAgentUriRequest {
    pub from: String,
    pub uri: String,
}

/// PUT /identity/agents/:agent_id/uri
pub async fn set_agent_uri(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<u64>,
    Json(request): Json<SetAgentUriRequest>,
) -> Result<Json<TxResponse>, RegistryError> {
    let from = parse_address("from", &request.from)?;

    let mut chain = state.chain.write().await;
    let receipt = chain
        .set_agent_uri(from, U256::from(agent_id), &request.uri)
        .map_err(rejected("setAgentUri", from))?;

    Ok(Json(commit(&state, receipt).await))
}

#[derive(Serialize)]
pub struct MetadataResponse {
    pub key: String,
    pub value: String,
}

/// GET /identity/agents/:agent_id/metadata/:key
pub async fn get_metadata(
    State(state): State<Arc<AppState>>,
    Path((agent_id, key)): Path<(u64, String)>,
) -> Result<Json<MetadataResponse>, RegistryError> {
    let chain = state.chain.read().await;
    let value = chain.identity().get_metadata(U256::from(agent_id), &key)?;

    Ok(Json(MetadataResponse {
        key,
        value: format!("0x{}", hex::encode(&value)),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SetMetadataRequest {
    pub from: String,
    /// Hex-encoded bytes
    pub value: String,
}

/// PUT /identity/agents/:agent_id/metadata/:key
pub async fn set_metadata(
    State(state): State<Arc<AppState>>,
    Path((agent_id, key)): Path<(u64, String)>,
    Json(request): Json<SetMetadataRequest>,
) -> Result<Json<TxResponse>, RegistryError> {
    let from = parse_address("from", &request.from)?;
    let value = parse_hex_bytes("value", &request.value)?;

    let mut chain = state.chain.write().await;
    let receipt = chain
        .set_metadata(from, U256::from(agent_id), &key, value)
        .map_err(rejected("setMetadata", from))?;

    Ok(Json(commit(&state, receipt).await))
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub from: String,
    /// Zero address clears the approval
    pub spender: String,
}

/// POST /identity/agents/:agent_id/approve
pub async fn approve(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<u64>,
    Json(request): Json<ApproveRequest>,
) -> Result<Json<TxResponse>, RegistryError> {
    let from = parse_address("from", &request.from)?;
    let spender = parse_address("spender", &request.spender)?;

    let mut chain = state.chain.write().await;
    let receipt = chain
        .approve(from, spender, U256::from(agent_id))
        .map_err(rejected("approve", from))?;

    Ok(Json(commit(&state, receipt).await))
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub from: String,
    /// Current owner; defaults to `from`
    pub owner: Option<String>,
    pub to: String,
}

/// POST /identity/agents/:agent_id/transfer
pub async fn transfer_agent(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<u64>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<TxResponse>, RegistryError> {
    let from = parse_address("from", &request.from)?;
    let owner = match request.owner.as_deref() {
        Some(owner) => parse_address("owner", owner)?,
        None => from,
    };
    let to = parse_address("to", &request.to)?;

    let mut chain = state.chain.write().await;
    let receipt = chain
        .transfer_agent(from, owner, to, U256::from(agent_id))
        .map_err(rejected("transferFrom", from))?;

    Ok(Json(commit(&state, receipt).await))
}

#[derive(Debug, Deserialize)]
pub struct SetOperatorRequest {
    pub from: String,
    pub operator: String,
    pub approved: bool,
}

/// POST /identity/operators - setApprovalForAll
pub async fn set_approval_for_all(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SetOperatorRequest>,
) -> Result<Json<TxResponse>, RegistryError> {
    let from = parse_address("from", &request.from)?;
    let operator = parse_address("operator", &request.operator)?;

    let mut chain = state.chain.write().await;
    let receipt = chain
        .set_approval_for_all(from, operator, request.approved)
        .map_err(rejected("setApprovalForAll", from))?;

    Ok(Json(commit(&state, receipt).await))
}

// =============================================================================
// REPUTATION
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiveFeedbackRequest {
    pub from: String,
    pub agent_id: u64,
    pub score: u64,
    pub tag1: Option<String>,
    pub tag2: Option<String>,
    #[serde(default)]
    pub file_uri: String,
    pub file_hash: Option<String>,
    /// Hex-encoded capability blob (header + signature)
    pub feedback_auth: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackGivenResponse {
    pub feedback_index: u64,
    pub tx: TxResponse,
}

/// POST /reputation/feedback - giveFeedback, with `from` as the client
pub async fn give_feedback(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GiveFeedbackRequest>,
) -> Result<(StatusCode, Json<FeedbackGivenResponse>), RegistryError> {
    let from = parse_address("from", &request.from)?;
    let feedback = NewFeedback {
        agent_id: U256::from(request.agent_id),
        score: parse_score(request.score)?,
        tag1: parse_b256("tag1", request.tag1.as_deref())?,
        tag2: parse_b256("tag2", request.tag2.as_deref())?,
        file_uri: request.file_uri,
        file_hash: parse_b256("fileHash", request.file_hash.as_deref())?,
        feedback_auth: parse_hex_bytes("feedbackAuth", &request.feedback_auth)?,
    };

    let mut chain = state.chain.write().await;
    let (feedback_index, receipt) = chain
        .give_feedback(from, feedback)
        .map_err(rejected("giveFeedback", from))?;
    let tx = commit(&state, receipt).await;

    Ok((
        StatusCode::CREATED,
        Json(FeedbackGivenResponse { feedback_index, tx }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeFeedbackRequest {
    pub from: String,
    pub agent_id: u64,
    pub feedback_index: u64,
}

/// POST /reputation/feedback/revoke
pub async fn revoke_feedback(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RevokeFeedbackRequest>,
) -> Result<Json<TxResponse>, RegistryError> {
    let from = parse_address("from", &request.from)?;

    let mut chain = state.chain.write().await;
    let receipt = chain
        .revoke_feedback(from, U256::from(request.agent_id), request.feedback_index)
        .map_err(rejected("revokeFeedback", from))?;

    Ok(Json(commit(&state, receipt).await))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendResponseRequest {
    pub from: String,
    pub agent_id: u64,
    pub client_address: String,
    pub feedback_index: u64,
    pub response_uri: String,
    pub response_hash: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseAppendedResponse {
    /// Responses from `from` to this entry so far
    pub response_count: u64,
    pub tx: TxResponse,
}

/// POST /reputation/feedback/responses - appendResponse
pub async fn append_response(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AppendResponseRequest>,
) -> Result<Json<ResponseAppendedResponse>, RegistryError> {
    let from = parse_address("from", &request.from)?;
    let client = parse_address("clientAddress", &request.client_address)?;
    let response_hash = parse_b256("responseHash", request.response_hash.as_deref())?;

    let mut chain = state.chain.write().await;
    let (response_count, receipt) = chain
        .append_response(
            from,
            U256::from(request.agent_id),
            client,
            request.feedback_index,
            request.response_uri,
            response_hash,
        )
        .map_err(rejected("appendResponse", from))?;
    let tx = commit(&state, receipt).await;

    Ok(Json(ResponseAppendedResponse { response_count, tx }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientsResponse {
    pub agent_id: String,
    pub clients: Vec<String>,
}

/// GET /reputation/agents/:agent_id/clients
pub async fn get_clients(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<u64>,
) -> Result<Json<ClientsResponse>, RegistryError> {
    let agent_id = U256::from(agent_id);
    let chain = state.chain.read().await;
    let clients = chain.clients(agent_id)?;

    Ok(Json(ClientsResponse {
        agent_id: agent_id.to_string(),
        clients: clients.iter().map(|c| format!("{:?}", c)).collect(),
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastIndexResponse {
    pub last_index: u64,
}

/// GET /reputation/agents/:agent_id/clients/:client/last-index
pub async fn get_last_index(
    State(state): State<Arc<AppState>>,
    Path((agent_id, client)): Path<(u64, String)>,
) -> Result<Json<LastIndexResponse>, RegistryError> {
    let client = parse_address("client", &client)?;
    let chain = state.chain.read().await;

    Ok(Json(LastIndexResponse {
        last_index: chain.last_index(U256::from(agent_id), client)?,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResponse {
    pub score: u8,
    pub tag1: String,
    pub tag2: String,
    pub file_uri: String,
    pub file_hash: String,
    pub is_revoked: bool,
    pub response_count: u64,
    pub responders: Vec<String>,
}

/// GET /reputation/agents/:agent_id/clients/:client/feedback/:index - readFeedback
pub async fn read_feedback(
    State(state): State<Arc<AppState>>,
    Path((agent_id, client, index)): Path<(u64, String, u64)>,
) -> Result<Json<FeedbackResponse>, RegistryError> {
    let agent_id = U256::from(agent_id);
    let client = parse_address("client", &client)?;
    let chain = state.chain.read().await;

    let view = chain.read_feedback(agent_id, client, index)?;
    let responders = chain.responders(agent_id, client, index)?;

    Ok(Json(FeedbackResponse {
        score: view.score,
        tag1: format!("{:?}", view.tag1),
        tag2: format!("{:?}", view.tag2),
        file_uri: view.file_uri,
        file_hash: format!("{:?}", view.file_hash),
        is_revoked: view.is_revoked,
        response_count: view.response_count,
        responders: responders.iter().map(|r| format!("{:?}", r)).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ResponseCountQuery {
    /// Omitted or zero address counts every client
    pub client: Option<String>,
    /// Omitted or zero counts every index
    #[serde(default)]
    pub index: u64,
    /// Comma-separated responder filter; empty counts everyone
    pub responders: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseCountResponse {
    pub response_count: u64,
}

/// GET /reputation/agents/:agent_id/response-count
pub async fn get_response_count(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<u64>,
    Query(query): Query<ResponseCountQuery>,
) -> Result<Json<ResponseCountResponse>, RegistryError> {
    let client = match query.client.as_deref() {
        Some(c) if !c.trim().is_empty() => parse_address("client", c)?,
        _ => Address::ZERO,
    };
    let responders = parse_address_list("responders", query.responders.as_deref())?;

    let chain = state.chain.read().await;
    Ok(Json(ResponseCountResponse {
        response_count: chain.response_count(U256::from(agent_id), client, query.index, &responders)?,
    }))
}

#[derive(Debug, Deserialize)]
pub struct FeedbackFilterQuery {
    /// Comma-separated client allow-list; empty means all clients
    pub clients: Option<String>,
    pub tag1: Option<String>,
    pub tag2: Option<String>,
    #[serde(default)]
    pub include_revoked: bool,
}

/// GET /reputation/agents/:agent_id/summary - getSummary (revoked entries excluded)
pub async fn get_feedback_summary(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<u64>,
    Query(query): Query<FeedbackFilterQuery>,
) -> Result<Json<SummaryResponse>, RegistryError> {
    let agent_id = U256::from(agent_id);
    let clients = parse_address_list("clients", query.clients.as_deref())?;
    let tag1 = parse_b256("tag1", query.tag1.as_deref())?;
    let tag2 = parse_b256("tag2", query.tag2.as_deref())?;

    let chain = state.chain.read().await;
    let summary = chain.feedback_summary(agent_id, &clients, tag1, tag2)?;

    Ok(Json(SummaryResponse::new(agent_id, summary)))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllFeedbackResponse {
    pub count: usize,
    pub clients: Vec<String>,
    pub feedback_indexes: Vec<u64>,
    pub scores: Vec<u8>,
    pub tag1s: Vec<String>,
    pub tag2s: Vec<String>,
    pub revoked_statuses: Vec<bool>,
}

/// GET /reputation/agents/:agent_id/feedback - readAllFeedback
pub async fn read_all_feedback(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<u64>,
    Query(query): Query<FeedbackFilterQuery>,
) -> Result<Json<AllFeedbackResponse>, RegistryError> {
    let filter = FeedbackQuery {
        clients: parse_address_list("clients", query.clients.as_deref())?,
        tag1: parse_b256("tag1", query.tag1.as_deref())?,
        tag2: parse_b256("tag2", query.tag2.as_deref())?,
        include_revoked: query.include_revoked,
    };

    let chain = state.chain.read().await;
    let columns = chain.read_all_feedback(U256::from(agent_id), &filter)?;

    Ok(Json(AllFeedbackResponse {
        count: columns.len(),
        clients: columns.clients.iter().map(|c| format!("{:?}", c)).collect(),
        feedback_indexes: columns.indexes,
        scores: columns.scores,
        tag1s: columns.tag1s.iter().map(|t| format!("{:?}", t)).collect(),
        tag2s: columns.tag2s.iter().map(|t| format!("{:?}", t)).collect(),
        revoked_statuses: columns.revoked,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationUsesResponse {
    pub message_hash: String,
    pub uses: u64,
}

/// GET /reputation/authorizations/:message_hash - consumed uses of a capability
pub async fn get_authorization_uses(
    State(state): State<Arc<AppState>>,
    Path(message_hash): Path<String>,
) -> Result<Json<AuthorizationUsesResponse>, RegistryError> {
    let capability = parse_b256("messageHash", Some(message_hash.as_str()))?;
    let chain = state.chain.read().await;

    Ok(Json(AuthorizationUsesResponse {
        message_hash: format!("{:?}", capability),
        uses: chain.authorization_uses(capability)?,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRegistryResponse {
    pub identity_registry: String,
}

/// GET /reputation/identity-registry and /validation/identity-registry
async fn bound_identity_registry(
    state: &AppState,
    kind: RegistryKind,
) -> Result<Json<IdentityRegistryResponse>, RegistryError> {
    let chain = state.chain.read().await;
    let status = chain.registry_status(kind)?;

    Ok(Json(IdentityRegistryResponse {
        identity_registry: status.identity_registry,
    }))
}

pub async fn reputation_identity_registry(
    State(state): State<Arc<AppState>>,
) -> Result<Json<IdentityRegistryResponse>, RegistryError> {
    bound_identity_registry(&state, RegistryKind::Reputation).await
}

pub async fn validation_identity_registry(
    State(state): State<Arc<AppState>>,
) -> Result<Json<IdentityRegistryResponse>, RegistryError> {
    bound_identity_registry(&state, RegistryKind::Validation).await
}

// =============================================================================
// VALIDATION
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequestBody {
    pub from: String,
    pub validator_address: String,
    pub agent_id: u64,
    #[serde(default)]
    pub request_uri: String,
    pub request_hash: String,
}

/// POST /validation/requests - validationRequest, `from` must own the agent
pub async fn validation_request(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ValidationRequestBody>,
) -> Result<(StatusCode, Json<TxResponse>), RegistryError> {
    let from = parse_address("from", &request.from)?;
    let validator = parse_address("validatorAddress", &request.validator_address)?;
    let request_hash = parse_b256("requestHash", Some(request.request_hash.as_str()))?;

    let mut chain = state.chain.write().await;
    let receipt = chain
        .validation_request(
            from,
            validator,
            U256::from(request.agent_id),
            request.request_uri,
            request_hash,
        )
        .map_err(rejected("validationRequest", from))?;

    Ok((StatusCode::CREATED, Json(commit(&state, receipt).await)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResponseBody {
    pub from: String,
    pub request_hash: String,
    pub response: u64,
    #[serde(default)]
    pub response_uri: String,
    pub response_hash: Option<String>,
    pub tag: Option<String>,
}

/// POST /validation/responses - validationResponse, `from` must be the validator
pub async fn validation_response(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ValidationResponseBody>,
) -> Result<Json<TxResponse>, RegistryError> {
    let from = parse_address("from", &request.from)?;
    let answer = ValidationAnswer {
        request_hash: parse_b256("requestHash", Some(request.request_hash.as_str()))?,
        response: parse_score(request.response)?,
        response_uri: request.response_uri,
        response_hash: parse_b256("responseHash", request.response_hash.as_deref())?,
        tag: parse_b256("tag", request.tag.as_deref())?,
    };

    let mut chain = state.chain.write().await;
    let receipt = chain
        .validation_response(from, answer)
        .map_err(rejected("validationResponse", from))?;

    Ok(Json(commit(&state, receipt).await))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStatusResponse {
    pub validator_address: String,
    pub agent_id: String,
    pub request_uri: String,
    pub response: u8,
    pub response_uri: String,
    pub response_hash: String,
    pub tag: String,
    pub last_update: u64,
    pub has_response: bool,
}

/// GET /validation/requests/:request_hash - getValidationStatus
pub async fn get_validation_status(
    State(state): State<Arc<AppState>>,
    Path(request_hash): Path<String>,
) -> Result<Json<ValidationStatusResponse>, RegistryError> {
    let request_hash = parse_b256("requestHash", Some(request_hash.as_str()))?;
    let chain = state.chain.read().await;
    let status = chain.validation_status(request_hash)?;

    Ok(Json(ValidationStatusResponse {
        validator_address: format!("{:?}", status.validator),
        agent_id: status.agent_id.to_string(),
        request_uri: status.request_uri,
        response: status.response,
        response_uri: status.response_uri,
        response_hash: format!("{:?}", status.response_hash),
        tag: format!("{:?}", status.tag),
        last_update: status.last_update,
        has_response: status.has_response,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestHashesResponse {
    pub request_hashes: Vec<String>,
}

impl RequestHashesResponse {
    fn new(hashes: Vec<B256>) -> Self {
        Self {
            request_hashes: hashes.iter().map(|h| format!("{:?}", h)).collect(),
        }
    }
}

/// GET /validation/agents/:agent_id/requests - getAgentValidations
pub async fn get_agent_validations(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<u64>,
) -> Result<Json<RequestHashesResponse>, RegistryError> {
    let chain = state.chain.read().await;
    Ok(Json(RequestHashesResponse::new(
        chain.agent_validations(U256::from(agent_id))?,
    )))
}

/// GET /validation/validators/:validator/requests - getValidatorRequests
pub async fn get_validator_requests(
    State(state): State<Arc<AppState>>,
    Path(validator): Path<String>,
) -> Result<Json<RequestHashesResponse>, RegistryError> {
    let validator = parse_address("validator", &validator)?;
    let chain = state.chain.read().await;
    Ok(Json(RequestHashesResponse::new(chain.validator_requests(validator)?)))
}

#[derive(Debug, Deserialize)]
pub struct ValidationSummaryQuery {
    /// Comma-separated validator allow-list; empty means all validators
    pub validators: Option<String>,
    pub tag: Option<String>,
}

/// GET /validation/agents/:agent_id/summary - answered requests only
pub async fn get_validation_summary(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<u64>,
    Query(query): Query<ValidationSummaryQuery>,
) -> Result<Json<SummaryResponse>, RegistryError> {
    let agent_id = U256::from(agent_id);
    let validators = parse_address_list("validators", query.validators.as_deref())?;
    let tag = parse_b256("tag", query.tag.as_deref())?;

    let chain = state.chain.read().await;
    let summary = chain.validation_summary(agent_id, &validators, tag)?;

    Ok(Json(SummaryResponse::new(agent_id, summary)))
}

// =============================================================================
// EVENTS
// =============================================================================

#[derive(Deserialize)]
pub struct ListEventsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub events: Vec<EventRecord>,
}

/// GET /events - journaled events, oldest first
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListEventsQuery>,
) -> Json<EventsResponse> {
    let limit = query.limit.min(500);

    Json(EventsResponse {
        total: state.journal.len().await,
        offset: query.offset,
        limit,
        events: state.journal.list(query.offset, limit).await,
    })
}

// =============================================================================
// DEV ENDPOINTS
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountsResponse {
    pub key_mode: String,
    pub accounts: Vec<String>,
}

/// GET /dev/accounts - unlocked dev accounts
pub async fn list_accounts(State(state): State<Arc<AppState>>) -> Json<AccountsResponse> {
    Json(AccountsResponse {
        key_mode: state.config.key_mode().as_str().to_string(),
        accounts: state
            .config
            .dev_accounts
            .addresses()
            .iter()
            .map(|a| format!("{:?}", a))
            .collect(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackAuthRequest {
    /// Unlocked dev account that signs; also the embedded signerAddress unless `signerAddress` is set
    pub signer: String,
    /// Contract signer to embed (ERC-1271), when `signer` is its owner key
    pub signer_address: Option<String>,
    pub agent_id: u64,
    pub client_address: String,
    pub use_limit: u64,
    /// Absolute expiry; defaults to now + ttlSeconds
    pub expiry: Option<u64>,
    pub ttl_seconds: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackAuthResponse {
    pub feedback_auth: String,
    pub message_hash: String,
    pub signer_address: String,
    pub identity_registry: String,
    pub chain_id: u64,
    pub expiry: u64,
    pub use_limit: u64,
}

/// POST /dev/feedback-auth - Sign a feedback authorization with a dev account
pub async fn sign_feedback_auth(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FeedbackAuthRequest>,
) -> Result<Json<FeedbackAuthResponse>, RegistryError> {
    let signer_address = parse_address("signer", &request.signer)?;
    let signer = state
        .config
        .dev_accounts
        .signer(signer_address)
        .ok_or_else(|| {
            RegistryError::InvalidRequest(format!(
                "{:?} is not an unlocked dev account",
                signer_address
            ))
        })?;
    let embedded = match request.signer_address.as_deref() {
        Some(a) => parse_address("signerAddress", a)?,
        None => signer_address,
    };
    let client = parse_address("clientAddress", &request.client_address)?;

    let chain = state.chain.read().await;
    let expiry = request.expiry.unwrap_or_else(|| {
        chain.now() + request.ttl_seconds.unwrap_or(DEFAULT_AUTH_TTL_SECONDS)
    });
    let header = chain.feedback_auth_header(
        U256::from(request.agent_id),
        client,
        request.use_limit,
        expiry,
        embedded,
    )?;
    let identity_registry = header.identityRegistry;
    let auth = FeedbackAuthorization::sign(header, signer)?;

    info!(
        "Signed feedback authorization for agent {} / client {:?} by {:?} (limit {}, expiry {})",
        request.agent_id, client, signer_address, request.use_limit, expiry
    );

    Ok(Json(FeedbackAuthResponse {
        feedback_auth: format!("0x{}", hex::encode(auth.encode())),
        message_hash: format!("{:?}", auth.message_hash()),
        signer_address: format!("{:?}", embedded),
        identity_registry: format!("{:?}", identity_registry),
        chain_id: chain.chain_id(),
        expiry,
        use_limit: request.use_limit,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SmartAccountRequest {
    pub from: String,
    pub owner: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedResponse {
    pub address: String,
    pub tx: TxResponse,
}

/// POST /dev/smart-accounts - Deploy a single-owner ERC-1271 account
pub async fn deploy_smart_account(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SmartAccountRequest>,
) -> Result<(StatusCode, Json<DeployedResponse>), RegistryError> {
    let from = parse_address("from", &request.from)?;
    let owner = parse_address("owner", &request.owner)?;

    let mut chain = state.chain.write().await;
    let (address, receipt) = chain.deploy_smart_account(from, owner);
    let tx = commit(&state, receipt).await;

    Ok((
        StatusCode::CREATED,
        Json(DeployedResponse {
            address: format!("{:?}", address),
            tx,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct WarpRequest {
    pub timestamp: u64,
}

#[derive(Serialize)]
pub struct WarpResponse {
    pub timestamp: u64,
}

/// POST /dev/warp - Pin the block timestamp
pub async fn warp(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WarpRequest>,
) -> Json<WarpResponse> {
    let mut chain = state.chain.write().await;
    chain.warp(request.timestamp);

    Json(WarpResponse {
        timestamp: chain.now(),
    })
}

// =============================================================================
// ADMIN ENDPOINTS (protected by ADMIN_API_KEY)
// =============================================================================

/// GET /admin/registries/:registry - Proxy status
pub async fn registry_status(
    State(state): State<Arc<AppState>>,
    Path(registry): Path<String>,
) -> Result<Json<RegistryStatus>, RegistryError> {
    let kind = parse_registry(&registry)?;
    let chain = state.chain.read().await;
    Ok(Json(chain.registry_status(kind)?))
}

#[derive(Debug, Deserialize)]
pub struct FromRequest {
    pub from: String,
}

/// POST /admin/registries/:registry/implementations - Deploy a fresh implementation
pub async fn deploy_implementation(
    State(state): State<Arc<AppState>>,
    Path(registry): Path<String>,
    Json(request): Json<FromRequest>,
) -> Result<(StatusCode, Json<DeployedResponse>), RegistryError> {
    let kind = parse_registry(&registry)?;
    let from = parse_address("from", &request.from)?;

    let mut chain = state.chain.write().await;
    let (address, receipt) = chain.deploy_implementation(from, kind);
    let tx = commit(&state, receipt).await;

    Ok((
        StatusCode::CREATED,
        Json(DeployedResponse {
            address: format!("{:?}", address),
            tx,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct UpgradeRequest {
    pub from: String,
    pub implementation: String,
    /// Run the new implementation's migration
    #[serde(default)]
    pub migrate: bool,
}

/// POST /admin/registries/:registry/upgrade - upgradeToAndCall
pub async fn upgrade(
    State(state): State<Arc<AppState>>,
    Path(registry): Path<String>,
    Json(request): Json<UpgradeRequest>,
) -> Result<Json<TxResponse>, RegistryError> {
    let kind = parse_registry(&registry)?;
    let from = parse_address("from", &request.from)?;
    let implementation = parse_address("implementation", &request.implementation)?;

    let mut chain = state.chain.write().await;
    let receipt = chain
        .upgrade(kind, from, implementation, request.migrate)
        .map_err(rejected("upgradeToAndCall", from))?;

    Ok(Json(commit(&state, receipt).await))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequest {
    pub from: String,
    pub identity_registry: String,
}

/// POST /admin/registries/:registry/initialize
pub async fn initialize(
    State(state): State<Arc<AppState>>,
    Path(registry): Path<String>,
    Json(request): Json<InitializeRequest>,
) -> Result<Json<TxResponse>, RegistryError> {
    let kind = parse_registry(&registry)?;
    let from = parse_address("from", &request.from)?;
    let identity_registry = parse_address("identityRegistry", &request.identity_registry)?;

    let mut chain = state.chain.write().await;
    let receipt = chain
        .initialize(kind, from, identity_registry)
        .map_err(rejected("initialize", from))?;

    Ok(Json(commit(&state, receipt).await))
}

/// POST /admin/implementations/:address/initialize - initialize a code unit directly
pub async fn initialize_implementation(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Json(request): Json<InitializeRequest>,
) -> Result<Json<TxResponse>, RegistryError> {
    let implementation = parse_address("implementation", &address)?;
    let from = parse_address("from", &request.from)?;
    let identity_registry = parse_address("identityRegistry", &request.identity_registry)?;

    let mut chain = state.chain.write().await;
    let receipt = chain
        .initialize_implementation(from, implementation, identity_registry)
        .map_err(rejected("initialize", from))?;

    Ok(Json(commit(&state, receipt).await))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOwnershipRequest {
    pub from: String,
    pub new_owner: String,
}

/// POST /admin/registries/:registry/transfer-ownership
pub async fn transfer_ownership(
    State(state): State<Arc<AppState>>,
    Path(registry): Path<String>,
    Json(request): Json<TransferOwnershipRequest>,
) -> Result<Json<TxResponse>, RegistryError> {
    let kind = parse_registry(&registry)?;
    let from = parse_address("from", &request.from)?;
    let new_owner = parse_address("newOwner", &request.new_owner)?;

    let mut chain = state.chain.write().await;
    let receipt = chain
        .transfer_ownership(kind, from, new_owner)
        .map_err(rejected("transferOwnership", from))?;

    Ok(Json(commit(&state, receipt).await))
}

/// POST /admin/registries/:registry/renounce-ownership
pub async fn renounce_ownership(
    State(state): State<Arc<AppState>>,
    Path(registry): Path<String>,
    Json(request): Json<FromRequest>,
) -> Result<Json<TxResponse>, RegistryError> {
    let kind = parse_registry(&registry)?;
    let from = parse_address("from", &request.from)?;

    let mut chain = state.chain.write().await;
    let receipt = chain
        .renounce_ownership(kind, from)
        .map_err(rejected("renounceOwnership", from))?;

    Ok(Json(commit(&state, receipt).await))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_b256_defaults_to_zero() {
        assert_eq!(parse_b256("tag", None).unwrap(), B256::ZERO);
        assert_eq!(parse_b256("tag", Some("  ")).unwrap(), B256::ZERO);
        assert!(parse_b256("tag", Some("0x1234")).is_err());
    }

    #[test]
    fn test_parse_address_list() {
        let list = parse_address_list(
            "clients",
            Some("0x1111111111111111111111111111111111111111, 0x2222222222222222222222222222222222222222,"),
        )
        .unwrap();
        assert_eq!(list, vec![Address::repeat_byte(0x11), Address::repeat_byte(0x22)]);
        assert!(parse_address_list("clients", None).unwrap().is_empty());
        assert!(matches!(
            parse_address_list("clients", Some("nope")),
            Err(RegistryError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_parse_hex_bytes() {
        assert_eq!(parse_hex_bytes("v", "0x0102").unwrap(), Bytes::from(vec![1, 2]));
        assert_eq!(parse_hex_bytes("v", "0102").unwrap(), Bytes::from(vec![1, 2]));
        assert!(parse_hex_bytes("v", "0xzz").is_err());
    }

    #[test]
    fn test_parse_score_and_registry() {
        assert_eq!(parse_score(0).unwrap(), 0);
        assert_eq!(parse_score(100).unwrap(), 100);
        for value in [101, 255, 256, 1000, u64::MAX] {
            assert_eq!(parse_score(value), Err(RegistryError::ScoreOutOfRange(value)));
        }
        assert_eq!(parse_registry("validation").unwrap(), RegistryKind::Validation);
        assert!(parse_registry("identity").is_err());
    }
}
