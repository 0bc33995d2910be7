use alloy::primitives::{Address, B256, U256};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    // ===== Feedback authorization =====
    #[error("Malformed feedback authorization: {0}")]
    AuthMalformed(String),

    #[error("Feedback authorization does not match call context: {0}")]
    AuthContextMismatch(&'static str),

    #[error("Feedback authorization expired at {0}")]
    AuthExpired(U256),

    #[error("Feedback authorization exhausted after {0} uses")]
    AuthExhausted(u64),

    #[error("Signer {0} is not the agent owner or an approved operator")]
    AuthUnauthorizedSigner(Address),

    #[error("Bad signature: {0}")]
    AuthBadSignature(String),

    // ===== Ledgers =====
    #[error("Score {0} is out of range (0-100)")]
    ScoreOutOfRange(u64),

    #[error("Agent not found: {0}")]
    AgentNotFound(U256),

    #[error("Self-feedback not allowed")]
    SelfFeedbackNotAllowed,

    #[error("Feedback index {0} not found")]
    FeedbackNotFound(u64),

    #[error("Feedback index {0} already revoked")]
    AlreadyRevoked(u64),

    #[error("Response URI must not be empty")]
    EmptyResponseUri,

    #[error("Caller {0} has no feedback entries for this agent")]
    NotEntryOwner(Address),

    #[error("Validation request already exists: {0}")]
    DuplicateRequest(B256),

    #[error("Unknown validation request: {0}")]
    UnknownRequest(B256),

    #[error("Validator address must not be zero")]
    ZeroValidator,

    #[error("Caller {0} is not the designated validator")]
    NotValidator(Address),

    #[error("Caller {0} is not the agent owner")]
    NotAgentOwner(Address),

    #[error("Caller {0} is not authorized for this agent")]
    NotAuthorized(Address),

    // ===== Upgrade guard =====
    #[error("Upgrade target is the zero address")]
    UpgradeZeroAddress,

    #[error("Upgrade target {0} has no code")]
    UpgradeNotContract(Address),

    #[error("Upgrade target {0} is not a compatible implementation")]
    UpgradeIncompatible(Address),

    #[error("Caller {0} is not the registry owner")]
    UpgradeUnauthorized(Address),

    #[error("Invalid owner: {0}")]
    InvalidOwner(Address),

    #[error("Already initialized")]
    AlreadyInitialized,

    #[error("Registry not initialized")]
    NotInitialized,

    // ===== Service =====
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RegistryError {
    /// Stable snake_case code used in API responses and logs
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::AuthMalformed(_) => "auth_malformed",
            RegistryError::AuthContextMismatch(_) => "auth_context_mismatch",
            RegistryError::AuthExpired(_) => "auth_expired",
            RegistryError::AuthExhausted(_) => "auth_exhausted",
            RegistryError::AuthUnauthorizedSigner(_) => "auth_unauthorized_signer",
            RegistryError::AuthBadSignature(_) => "auth_bad_signature",
            RegistryError::ScoreOutOfRange(_) => "score_out_of_range",
            RegistryError::AgentNotFound(_) => "agent_not_found",
            RegistryError::SelfFeedbackNotAllowed => "self_feedback_not_allowed",
            RegistryError::FeedbackNotFound(_) => "feedback_not_found",
            RegistryError::AlreadyRevoked(_) => "already_revoked",
            RegistryError::EmptyResponseUri => "empty_response_uri",
            RegistryError::NotEntryOwner(_) => "not_entry_owner",
            RegistryError::DuplicateRequest(_) => "duplicate_request",
            RegistryError::UnknownRequest(_) => "unknown_request",
            RegistryError::ZeroValidator => "zero_validator",
            RegistryError::NotValidator(_) => "not_validator",
            RegistryError::NotAgentOwner(_) => "not_agent_owner",
            RegistryError::NotAuthorized(_) => "not_authorized",
            RegistryError::UpgradeZeroAddress => "upgrade_zero_address",
            RegistryError::UpgradeNotContract(_) => "upgrade_not_contract",
            RegistryError::UpgradeIncompatible(_) => "upgrade_incompatible",
            RegistryError::UpgradeUnauthorized(_) => "upgrade_unauthorized",
            RegistryError::InvalidOwner(_) => "invalid_owner",
            RegistryError::AlreadyInitialized => "already_initialized",
            RegistryError::NotInitialized => "not_initialized",
            RegistryError::InvalidRequest(_) => "invalid_request",
            RegistryError::InvalidAddress(_) => "invalid_address",
            RegistryError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            RegistryError::AuthMalformed(_)
            | RegistryError::ScoreOutOfRange(_)
            | RegistryError::EmptyResponseUri
            | RegistryError::ZeroValidator
            | RegistryError::UpgradeZeroAddress
            | RegistryError::UpgradeNotContract(_)
            | RegistryError::UpgradeIncompatible(_)
            | RegistryError::InvalidOwner(_)
            | RegistryError::InvalidRequest(_)
            | RegistryError::InvalidAddress(_) => StatusCode::BAD_REQUEST,

            RegistryError::AuthContextMismatch(_)
            | RegistryError::AuthExpired(_)
            | RegistryError::AuthExhausted(_)
            | RegistryError::AuthUnauthorizedSigner(_)
            | RegistryError::AuthBadSignature(_)
            | RegistryError::SelfFeedbackNotAllowed
            | RegistryError::NotEntryOwner(_)
            | RegistryError::NotValidator(_)
            | RegistryError::NotAgentOwner(_)
            | RegistryError::NotAuthorized(_)
            | RegistryError::UpgradeUnauthorized(_) => StatusCode::FORBIDDEN,

            RegistryError::AgentNotFound(_)
            | RegistryError::FeedbackNotFound(_)
            | RegistryError::UnknownRequest(_) => StatusCode::NOT_FOUND,

            RegistryError::AlreadyRevoked(_)
            | RegistryError::DuplicateRequest(_)
            | RegistryError::AlreadyInitialized
            | RegistryError::NotInitialized => StatusCode::CONFLICT,

            RegistryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
            details: None,
        };

        (self.status(), Json(body)).into_response()
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::InvalidRequest(format!("JSON parse error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_snake_case() {
        let errors = [
            RegistryError::AuthExhausted(1),
            RegistryError::UpgradeZeroAddress,
            RegistryError::DuplicateRequest(B256::ZERO),
            RegistryError::InvalidAddress("0x".to_string()),
        ];

        for err in errors {
            assert!(err
                .code()
                .chars()
                .all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            RegistryError::ScoreOutOfRange(101).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RegistryError::AuthExpired(U256::from(1)).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            RegistryError::AgentNotFound(U256::from(7)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            RegistryError::AlreadyInitialized.status(),
            StatusCode::CONFLICT
        );
    }
}
