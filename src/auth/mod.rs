//! Feedback authorization capabilities
//!
//! A capability is the ABI-encoded [`FeedbackAuth`] header (224 bytes)
//! followed by a signature over `keccak256(header)` as an EIP-191 personal
//! message. It binds one client to one agent on one chain against one
//! identity registry, until `expiry`, for at most `useLimit` submissions.

pub mod signature;

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use alloy::sol_types::SolValue;
use std::collections::HashMap;
use tracing::debug;

pub use crate::abi::FeedbackAuth;
use crate::identity::IdentityLookup;
use crate::runtime::CodeHost;
use crate::types::{AgentId, RegistryError};

pub use signature::{SignatureVerifier, SmartAccount};

/// Size of the ABI-encoded header: seven 32-byte words
pub const HEADER_LEN: usize = 7 * 32;

/// Decoded capability blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackAuthorization {
    pub header: FeedbackAuth,
    pub signature: Bytes,
}

impl FeedbackAuthorization {
    pub fn decode(blob: &[u8]) -> Result<Self, RegistryError> {
        if blob.len() < HEADER_LEN {
            return Err(RegistryError::AuthMalformed(format!(
                "expected at least {} bytes, got {}",
                HEADER_LEN,
                blob.len()
            )));
        }

        let (head, signature) = blob.split_at(HEADER_LEN);
        let header = <FeedbackAuth as SolValue>::abi_decode(head, true)
            .map_err(|e| RegistryError::AuthMalformed(format!("header decode failed: {}", e)))?;

        Ok(Self {
            header,
            signature: Bytes::copy_from_slice(signature),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut blob = self.header.abi_encode();
        blob.extend_from_slice(&self.signature);
        blob
    }

    /// Hash the signer signs (before the EIP-191 prefix); also the capability's identity
    pub fn message_hash(&self) -> B256 {
        message_hash(&self.header)
    }

    /// Issue a capability signed with a local key
    pub fn sign(header: FeedbackAuth, signer: &PrivateKeySigner) -> Result<Self, RegistryError> {
        let hash = message_hash(&header);
        let signature = signer
            .sign_message_sync(hash.as_slice())
            .map_err(|e| RegistryError::Internal(format!("Signing failed: {}", e)))?;

        Ok(Self {
            header,
            signature: Bytes::copy_from_slice(&signature.as_bytes()),
        })
    }
}

pub fn message_hash(header: &FeedbackAuth) -> B256 {
    keccak256(header.abi_encode())
}

/// The call site a capability is presented at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub agent_id: AgentId,
    pub client: Address,
    pub chain_id: u64,
    pub identity_registry: Address,
    pub timestamp: u64,
}

/// Result of a successful verification, consumed together with the ledger write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedAuth {
    pub signer: Address,
    pub capability: B256,
    pub use_limit: u64,
}

/// Consumption counters per capability, keyed by message hash
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageLedger {
    used: HashMap<B256, u64>,
}

impl UsageLedger {
    pub fn used(&self, capability: &B256) -> u64 {
        self.used.get(capability).copied().unwrap_or(0)
    }

    /// Record one use. Only call with a `VerifiedAuth` from the same call.
    pub fn consume(&mut self, auth: &VerifiedAuth) -> u64 {
        let used = self.used.entry(auth.capability).or_insert(0);
        *used += 1;
        *used
    }
}

/// Check a capability blob against the call site and current ownership
///
/// Pure: the use counter is only read here. The caller must `consume` the
/// returned `VerifiedAuth` in the same commit as the write it guards.
pub fn verify(
    blob: &[u8],
    ctx: &AuthContext,
    usage: &UsageLedger,
    identity: &dyn IdentityLookup,
    host: &CodeHost,
) -> Result<VerifiedAuth, RegistryError> {
    let auth = FeedbackAuthorization::decode(blob)?;
    let header = &auth.header;

    if header.agentId != ctx.agent_id {
        return Err(RegistryError::AuthContextMismatch("agentId"));
    }
    if header.clientAddress != ctx.client {
        return Err(RegistryError::AuthContextMismatch("clientAddress"));
    }
    if header.chainId != U256::from(ctx.chain_id) {
        return Err(RegistryError::AuthContextMismatch("chainId"));
    }
    if header.identityRegistry != ctx.identity_registry {
        return Err(RegistryError::AuthContextMismatch("identityRegistry"));
    }

    if U256::from(ctx.timestamp) >= header.expiry {
        return Err(RegistryError::AuthExpired(header.expiry));
    }

    let capability = auth.message_hash();
    if usage.used(&capability) >= header.useLimit {
        return Err(RegistryError::AuthExhausted(header.useLimit));
    }

    // The embedded signer must hold authority over the agent right now
    let signer = header.signerAddress;
    if !identity.is_authorized_or_owner(signer, ctx.agent_id) {
        return Err(RegistryError::AuthUnauthorizedSigner(signer));
    }

    SignatureVerifier::select(host, signer).verify(signer, capability, &auth.signature)?;

    debug!(
        "Feedback authorization {:?} verified for agent {} (signer {:?}, used {}/{})",
        capability,
        ctx.agent_id,
        signer,
        usage.used(&capability),
        header.useLimit
    );

    Ok(VerifiedAuth {
        signer,
        capability,
        use_limit: header.useLimit,
    })
}
