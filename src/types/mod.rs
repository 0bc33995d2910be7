pub mod errors;
pub mod events;

pub use errors::*;
pub use events::*;

/// Agent identifier (ERC-721 token id in the identity registry)
pub type AgentId = alloy::primitives::U256;
