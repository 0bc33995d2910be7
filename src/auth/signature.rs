use alloy::primitives::{eip191_hash_message, Address, FixedBytes, Signature, B256};
use alloy::sol_types::SolCall;

use crate::abi::IERC1271;
use crate::runtime::{CodeHost, ContractWallet};
use crate::types::RegistryError;

/// ERC-1271 acceptance value, `bytes4(keccak256("isValidSignature(bytes32,bytes)"))`
const ERC1271_MAGIC_VALUE: FixedBytes<4> = FixedBytes(IERC1271::isValidSignatureCall::SELECTOR);

/// How a claimed signer's signature is checked, chosen by probing the signer for code
pub enum SignatureVerifier<'a> {
    /// Externally owned account: recover the secp256k1 signer and compare
    Ecdsa,
    /// Contract account: ask it through the ERC-1271 callback
    Callback(Option<&'a dyn ContractWallet>),
}

impl<'a> SignatureVerifier<'a> {
    pub fn select(host: &'a CodeHost, signer: Address) -> Self {
        if host.has_code(signer) {
            SignatureVerifier::Callback(host.wallet(signer))
        } else {
            SignatureVerifier::Ecdsa
        }
    }

    /// Verify `signature` over the EIP-191 personal message `message_hash`
    pub fn verify(
        &self,
        signer: Address,
        message_hash: B256,
        signature: &[u8],
    ) -> Result<(), RegistryError> {
        match self {
            SignatureVerifier::Ecdsa => {
                let recovered = recover_personal_signer(message_hash, signature)?;
                if recovered != signer {
                    return Err(RegistryError::AuthBadSignature(format!(
                        "recovered {:?}, expected {:?}",
                        recovered, signer
                    )));
                }
                Ok(())
            }
            SignatureVerifier::Callback(wallet) => {
                // Code without an isValidSignature entry point rejects everything
                let accepted = wallet
                    .map(|w| w.is_valid_signature(eip191_hash_message(message_hash), signature))
                    .is_some_and(|magic| magic == ERC1271_MAGIC_VALUE);

                if !accepted {
                    return Err(RegistryError::AuthBadSignature(format!(
                        "contract signer {:?} rejected the signature",
                        signer
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Recover the address that signed `message_hash` as an EIP-191 personal message
pub fn recover_personal_signer(
    message_hash: B256,
    signature: &[u8],
) -> Result<Address, RegistryError> {
    let signature = Signature::try_from(signature)
        .map_err(|e| RegistryError::AuthBadSignature(format!("Invalid signature: {}", e)))?;

    signature
        .recover_address_from_msg(message_hash)
        .map_err(|e| RegistryError::AuthBadSignature(format!("Recovery failed: {}", e)))
}

/// Single-owner smart account validating signatures from its owner key
pub struct SmartAccount {
    owner: Address,
}

impl SmartAccount {
    pub fn new(owner: Address) -> Self {
        Self { owner }
    }
}

impl ContractWallet for SmartAccount {
    fn is_valid_signature(&self, hash: B256, signature: &[u8]) -> FixedBytes<4> {
        let recovered = Signature::try_from(signature)
            .ok()
            .and_then(|sig| sig.recover_address_from_prehash(&hash).ok());

        if recovered == Some(self.owner) {
            ERC1271_MAGIC_VALUE
        } else {
            FixedBytes::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Code;
    use alloy::primitives::keccak256;
    use alloy::signers::local::PrivateKeySigner;
    use alloy::signers::SignerSync;
    use std::sync::Arc;

    #[test]
    fn test_magic_value() {
        assert_eq!(ERC1271_MAGIC_VALUE, FixedBytes([0x16, 0x26, 0xba, 0x7e]));
    }

    #[test]
    fn test_ecdsa_accepts_personal_signature() {
        let signer = PrivateKeySigner::random();
        let hash = keccak256(b"feedback");
        let signature = signer.sign_message_sync(hash.as_slice()).unwrap();

        let host = CodeHost::new();
        let verifier = SignatureVerifier::select(&host, signer.address());
        assert!(matches!(verifier, SignatureVerifier::Ecdsa));
        verifier
            .verify(signer.address(), hash, &signature.as_bytes())
            .unwrap();
    }

    #[test]
    fn test_ecdsa_rejects_other_key() {
        let claimed = PrivateKeySigner::random();
        let forger = PrivateKeySigner::random();
        let hash = keccak256(b"feedback");
        let signature = forger.sign_message_sync(hash.as_slice()).unwrap();

        let result = SignatureVerifier::Ecdsa.verify(claimed.address(), hash, &signature.as_bytes());
        assert!(matches!(result, Err(RegistryError::AuthBadSignature(_))));
    }

    #[test]
    fn test_ecdsa_rejects_truncated_signature() {
        let result = SignatureVerifier::Ecdsa.verify(Address::ZERO, B256::ZERO, &[0u8; 10]);
        assert!(matches!(result, Err(RegistryError::AuthBadSignature(_))));
    }

    #[test]
    fn test_callback_uses_wallet() {
        let owner = PrivateKeySigner::random();
        let mut host = CodeHost::new();
        let wallet = host.deploy(
            Address::repeat_byte(0x42),
            Code::Wallet(Arc::new(SmartAccount::new(owner.address()))),
        );

        let hash = keccak256(b"feedback");
        let good = owner.sign_message_sync(hash.as_slice()).unwrap();
        let bad = PrivateKeySigner::random()
            .sign_message_sync(hash.as_slice())
            .unwrap();

        let verifier = SignatureVerifier::select(&host, wallet);
        assert!(matches!(verifier, SignatureVerifier::Callback(Some(_))));
        verifier.verify(wallet, hash, &good.as_bytes()).unwrap();
        assert!(matches!(
            verifier.verify(wallet, hash, &bad.as_bytes()),
            Err(RegistryError::AuthBadSignature(_))
        ));
    }
}
