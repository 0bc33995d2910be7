use alloy::sol;

// Feedback authorization header. The ABI encoding of this struct (7 words,
// 224 bytes) is the fixed-width prefix of every feedbackAuth blob, and its
// keccak256 is the message the signer signs.
sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct FeedbackAuth {
        uint256 agentId;
        address clientAddress;
        uint64 useLimit;
        uint256 expiry;
        uint256 chainId;
        address identityRegistry;
        address signerAddress;
    }
}

// ERC-1271 contract signature validation. The magic return value is the
// selector of isValidSignature(bytes32,bytes).
sol! {
    interface IERC1271 {
        function isValidSignature(bytes32 hash, bytes signature) external view returns (bytes4 magicValue);
    }
}

// EIP-8004 Reputation Registry events
sol! {
    interface IReputationRegistry {
        event NewFeedback(
            uint256 indexed agentId,
            address indexed clientAddress,
            uint64 feedbackIndex,
            uint8 score,
            bytes32 indexed tag1,
            bytes32 tag2,
            string fileuri,
            bytes32 filehash
        );

        event FeedbackRevoked(
            uint256 indexed agentId,
            address indexed clientAddress,
            uint64 indexed feedbackIndex
        );

        event ResponseAppended(
            uint256 indexed agentId,
            address indexed clientAddress,
            uint64 feedbackIndex,
            address indexed responder,
            string responseUri,
            bytes32 responseHash
        );
    }
}

// EIP-8004 Validation Registry events
sol! {
    interface IValidationRegistry {
        event ValidationRequest(
            address indexed validatorAddress,
            uint256 indexed agentId,
            string requestUri,
            bytes32 indexed requestHash
        );

        event ValidationResponse(
            address indexed validatorAddress,
            uint256 indexed agentId,
            bytes32 indexed requestHash,
            uint8 response,
            string responseUri,
            bytes32 responseHash,
            bytes32 tag
        );
    }
}

// ERC-1967 / UUPS proxy lifecycle events
sol! {
    interface IUpgradeable {
        event Upgraded(address indexed implementation);
        event Initialized(uint64 version);
        event OwnershipTransferred(address indexed previousOwner, address indexed newOwner);
    }
}
