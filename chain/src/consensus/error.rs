use std::fmt;

/// Errors surfaced by operator-registry operations.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RegistryError {
    /// Signing was requested but no self identity is initialized.
    NotInitialized,
    /// `initialize_self` was called twice with different inputs.
    AlreadyInitialized,
    /// `register_operator` was called without a public key.
    MissingKey,
    /// Supplied public and private halves do not belong together.
    KeyMismatch,
    /// Registering a new operator would exceed `max_operators`.
    CapacityExceeded { max: usize },
    /// The self operator cannot be removed.
    CannotRemoveSelf,
}

/// Reasons a block fails registry-level verification.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BlockVerifyError {
    /// Block carries no operator identity.
    NoOperator,
    /// Block carries no signature.
    NoSignature,
    /// Operator key is malformed or not registered here.
    UnknownOperator,
    /// Signature does not verify against the registered key.
    BadSignature,
}

/// Errors surfaced by chain-store operations.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum StoreError {
    /// A block already occupies this slot.
    SlotExists(u64),
    /// Slot is not `head.slot + 1`.
    SlotGap { expected: u64, got: u64 },
    /// `prev_hash` does not match the stored head's hash.
    ParentMismatch { slot: u64 },
    /// Backend failure (I/O, database, serialization at rest).
    Backend(String),
    /// Stored data failed to decode or violates structural expectations.
    Corrupted(String),
}

/// Reasons a foreign block is rejected by `receive_block`.
///
/// Validation is ordered; the first failing check wins and there is
/// never partial acceptance.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ReceiveError {
    /// Persistence is not ready (manager not initialized / genesis
    /// never committed).
    StoreUnavailable,
    /// Block carries no operator identity.
    NoOperator,
    /// Block carries no signature.
    NoSignature,
    /// Signatures are required by configuration and the block has none.
    MissingSignature,
    /// Operator key is malformed or not registered here.
    UnknownOperator,
    /// Signature does not verify against the registered key.
    BadSignature,
    /// Slot is not exactly `head.slot + 1`.
    SlotMismatch { expected: u64, got: u64 },
    /// `prev_hash` does not match the current head's hash.
    ParentMismatch,
    /// Recomputed Merkle root disagrees with `judgments_root`.
    MerkleMismatch,
    /// Recomputed header hash disagrees with the declared hash.
    HashMismatch,
    /// The store rejected the write.
    Store(StoreError),
}

/// Errors surfaced by chain import.
#[derive(Debug)]
pub enum ImportError {
    /// A wire block failed to decode; carries the offending slot.
    Decode(u64),
    /// Link validation failed; carries every offending slot.
    BrokenLinks(Vec<u64>),
    /// The store rejected a write mid-import.
    Store(StoreError),
}

impl From<BlockVerifyError> for ReceiveError {
    fn from(e: BlockVerifyError) -> Self {
        match e {
            BlockVerifyError::NoOperator => ReceiveError::NoOperator,
            BlockVerifyError::NoSignature => ReceiveError::NoSignature,
            BlockVerifyError::UnknownOperator => ReceiveError::UnknownOperator,
            BlockVerifyError::BadSignature => ReceiveError::BadSignature,
        }
    }
}

impl From<StoreError> for ReceiveError {
    fn from(e: StoreError) -> Self {
        ReceiveError::Store(e)
    }
}

impl From<StoreError> for ImportError {
    fn from(e: StoreError) -> Self {
        ImportError::Store(e)
    }
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::NotInitialized => write!(f, "self operator is not initialized"),
            RegistryError::AlreadyInitialized => {
                write!(f, "self operator is already initialized with different inputs")
            }
            RegistryError::MissingKey => write!(f, "operator public key is required"),
            RegistryError::KeyMismatch => {
                write!(f, "supplied public key does not match the private key")
            }
            RegistryError::CapacityExceeded { max } => {
                write!(f, "operator capacity exceeded (max {max})")
            }
            RegistryError::CannotRemoveSelf => write!(f, "the self operator cannot be removed"),
        }
    }
}

impl fmt::Display for BlockVerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockVerifyError::NoOperator => write!(f, "block has no operator"),
            BlockVerifyError::NoSignature => write!(f, "block has no signature"),
            BlockVerifyError::UnknownOperator => write!(f, "block operator is not registered"),
            BlockVerifyError::BadSignature => write!(f, "block signature is invalid"),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::SlotExists(slot) => write!(f, "slot {slot} already has a block"),
            StoreError::SlotGap { expected, got } => {
                write!(f, "slot gap: expected {expected}, got {got}")
            }
            StoreError::ParentMismatch { slot } => {
                write!(f, "parent hash mismatch at slot {slot}")
            }
            StoreError::Backend(msg) => write!(f, "store backend error: {msg}"),
            StoreError::Corrupted(msg) => write!(f, "store corrupted: {msg}"),
        }
    }
}

impl fmt::Display for ReceiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiveError::StoreUnavailable => write!(f, "persistence unavailable"),
            ReceiveError::NoOperator => write!(f, "block has no operator"),
            ReceiveError::NoSignature => write!(f, "block has no signature"),
            ReceiveError::MissingSignature => {
                write!(f, "signatures are required and the block has none")
            }
            ReceiveError::UnknownOperator => write!(f, "block operator is not registered"),
            ReceiveError::BadSignature => write!(f, "block signature is invalid"),
            ReceiveError::SlotMismatch { expected, got } => {
                write!(f, "slot mismatch: expected {expected}, got {got}")
            }
            ReceiveError::ParentMismatch => write!(f, "prev_hash does not match head"),
            ReceiveError::MerkleMismatch => write!(f, "judgments_root mismatch"),
            ReceiveError::HashMismatch => write!(f, "block hash mismatch"),
            ReceiveError::Store(e) => write!(f, "store rejected block: {e}"),
        }
    }
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::Decode(slot) => write!(f, "block at slot {slot} failed to decode"),
            ImportError::BrokenLinks(slots) => {
                write!(f, "broken parent links at slots {slots:?}")
            }
            ImportError::Store(e) => write!(f, "store rejected import: {e}"),
        }
    }
}

impl std::error::Error for RegistryError {}
impl std::error::Error for BlockVerifyError {}
impl std::error::Error for StoreError {}
impl std::error::Error for ReceiveError {}
impl std::error::Error for ImportError {}
