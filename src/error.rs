use thiserror::Error;

/// Errors returned by [`crate::ReliabilityManager`] public operations.
///
/// These map one-to-one onto the tags an embedder is expected to branch on;
/// none of them are ever routed through the event sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("message too large: {len} bytes exceeds max {max}")]
    MessageTooLarge { len: usize, max: usize },

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("deserialization error: {0}")]
    DeserializationError(String),

    #[error("internal error: {0}")]
    InternalError(String),

    #[error("out of memory: {0}")]
    OutOfMemory(String),
}

pub type Result<T> = std::result::Result<T, ManagerError>;
