//! Error types for the block processing pipeline.

use thiserror::Error;

/// Failures reported by a [`BlockProvider`](crate::provider::BlockProvider).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("Block {0} not found")]
    BlockNotFound(u64),

    #[error("{0}")]
    Other(String),
}

/// Failures raised while a registered handler processes an operation.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("custom_json '{id}' carries malformed JSON: {source}")]
    MalformedPayload {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("custom_json '{id}' has no posting or active authority")]
    MissingAuthority { id: String },
}

impl HandlerError {
    /// Convenience constructor for handler-defined failures.
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self::Failed(reason.to_string())
    }
}

/// Errors that end a processor run.
///
/// A feed ending is not represented here: it is recovered locally by
/// falling back to catch-up.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("provider communication error: {0}")]
    Provider(#[from] ProviderError),

    #[error("block stream fault: {0}")]
    StreamFault(ProviderError),

    #[error("handler '{key}' failed in block {block_num}: {source}")]
    Handler {
        block_num: u64,
        key: String,
        #[source]
        source: HandlerError,
    },

    #[error("'{0}' is not a valid block id")]
    InvalidBlockId(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("processor is already running")]
    AlreadyRunning,

    #[error("processor task aborted: {0}")]
    Task(String),
}

/// Coarse classification of a [`ProcessorError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Head-number, block fetch or subscribe failure.
    ProviderCommunication,
    /// The live feed signalled an error.
    StreamFault,
    /// A registered handler returned an error.
    HandlerFault,
    /// A custom_json payload could not be decoded.
    MalformedPayload,
    /// Misuse or an internal failure of the processor itself.
    Internal,
}

impl ProcessorError {
    /// Classify this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Provider(_) => FailureKind::ProviderCommunication,
            Self::StreamFault(_) | Self::InvalidBlockId(_) => FailureKind::StreamFault,
            Self::Handler {
                source: HandlerError::MalformedPayload { .. } | HandlerError::MissingAuthority { .. },
                ..
            } => FailureKind::MalformedPayload,
            Self::Handler { .. } => FailureKind::HandlerFault,
            Self::InvalidConfig(_) | Self::AlreadyRunning | Self::Task(_) => FailureKind::Internal,
        }
    }
}
