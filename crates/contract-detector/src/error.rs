use thiserror::Error;

/// Unified error type for the contract detector.
#[derive(Debug, Error)]
pub enum Error {
    #[error("address error: {0}")]
    Address(#[from] AddressError),

    #[error("config error: {0}")]
    Config(String),
}

/// Errors while parsing a contract address.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid address length: expected 40 hex characters, got {actual}")]
    InvalidLength { actual: usize },

    #[error("invalid hex in address: {0}")]
    InvalidHex(String),
}

/// Errors returned by a single metadata query against a node.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("contract does not implement {call}")]
    Unsupported { call: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}
