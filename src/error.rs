//! Error types for the TrinityChain client

use serde::Serialize;

/// Coarse classification of every [`Error`], carried next to the message
/// in error responses so bindings can branch without matching on text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// No node reachable or transport failure.
    Connectivity,
    /// Rejected credentials or a denied signing request.
    Authorization,
    /// Malformed input detected before any network call.
    Validation,
    /// Quorum could not be formed or did not agree.
    Consensus,
    /// An operation ran out of attempts or was cancelled.
    Liveness,
    /// The client or the requested data is in the wrong state, e.g. a network
    /// call on an offline client or a missing block.
    State,
    /// Serialization or task failures inside the client itself.
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no healthy node available")]
    NoHealthyNode,
    #[error("client is in offline mode, network operations are unavailable")]
    OfflineMode,
    #[error("node error: {0}")]
    Node(String),
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("response error with status code {code}: {text}, URL: {url}")]
    ResponseError { code: u16, text: String, url: String },
    #[error("unauthorized request to {url}")]
    Unauthorized { url: String },
    #[error("the requested data {0} was not found.")]
    NotFound(String),

    #[error("not enough nodes for quorum: {available} < {required}")]
    QuorumPoolSize { available: usize, required: usize },
    #[error("failed to reach quorum: {agreeing}/{respondents} responses agree, threshold is {threshold}%")]
    QuorumNotReached {
        agreeing: usize,
        respondents: usize,
        threshold: usize,
    },

    #[error("remote proof of work is required but no node offers it")]
    RemotePowUnsupported,
    #[error("proof of work was cancelled")]
    PowCancelled,
    #[error("block ID `{0}` couldn't get included into the Tangle")]
    TangleInclusion(String),
    #[error("block ID `{0}` doesn't need to be promoted or reattached")]
    NoNeedPromoteOrReattach(String),

    #[error("insufficient funds: found {found}, required {required}")]
    InsufficientFunds { found: u64, required: u64 },
    #[error("address: {address} not found in range: {range}")]
    AddressNotFound { address: String, range: String },
    #[error("too many inputs: {count}, the maximum is {max}")]
    TooManyInputs { count: usize, max: usize },
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),
    #[error("invalid output: {0}")]
    InvalidOutput(String),
    #[error("invalid block: {0}")]
    InvalidBlock(String),
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("invalid event topic: {0}")]
    InvalidTopic(String),
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),
    #[error("{0} is not supported by this secret manager")]
    Unsupported(&'static str),
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),
    #[error("vault error: {0}")]
    Vault(String),
    #[error("invalid vault password")]
    VaultPassword,
    #[error("a mnemonic is already stored in the vault")]
    MnemonicAlreadyStored,
    #[error("ledger error: {0}")]
    Ledger(String),
    #[error("operation denied on the ledger device")]
    LedgerDenied,
    #[error("event feed error: {0}")]
    Events(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("serialization error: {0}")]
    Bincode(#[from] Box<bincode::ErrorKind>),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("task error: {0}")]
    Task(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            NoHealthyNode
            | Node(_)
            | Timeout { .. }
            | ResponseError { .. }
            | RemotePowUnsupported
            | Ledger(_)
            | Events(_) => ErrorKind::Connectivity,
            Unauthorized { .. } | VaultPassword | LedgerDenied => ErrorKind::Authorization,
            QuorumPoolSize { .. } | QuorumNotReached { .. } => ErrorKind::Consensus,
            PowCancelled | TangleInclusion(_) => ErrorKind::Liveness,
            OfflineMode
            | NotFound(_)
            | NoNeedPromoteOrReattach(_)
            | MnemonicAlreadyStored
            | Vault(_) => ErrorKind::State,
            InsufficientFunds { .. }
            | AddressNotFound { .. }
            | TooManyInputs { .. }
            | InvalidAddress(_)
            | InvalidHex(_)
            | InvalidMnemonic(_)
            | InvalidOutput(_)
            | InvalidBlock(_)
            | InvalidTransaction(_)
            | InvalidTopic(_)
            | MissingParameter(_)
            | Unsupported(_)
            | Config(_)
            | Json(_) => ErrorKind::Validation,
            Crypto(_) | Bincode(_) | Io(_) | Task(_) => ErrorKind::Internal,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        match err.url() {
            Some(url) if err.is_timeout() => Error::Timeout {
                url: url.to_string(),
            },
            _ => Error::Node(err.to_string()),
        }
    }
}

impl From<hex::FromHexError> for Error {
    fn from(err: hex::FromHexError) -> Self {
        Error::InvalidHex(err.to_string())
    }
}

impl From<secp256k1::Error> for Error {
    fn from(err: secp256k1::Error) -> Self {
        Error::Crypto(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;
