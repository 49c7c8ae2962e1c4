use thiserror::Error;

/// Canonical result for the execution core.
pub type Result<T> = std::result::Result<T, Error>;

/// Query-level failure. Every variant maps to a stable numeric code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("resource limit exceeded for '{tag}': requested {requested} bytes, limit {limit}, used {used}")]
    ResourceExhausted {
        tag: &'static str,
        requested: usize,
        limit: usize,
        used: usize,
    },

    /// A stage or its caller broke the row/block protocol.
    #[error("internal contract violation: {0}")]
    Contract(String),

    #[error("query killed")]
    Cancelled,

    /// Failure reported by a storage or graph collaborator, forwarded unchanged.
    #[error("{collaborator} failed: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },

    #[error("bad parameter: {0}")]
    BadParameter(String),

    #[error("intentional debug error: {0}")]
    Debug(String),
}

/// Stable error codes surfaced to clients.
pub mod codes {
    pub const DEBUG: u32 = 3;
    pub const INTERNAL: u32 = 4;
    pub const BAD_PARAMETER: u32 = 10;
    pub const RESOURCE_LIMIT: u32 = 32;
    pub const QUERY_KILLED: u32 = 1500;
    pub const COLLABORATOR: u32 = 1501;
}

impl Error {
    pub fn contract(msg: impl Into<String>) -> Self {
        Error::Contract(msg.into())
    }

    pub fn collaborator(collaborator: &'static str, msg: impl Into<String>) -> Self {
        Error::Collaborator {
            collaborator,
            message: msg.into(),
        }
    }

    /// Stable numeric code of this error kind.
    pub fn code(&self) -> u32 {
        match self {
            Error::ResourceExhausted { .. } => codes::RESOURCE_LIMIT,
            Error::Contract(_) => codes::INTERNAL,
            Error::Cancelled => codes::QUERY_KILLED,
            Error::Collaborator { .. } => codes::COLLABORATOR,
            Error::BadParameter(_) => codes::BAD_PARAMETER,
            Error::Debug(_) => codes::DEBUG,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::BadParameter(e.to_string())
    }
}
