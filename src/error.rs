//! Error types shared across the crate.

use thiserror::Error;

/// Rejection produced by the pattern compiler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// Pattern is empty after trimming.
    #[error("blank pattern")]
    Blank,

    /// Character (or malformed alternation) the grammar does not accept.
    #[error("invalid token {token} at {pos}: {pattern:?}")]
    InvalidToken {
        token: String,
        pos: usize,
        pattern: String,
    },

    /// Run of three or more `*`.
    #[error("ambiguous wildcard {run} at {pos}: {pattern:?}")]
    AmbiguousWildcard {
        run: String,
        pos: usize,
        pattern: String,
    },
}

impl PatternError {
    /// Byte offset of the offending token, if any.
    pub fn position(&self) -> Option<usize> {
        match self {
            PatternError::Blank => None,
            PatternError::InvalidToken { pos, .. } | PatternError::AmbiguousWildcard { pos, .. } => {
                Some(*pos)
            }
        }
    }
}

/// Failure talking to the key-value backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend connection error: {0}")]
    Connection(String),

    #[error("backend command error: {0}")]
    Command(String),

    #[error("wrong type for key {0}")]
    WrongType(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_connection_dropped() || e.is_connection_refusal() || e.is_io_error() {
            StoreError::Connection(e.to_string())
        } else {
            StoreError::Command(e.to_string())
        }
    }
}

/// Umbrella error for rule, store and configuration operations.
#[derive(Debug, Error)]
pub enum AntidoteError {
    /// Bad id, treatment or configuration value.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// `RuleStore::add` could not find a free id.
    #[error("id space exhausted after {attempts} attempts")]
    StoreExhausted { attempts: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for crate operations.
pub type Result<T> = std::result::Result<T, AntidoteError>;
