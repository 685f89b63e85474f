//! Typed error hierarchy for Boardroom.
//!
//! One enum per subsystem:
//! - `StoreError`: persistence backends (SQLite, Supabase REST)
//! - `LlmError`: model provider calls
//! - `AuthError`: token verification against the identity provider
//! - `BoardError`: the advice fan-out and chaining flow
//! - `ConfigError`: configuration that cannot work

use boardroom_common::ValidationError;
use thiserror::Error;

/// Errors from a persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage service returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Malformed stored data: {0}")]
    Decode(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.into())
    }
}

/// Errors from a model provider.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} returned {status}: {body}")]
    Upstream {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider} response could not be parsed: {message}")]
    Malformed { provider: String, message: String },
}

/// Errors from verifying a caller's identity.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Identity provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Identity provider returned {status}: {body}")]
    Upstream { status: u16, body: String },
}

/// Errors from the advice flow.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Member {id} not found")]
    MemberNotFound { id: String },

    #[error("History record {id} not found")]
    HistoryNotFound { id: String },

    #[error("Invalid request: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Failed to generate a response for member {member_id}: {source}")]
    Generation {
        member_id: String,
        #[source]
        source: LlmError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Configuration that cannot produce a working server.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting {key}")]
    Missing { key: &'static str },

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
