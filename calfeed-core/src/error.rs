//! Error types for the calfeed engine.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the engine.
///
/// Parse problems inside an otherwise valid feed are not represented here:
/// the parser skips bad events and reports a count instead of failing the
/// batch.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error(
        "'{}' is outside the managed root: local calendar files must reside inside the managed root",
        .0.display()
    )]
    OutsideRoot(PathBuf),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for engine operations.
pub type FeedResult<T> = Result<T, FeedError>;
