use thiserror::Error;

use crate::broker::BrokerError;

/// Failure taxonomy for the publish pipeline.
///
/// Every failure is surfaced to the caller exactly once, carrying the
/// original cause. Nothing here is retried and none of these terminate the
/// process.
#[derive(Debug, Error)]
pub enum ProduceError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("failed to encode request envelope: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("failed to publish request: {0}")]
    Publish(#[from] BrokerError),
    #[error("internal producer error: {0}")]
    Internal(String),
}
