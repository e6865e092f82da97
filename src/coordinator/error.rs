//! Coordinator error types
//!
//! These errors are delivered in-band to every subscriber of a failed stream,
//! so they are cheap to clone.

/// Terminal error observed by a subscriber
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    /// The upstream call failed (connect error, bad status, broken body)
    #[error("upstream failed: {0}")]
    Upstream(String),

    /// Upstream output grew past the configured buffer limit
    #[error("upstream output exceeded buffer limit of {limit} bytes")]
    BufferLimitExceeded {
        /// Configured limit in bytes
        limit: usize,
    },

    /// The coordinator went away without sending a terminal event
    #[error("stream abandoned before completion")]
    Abandoned,
}

impl From<crate::upstream::UpstreamError> for CoordinatorError {
    fn from(err: crate::upstream::UpstreamError) -> Self {
        CoordinatorError::Upstream(err.to_string())
    }
}
