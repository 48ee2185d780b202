//! Cache errors.

use std::error::Error as StdError;
use std::sync::Arc;

/// Error type producers may return.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors that can occur when reading through the cache.
///
/// Cloneable so one failed computation can be handed to every waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("Cache store error: {0}")]
    Store(String),

    #[error("Failed to encode cache value for {key}: {message}")]
    Encode { key: String, message: String },

    #[error("Failed to decode cache value for {key}: {message}")]
    Decode { key: String, message: String },

    #[error("Producer for {key} failed: {source}")]
    Producer {
        key: String,
        #[source]
        source: Arc<dyn StdError + Send + Sync>,
    },
}

impl CacheError {
    /// Build a store error from any message.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Underlying producer error, when this is one.
    pub fn producer_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Self::Producer { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
