//! Errors raised by the shared stores.

/// Failure talking to a cache, cursor, lock or SKU-map store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),

    #[error("store command error: {0}")]
    Command(String),

    #[error("stored value could not be decoded: {0}")]
    Decode(String),
}

impl StoreError {
    /// Connection and command failures are worth retrying; corrupt values are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Connection(_) | StoreError::Command(_))
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_io_error() || err.is_timeout() {
            StoreError::Connection(err.to_string())
        } else if err.kind() == redis::ErrorKind::TypeError {
            StoreError::Decode(err.to_string())
        } else {
            StoreError::Command(err.to_string())
        }
    }
}
