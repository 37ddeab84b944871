use thiserror::Error;

/// Process-level errors raised while starting or running the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The streaming listener could not bind its port.
    #[error("Listener bind failed on {addr}: {reason}")]
    ListenerBind { addr: String, reason: String },
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),
    /// Storage-related errors.
    #[error("Storage error: {0}")]
    Storage(String),
    /// Chain feed errors.
    #[error("Feed error: {0}")]
    Feed(String),
    /// Server task errors.
    #[error("Server error: {0}")]
    Server(String),
}

impl ServiceError {
    /// Errors that must stop the process at startup.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ServiceError::ListenerBind { .. } | ServiceError::Config(_))
    }
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        ServiceError::Storage(err.to_string())
    }
}

impl From<crate::blockchain::FeedError> for ServiceError {
    fn from(err: crate::blockchain::FeedError) -> Self {
        ServiceError::Feed(err.to_string())
    }
}
