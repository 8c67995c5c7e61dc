use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt value at {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage unavailable: {message}")]
    Unavailable { message: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Timed out after {millis} ms")]
    Timeout { millis: u64 },

    #[error("Rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl RemoteError {
    /// 4xx rejections will fail again on replay; everything else may recover.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Rejected { status, .. } => !(400..500).contains(status),
            RemoteError::Network { .. } | RemoteError::Timeout { .. } => true,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Notification backend failed: {message}")]
    Backend { message: String },

    #[error("Notification permission denied")]
    PermissionDenied,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] domain::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_permanent() {
        let rejected = |status| RemoteError::Rejected {
            status,
            message: String::new(),
        };
        assert!(!rejected(400).is_retryable());
        assert!(!rejected(404).is_retryable());
        assert!(rejected(500).is_retryable());
        assert!(rejected(503).is_retryable());
        assert!(RemoteError::Timeout { millis: 3000 }.is_retryable());
        assert!(RemoteError::Network { message: "offline".into() }.is_retryable());
    }
}
