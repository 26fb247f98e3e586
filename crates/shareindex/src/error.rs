use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ShareIndexError {
    #[error("share unreachable: {0}")]
    ShareUnreachable(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// `size` is `None` when the file size could not be determined.
    #[error("range not satisfiable: {range}")]
    RangeNotSatisfiable { range: String, size: Option<u64> },

    #[error("range not supported: {0}")]
    RangeNotSupported(String),

    #[error("transfer interrupted: {0}")]
    TransferInterrupted(String),

    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("unknown share: {0}")]
    UnknownShare(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ShareIndexError>;

impl ShareIndexError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ShareUnreachable(_) => "share_unreachable",
            Self::AccessDenied(_) => "access_denied",
            Self::NotFound(_) => "not_found",
            Self::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            Self::RangeNotSupported(_) => "range_not_supported",
            Self::TransferInterrupted(_) => "transfer_interrupted",
            Self::CacheUnavailable(_) => "cache_unavailable",
            Self::UnknownShare(_) => "unknown_share",
            Self::InvalidInput(_) => "invalid_input",
            Self::Config(_) => "config",
        }
    }

    /// Whether a retry at the call site may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ShareUnreachable(_))
    }

    /// Maps an I/O error raised while talking to a share.
    ///
    /// `context` names the remote object (path or directory) the call targeted.
    pub fn from_share_io(error: io::Error, context: &str) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::NotFound(context.to_string()),
            io::ErrorKind::PermissionDenied => {
                Self::AccessDenied(format!("{context}: {error}"))
            }
            _ => Self::ShareUnreachable(format!("{context}: {error}")),
        }
    }

    /// Maps an I/O error raised while reading the cache backend.
    pub fn from_cache_io(error: io::Error, context: &str) -> Self {
        Self::CacheUnavailable(format!("{context}: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_share_taxonomy() {
        let not_found = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert!(matches!(
            ShareIndexError::from_share_io(not_found, "a/b.apk"),
            ShareIndexError::NotFound(path) if path == "a/b.apk"
        ));

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(
            ShareIndexError::from_share_io(denied, "a"),
            ShareIndexError::AccessDenied(_)
        ));

        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        let mapped = ShareIndexError::from_share_io(reset, "a");
        assert!(mapped.is_transient());
        assert_eq!(mapped.code(), "share_unreachable");
    }

    #[test]
    fn only_unreachable_is_transient() {
        assert!(!ShareIndexError::NotFound("x".into()).is_transient());
        assert!(!ShareIndexError::AccessDenied("x".into()).is_transient());
        assert!(!ShareIndexError::TransferInterrupted("x".into()).is_transient());
    }
}
