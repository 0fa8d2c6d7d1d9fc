/// Structured error types for objtrack-core.
///
/// Uses `thiserror` so every per-record failure is a plain value the
/// coordinator can store in its report. The binary (objtrack-cli) wraps
/// these in `anyhow` at the edges.
use std::fmt;
use thiserror::Error;

/// Classification of a store-reported write failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCause {
    /// A table constraint rejected the row
    Constraint,
    /// Statement or pool timeout
    Timeout,
    /// The connection to the store was lost or unusable
    Connectivity,
    /// Any other error reported by the database itself
    Store,
    /// Driver-side failure outside the categories above
    Other,
}

impl WriteCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteCause::Constraint => "constraint",
            WriteCause::Timeout => "timeout",
            WriteCause::Connectivity => "connectivity",
            WriteCause::Store => "store",
            WriteCause::Other => "other",
        }
    }
}

impl fmt::Display for WriteCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for objtrack-core operations
#[derive(Error, Debug, Clone)]
pub enum IngestError {
    /// The invocation input has no usable record list
    #[error("Invalid notification batch: {reason}")]
    InvalidBatch { reason: String },

    /// A record lacks its bucket name or object key
    #[error("Malformed record at index {index}: missing '{field}'")]
    MalformedRecord { index: usize, field: &'static str },

    /// Pool exhausted, acquisition timed out, or pool closed
    #[error("Connection unavailable: {reason}")]
    ConnectionUnavailable { reason: String },

    /// The store rejected or failed the insert
    #[error("Write failed ({cause}): {detail}")]
    WriteFailed { cause: WriteCause, detail: String },

    /// Anything not anticipated above (e.g. a panicking writer)
    #[error("Unexpected fault: {reason}")]
    UnexpectedFault { reason: String },

    /// Invalid process configuration
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// Schema bootstrap failed
    #[error("Schema error: {reason}")]
    Schema { reason: String },
}

/// Result type alias for objtrack-core operations
pub type Result<T> = std::result::Result<T, IngestError>;

impl IngestError {
    pub fn invalid_batch(reason: impl Into<String>) -> Self {
        Self::InvalidBatch {
            reason: reason.into(),
        }
    }

    pub fn malformed(index: usize, field: &'static str) -> Self {
        Self::MalformedRecord { index, field }
    }

    pub fn connection_unavailable(reason: impl Into<String>) -> Self {
        Self::ConnectionUnavailable {
            reason: reason.into(),
        }
    }

    pub fn write_failed(cause: WriteCause, detail: impl Into<String>) -> Self {
        Self::WriteFailed {
            cause,
            detail: detail.into(),
        }
    }

    pub fn unexpected(reason: impl Into<String>) -> Self {
        Self::UnexpectedFault {
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    pub fn schema(reason: impl Into<String>) -> Self {
        Self::Schema {
            reason: reason.into(),
        }
    }

    /// Map a pool acquisition failure.
    pub fn from_acquire(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => {
                Self::connection_unavailable("timed out waiting for a pooled connection")
            }
            sqlx::Error::PoolClosed => Self::connection_unavailable("pool closed"),
            other => Self::connection_unavailable(other.to_string()),
        }
    }

    /// Map a failed INSERT, keeping its classified cause.
    pub fn from_write(err: sqlx::Error) -> Self {
        let cause = classify(&err);
        Self::write_failed(cause, err.to_string())
    }
}

/// Classify a driver error for diagnostics and connection disposal.
pub fn classify(err: &sqlx::Error) -> WriteCause {
    match err {
        sqlx::Error::Database(db) => {
            // 57014 = query_canceled (statement_timeout)
            if db.code().as_deref() == Some("57014") {
                return WriteCause::Timeout;
            }
            match db.kind() {
                sqlx::error::ErrorKind::UniqueViolation
                | sqlx::error::ErrorKind::ForeignKeyViolation
                | sqlx::error::ErrorKind::NotNullViolation
                | sqlx::error::ErrorKind::CheckViolation => WriteCause::Constraint,
                _ => WriteCause::Store,
            }
        }
        sqlx::Error::PoolTimedOut => WriteCause::Timeout,
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => WriteCause::Connectivity,
        _ => WriteCause::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IngestError::malformed(1, "s3.object.key");
        assert_eq!(
            err.to_string(),
            "Malformed record at index 1: missing 's3.object.key'"
        );

        let err = IngestError::write_failed(WriteCause::Constraint, "duplicate key");
        assert_eq!(err.to_string(), "Write failed (constraint): duplicate key");
    }

    #[test]
    fn test_acquire_timeout_maps_to_connection_unavailable() {
        let err = IngestError::from_acquire(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, IngestError::ConnectionUnavailable { .. }));
        assert!(err.to_string().contains("timed out"));

        let err = IngestError::from_acquire(sqlx::Error::PoolClosed);
        assert!(err.to_string().contains("pool closed"));
    }

    #[test]
    fn test_classify_driver_errors() {
        let io = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset by peer",
        ));
        assert_eq!(classify(&io), WriteCause::Connectivity);
        assert_eq!(classify(&sqlx::Error::PoolTimedOut), WriteCause::Timeout);
        assert_eq!(classify(&sqlx::Error::RowNotFound), WriteCause::Other);

        let err = IngestError::from_write(io);
        assert!(matches!(
            err,
            IngestError::WriteFailed {
                cause: WriteCause::Connectivity,
                ..
            }
        ));
    }
}
