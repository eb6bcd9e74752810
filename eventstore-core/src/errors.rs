use thiserror::Error;

/// Semantic error categories from the store's error handling design.
///
/// `ExpectedVersionFailure` and `ConcurrentStreamWriteError` name the same
/// condition; `concurrent_stream_write` is kept as an alias constructor
/// since both names surface in different corners of the systems this
/// crate's design draws from.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("expected version mismatch for aggregate '{aggregate_id}': expected {expected}, actual {actual}")]
    ExpectedVersionFailure {
        aggregate_id: String,
        expected: i64,
        actual: i64,
    },

    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    #[error("unbounded read: load_all requires to_transaction_id or limit")]
    UnboundedRead,

    #[error("subscription handler failed: {0}")]
    HandlerFailed(#[source] anyhow::Error),

    #[error("database unavailable: {0}")]
    DatabaseUnavailable(#[source] anyhow::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl StoreError {
    pub fn concurrent_stream_write(
        aggregate_id: impl Into<String>,
        expected: i64,
        actual: i64,
    ) -> Self {
        StoreError::ExpectedVersionFailure {
            aggregate_id: aggregate_id.into(),
            expected,
            actual,
        }
    }

    /// Error kinds a caller should retry (re-read the
    /// stream, or back off) rather than treat as a programmer error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::DatabaseUnavailable(_))
    }
}
