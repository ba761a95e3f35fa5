use thiserror::Error;

/// Everything the fetch+flatten pipeline can fail with.
///
/// `Transport` is the only recoverable kind; whether it is retried is up to
/// the [`RetryPolicy`](crate::RetryPolicy) in force. All other kinds
/// propagate to the caller immediately.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Non-success HTTP response, as read off the status line.
    #[error("request failed with status {status} {reason}")]
    Transport { status: u16, reason: String },

    /// The operator declined to retry a failed page request.
    #[error("aborted by operator")]
    UserAborted,

    /// The probe found more matches than one query may page through.
    #[error("result set has {count} matches, ceiling is {ceiling}; narrow the date range")]
    ResultSetTooLarge { count: u64, ceiling: u64 },

    /// Success status but the body is not a usable query result.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The opt-in retry cap was reached.
    #[error("gave up after {attempts} failed attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid date `{value}`: expected YYYY-MM-DD")]
    InvalidDate { value: String },

    /// Connection-level failure with no HTTP response to read.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("response body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
