//! Backend error types.

use thiserror::Error;

use cogbench_core::error::OracleError;

/// Errors raised while talking to an NLI inference server.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The server rejected the credentials.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The server returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request exceeded the client timeout.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("network error: {0}")]
    NetworkError(String),

    /// The response parsed, but carried no usable class probabilities.
    #[error("unusable classifier output: {0}")]
    MalformedOutput(String),
}

impl From<BackendError> for OracleError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Timeout(secs) => OracleError::Timeout {
                timeout_ms: secs * 1000,
            },
            BackendError::MalformedOutput(_) => OracleError::InvalidResponse(err.to_string()),
            BackendError::ApiError { status, .. } if (400..500).contains(&status) && status != 429 => {
                OracleError::InvalidResponse(err.to_string())
            }
            other => OracleError::Unavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_to_oracle_errors() {
        assert!(OracleError::from(BackendError::Timeout(5)).is_timeout());
        assert!(matches!(
            OracleError::from(BackendError::ApiError {
                status: 503,
                message: "loading".into()
            }),
            OracleError::Unavailable(_)
        ));
        assert!(matches!(
            OracleError::from(BackendError::ApiError {
                status: 422,
                message: "too long".into()
            }),
            OracleError::InvalidResponse(_)
        ));
        assert!(matches!(
            OracleError::from(BackendError::AuthenticationFailed("bad key".into())),
            OracleError::Unavailable(_)
        ));
    }
}
