//! Error types for authentication operations

/// Errors that can occur during authentication
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid API credentials
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// API returned an error
    #[error("API error (code={code}): {msg}")]
    Api { code: i64, msg: String },

    /// Failed to parse response
    #[error("Parse error: {0}")]
    Parse(String),

    /// Environment variable not set
    #[error("Environment variable not set: {0}")]
    EnvVarNotSet(String),
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

impl From<AuthError> for mexc_types::MexcError {
    fn from(err: AuthError) -> Self {
        Self::Credential(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::EnvVarNotSet("MEXC_API_KEY".to_string());
        assert!(err.to_string().contains("MEXC_API_KEY"));

        let err = AuthError::Api {
            code: 730706,
            msg: "listenKey invalid".into(),
        };
        assert_eq!(err.to_string(), "API error (code=730706): listenKey invalid");
    }

    #[test]
    fn test_into_stream_error() {
        let err: mexc_types::MexcError = AuthError::Parse("missing listenKey".into()).into();
        assert!(matches!(err, mexc_types::MexcError::Credential(ref m) if m.contains("missing listenKey")));
    }
}
