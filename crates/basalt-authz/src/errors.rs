use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("no key in the key set matches kid {0:?}")]
    MissingKey(Option<String>),
    #[error("expiration {requested_secs}s exceeds maximum {max_secs}s")]
    TtlExceeded { requested_secs: u64, max_secs: u64 },
}

pub type AuthzResult<T> = Result<T, AuthzError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_variants() {
        let errors = vec![
            AuthzError::MalformedToken("truncated".to_string()),
            AuthzError::MissingKey(Some("k1".to_string())),
            AuthzError::TtlExceeded {
                requested_secs: 10,
                max_secs: 5,
            },
        ];
        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
