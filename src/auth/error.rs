use axum::http::StatusCode;
use thiserror::Error;

use crate::protocol::ErrorCode;

/// Closed set of authentication failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("no bearer token provided")]
    MissingToken,
    #[error("bearer token is invalid")]
    InvalidToken,
    #[error("bearer token has expired")]
    ExpiredToken,
    #[error("identity provider key material unavailable")]
    KeyMaterialUnavailable,
}

impl AuthError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingToken => ErrorCode::MissingToken,
            Self::InvalidToken => ErrorCode::InvalidToken,
            Self::ExpiredToken => ErrorCode::ExpiredToken,
            Self::KeyMaterialUnavailable => ErrorCode::JwksUnavailable,
        }
    }

    /// Status for the upgrade response: bad credentials are the client's
    /// fault, missing key material is ours.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::MissingToken | Self::InvalidToken | Self::ExpiredToken => {
                StatusCode::UNAUTHORIZED
            }
            Self::KeyMaterialUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AuthError::MissingToken.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::ExpiredToken.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::KeyMaterialUnavailable.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_code_mapping() {
        assert_eq!(AuthError::MissingToken.code(), ErrorCode::MissingToken);
        assert_eq!(
            AuthError::KeyMaterialUnavailable.code(),
            ErrorCode::JwksUnavailable
        );
    }
}
