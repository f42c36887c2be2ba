use serde::{Deserialize, Serialize};

/// Token verification settings.
///
/// The identity provider is external; only the verification material lives
/// here. The secret itself should come from the environment in production.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct SecurityConfig {
    /// Refuse connections without a verifiable bearer token.
    /// Disabling this is for local development only.
    pub require_auth: bool,
    /// Shared HMAC secret for token verification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            jwt_secret: None,
        }
    }
}
