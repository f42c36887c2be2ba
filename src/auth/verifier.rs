use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::error::AuthError;
use crate::protocol::UserId;

/// Minimum key-material cache lifetime.
pub const KEY_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Claims carried by an identity-provider token.
#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
    #[allow(dead_code)]
    exp: i64,
}

/// Verified connection identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_seed: String,
}

/// Source of decoding keys. The real provider fetches a key set over HTTP;
/// deployments with a shared secret use [`StaticKeyProvider`]. A fetch
/// failure is distinct from a bad token.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn fetch_keys(&self) -> Result<Vec<DecodingKey>, anyhow::Error>;
    fn algorithm(&self) -> Algorithm;
}

/// Provider backed by a configured HMAC secret.
pub struct StaticKeyProvider {
    secret: String,
}

impl StaticKeyProvider {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl KeyProvider for StaticKeyProvider {
    async fn fetch_keys(&self) -> Result<Vec<DecodingKey>, anyhow::Error> {
        Ok(vec![DecodingKey::from_secret(self.secret.as_bytes())])
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::HS256
    }
}

struct CachedKeys {
    keys: Vec<DecodingKey>,
    fetched_at: Instant,
}

/// Token verifier with process-wide key caching.
pub struct TokenVerifier {
    provider: Arc<dyn KeyProvider>,
    cache: RwLock<Option<CachedKeys>>,
    ttl: Duration,
}

impl TokenVerifier {
    pub fn new(provider: Arc<dyn KeyProvider>) -> Self {
        Self {
            provider,
            cache: RwLock::new(None),
            ttl: KEY_CACHE_TTL,
        }
    }

    /// Verify a bearer token and extract the connection identity.
    pub async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::MissingToken);
        }

        let keys = self.keys().await?;
        let mut validation = Validation::new(self.provider.algorithm());
        validation.validate_aud = false;

        let mut last_error = AuthError::InvalidToken;
        for key in &keys {
            match decode::<Claims>(token, key, &validation) {
                Ok(data) => {
                    let claims = data.claims;
                    let display_name = claims
                        .name
                        .filter(|n| !n.trim().is_empty())
                        .unwrap_or_else(|| claims.sub.clone());
                    let avatar_seed = claims.picture.unwrap_or_else(|| claims.sub.clone());
                    return Ok(Identity {
                        user_id: claims.sub,
                        display_name,
                        avatar_seed,
                    });
                }
                Err(e) => {
                    last_error = match e.kind() {
                        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                            AuthError::ExpiredToken
                        }
                        _ => AuthError::InvalidToken,
                    };
                }
            }
        }
        Err(last_error)
    }

    async fn keys(&self) -> Result<Vec<DecodingKey>, AuthError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(cached.keys.clone());
                }
            }
        }

        match self.provider.fetch_keys().await {
            Ok(keys) => {
                let mut cache = self.cache.write().await;
                *cache = Some(CachedKeys {
                    keys: keys.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(keys)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Identity provider key fetch failed");
                // A stale cache is still better than refusing everyone
                let cache = self.cache.read().await;
                match cache.as_ref() {
                    Some(cached) => Ok(cached.keys.clone()),
                    None => Err(AuthError::KeyMaterialUnavailable),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        name: Option<String>,
        exp: i64,
    }

    fn token(secret: &str, sub: &str, name: Option<&str>, exp_offset_secs: i64) -> String {
        let exp = chrono::Utc::now().timestamp() + exp_offset_secs;
        encode(
            &Header::default(),
            &TestClaims {
                sub: sub.to_string(),
                name: name.map(ToString::to_string),
                exp,
            },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn verifier(secret: &str) -> TokenVerifier {
        TokenVerifier::new(Arc::new(StaticKeyProvider::new(secret)))
    }

    #[tokio::test]
    async fn test_valid_token_yields_identity() {
        let verifier = verifier("top-secret");
        let identity = verifier
            .verify(&token("top-secret", "user-1", Some("Ana"), 600))
            .await
            .unwrap();
        assert_eq!(identity.user_id, "user-1");
        assert_eq!(identity.display_name, "Ana");
    }

    #[tokio::test]
    async fn test_name_falls_back_to_sub() {
        let verifier = verifier("top-secret");
        let identity = verifier
            .verify(&token("top-secret", "user-2", None, 600))
            .await
            .unwrap();
        assert_eq!(identity.display_name, "user-2");
    }

    #[tokio::test]
    async fn test_expired_token() {
        let verifier = verifier("top-secret");
        let err = verifier
            .verify(&token("top-secret", "user-1", None, -600))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::ExpiredToken);
    }

    #[tokio::test]
    async fn test_wrong_secret() {
        let verifier = verifier("top-secret");
        let err = verifier
            .verify(&token("other-secret", "user-1", None, 600))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidToken);
    }

    #[tokio::test]
    async fn test_empty_token_is_missing() {
        let verifier = verifier("top-secret");
        assert_eq!(verifier.verify("  ").await.unwrap_err(), AuthError::MissingToken);
    }

    struct FailingProvider;

    #[async_trait]
    impl KeyProvider for FailingProvider {
        async fn fetch_keys(&self) -> Result<Vec<DecodingKey>, anyhow::Error> {
            Err(anyhow::anyhow!("network down"))
        }

        fn algorithm(&self) -> Algorithm {
            Algorithm::HS256
        }
    }

    #[tokio::test]
    async fn test_provider_failure_is_unavailable() {
        let verifier = TokenVerifier::new(Arc::new(FailingProvider));
        let err = verifier
            .verify(&token("whatever", "user-1", None, 600))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::KeyMaterialUnavailable);
    }
}
