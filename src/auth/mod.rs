//! Bearer-token verification.
//!
//! Tokens are JWTs issued by an external identity provider. Key material is
//! cached process-wide with a TTL so the provider is consulted rarely; an
//! unavailable provider maps to `503` rather than `401`.

pub mod error;
pub mod verifier;

pub use error::AuthError;
pub use verifier::{Identity, KeyProvider, StaticKeyProvider, TokenVerifier};
