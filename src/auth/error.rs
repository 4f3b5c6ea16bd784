use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("entropy source unavailable")]
    Entropy(#[source] rand::Error),

    #[error("failed to sign access token")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("hashing worker failed")]
    Worker(#[source] tokio::task::JoinError),
}

/// Every failure an auth operation can surface to its caller.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("username already exists")]
    Conflict,

    /// Used for unknown users and wrong passwords alike.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid token")]
    InvalidToken,

    /// Also what a replayed, already-rotated refresh token produces.
    #[error("token is revoked")]
    RevokedToken,

    #[error("token is expired")]
    ExpiredToken,

    #[error("storage error")]
    Store(#[from] StoreError),

    #[error("crypto error")]
    Crypto(#[from] CryptoError),
}

impl AuthError {
    /// Stable identifier for logs and metrics labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Conflict => "conflict",
            Self::InvalidCredentials => "invalid_credentials",
            Self::InvalidToken => "invalid_token",
            Self::RevokedToken => "revoked_token",
            Self::ExpiredToken => "expired_token",
            Self::Store(_) => "store",
            Self::Crypto(_) => "crypto",
        }
    }
}
