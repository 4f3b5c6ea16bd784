//! Credential verification and refresh-token rotation.
//!
//! [`AuthEngine`] is the entry point; it consumes the store contracts from
//! [`crate::store`] and never touches HTTP.

pub mod codec;
mod config;
mod engine;
mod error;
pub mod password;

pub use codec::{Claims, TokenCodec};
pub use config::{
    AuthConfig, MAX_ACCESS_TOKEN_TTL_SECONDS, MAX_REFRESH_TOKEN_TTL_SECONDS, MIN_JWT_SECRET_BYTES,
};
pub use engine::{AuthEngine, ClientContext, TokenPair};
pub use error::{AuthError, CryptoError};
pub use password::PasswordPolicy;
