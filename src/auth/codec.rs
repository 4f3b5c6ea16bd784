//! Stateless token transformations.
//!
//! - Opaque refresh secrets: 64 random bytes, URL-safe base64 without padding.
//! - Secret digests: SHA-256, lowercase hex. Used for ledger lookups only,
//!   passwords go through [`super::password`].
//! - Access tokens: HS256 JWTs carrying `sub`, `iss`, `aud`, `jti`, `iat`,
//!   `nbf` and `exp`.
//!
//! The signing secret is handed to [`TokenCodec::new`] once at start-up and
//! never changes afterwards.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use super::error::{AuthError, CryptoError};

/// Entropy of every refresh secret handed out.
pub const REFRESH_TOKEN_BYTES: usize = 64;

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub jti: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

impl Claims {
    /// Subject as a user id, if it parses.
    #[must_use]
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

/// Generate `byte_length` random bytes and encode them URL-safe, unpadded.
pub fn generate_random_secret(byte_length: usize) -> Result<String, CryptoError> {
    let mut bytes = vec![0u8; byte_length];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(CryptoError::Entropy)?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// SHA-256 of a raw secret, lowercase hex.
#[must_use]
pub fn hash_secret(raw: &str) -> String {
    format!("{:x}", Sha256::digest(raw.as_bytes()))
}

/// Signs and verifies access tokens with one symmetric key.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    access_token_ttl: Duration,
}

impl TokenCodec {
    #[must_use]
    pub fn new(
        secret: &SecretString,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        access_token_ttl: Duration,
    ) -> Self {
        let key = secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(key),
            decoding_key: DecodingKey::from_secret(key),
            issuer: issuer.into(),
            audience: audience.into(),
            access_token_ttl,
        }
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    #[must_use]
    pub fn access_token_ttl(&self) -> Duration {
        self.access_token_ttl
    }

    /// Sign a fresh access token for `user_id`, valid from `now` for the
    /// configured TTL.
    pub fn issue_access_token(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<String, CryptoError> {
        let issued_at = now.timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: issued_at,
            nbf: issued_at,
            exp: (now + self.access_token_ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(CryptoError::Signing)
    }

    /// Verify signature, algorithm, issuer, audience and the `[nbf, exp)`
    /// window. Every failure collapses to [`AuthError::InvalidToken`].
    pub fn parse_access_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_required_spec_claims(&["sub", "exp", "nbf", "iss", "aud"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|err| {
            debug!(error = %err, "access token rejected");
            AuthError::InvalidToken
        })?;

        // jsonwebtoken treats `exp == now` as still valid; the window is half-open.
        if data.claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::InvalidToken);
        }

        Ok(data.claims)
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("key", &"***")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_token_ttl", &self.access_token_ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};
    use serde_json::json;

    const SECRET: &str = "an-hs256-test-secret-that-is-long-enough";

    fn codec(secret: &str) -> TokenCodec {
        TokenCodec::new(
            &SecretString::from(secret.to_string()),
            "rotacio",
            "rotacio-api",
            Duration::seconds(15),
        )
    }

    #[test]
    fn random_secret_is_url_safe_and_unpadded() -> Result<()> {
        let secret = generate_random_secret(REFRESH_TOKEN_BYTES)?;
        assert!(!secret.contains('='));
        assert!(!secret.contains('+'));
        assert!(!secret.contains('/'));

        let decoded = Base64UrlUnpadded::decode_vec(&secret).context("decode secret")?;
        assert_eq!(decoded.len(), REFRESH_TOKEN_BYTES);
        Ok(())
    }

    #[test]
    fn random_secrets_differ() -> Result<()> {
        let first = generate_random_secret(REFRESH_TOKEN_BYTES)?;
        let second = generate_random_secret(REFRESH_TOKEN_BYTES)?;
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn hash_secret_is_stable_lowercase_hex() {
        let first = hash_secret("token");
        assert_eq!(first, hash_secret("token"));
        assert_ne!(first, hash_secret("other"));
        assert_eq!(first.len(), 64);
        assert!(first
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        // sha256("abc")
        assert_eq!(
            hash_secret("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn issued_token_parses_back() -> Result<()> {
        let codec = codec(SECRET);
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        let token = codec.issue_access_token(user_id, now)?;

        let claims = codec.parse_access_token(&token)?;
        assert_eq!(claims.user_id(), Some(user_id));
        assert_eq!(claims.iss, "rotacio");
        assert_eq!(claims.aud, "rotacio-api");
        assert_eq!(claims.iat, now.timestamp());
        assert_eq!(claims.nbf, now.timestamp());
        assert_eq!(claims.exp, now.timestamp() + 15);
        assert!(Uuid::parse_str(&claims.jti).is_ok());
        Ok(())
    }

    #[test]
    fn each_token_gets_its_own_jti() -> Result<()> {
        let codec = codec(SECRET);
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        let first = codec.parse_access_token(&codec.issue_access_token(user_id, now)?)?;
        let second = codec.parse_access_token(&codec.issue_access_token(user_id, now)?)?;
        assert_ne!(first.jti, second.jti);
        Ok(())
    }

    #[test]
    fn token_from_other_secret_is_rejected() -> Result<()> {
        let token = codec("a-completely-different-signing-secret")
            .issue_access_token(Uuid::new_v4(), Utc::now())?;
        assert!(matches!(
            codec(SECRET).parse_access_token(&token),
            Err(AuthError::InvalidToken)
        ));
        Ok(())
    }

    #[test]
    fn expired_token_is_rejected() -> Result<()> {
        let codec = codec(SECRET);
        let token = codec.issue_access_token(Uuid::new_v4(), Utc::now() - Duration::minutes(5))?;
        assert!(matches!(
            codec.parse_access_token(&token),
            Err(AuthError::InvalidToken)
        ));
        Ok(())
    }

    #[test]
    fn not_yet_valid_token_is_rejected() -> Result<()> {
        let codec = codec(SECRET);
        let token = codec.issue_access_token(Uuid::new_v4(), Utc::now() + Duration::minutes(5))?;
        assert!(matches!(
            codec.parse_access_token(&token),
            Err(AuthError::InvalidToken)
        ));
        Ok(())
    }

    #[test]
    fn other_algorithm_is_rejected() -> Result<()> {
        let now = Utc::now().timestamp();
        let claims = json!({
            "sub": Uuid::new_v4().to_string(),
            "iss": "rotacio",
            "aud": "rotacio-api",
            "jti": "x",
            "iat": now,
            "nbf": now,
            "exp": now + 60,
        });
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )?;
        assert!(matches!(
            codec(SECRET).parse_access_token(&token),
            Err(AuthError::InvalidToken)
        ));
        Ok(())
    }

    #[test]
    fn wrong_audience_is_rejected() -> Result<()> {
        let other = TokenCodec::new(
            &SecretString::from(SECRET.to_string()),
            "rotacio",
            "someone-else",
            Duration::seconds(15),
        );
        let token = other.issue_access_token(Uuid::new_v4(), Utc::now())?;
        assert!(matches!(
            codec(SECRET).parse_access_token(&token),
            Err(AuthError::InvalidToken)
        ));
        Ok(())
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            codec(SECRET).parse_access_token("not-a-jwt"),
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            codec(SECRET).parse_access_token(""),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn debug_redacts_key() {
        let rendered = format!("{:?}", codec(SECRET));
        assert!(!rendered.contains(SECRET));
    }
}
