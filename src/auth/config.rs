//! Token policy and signing configuration.

use chrono::Duration;
use secrecy::SecretString;

use super::password::PasswordPolicy;

const DEFAULT_ISSUER: &str = "rotacio";
const DEFAULT_AUDIENCE: &str = "rotacio-api";
const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 15;
const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;

/// Shortest signing secret accepted for HS256.
pub const MIN_JWT_SECRET_BYTES: usize = 32;

/// Upper bound for the access token TTL: one day.
pub const MAX_ACCESS_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;

/// Upper bound for the refresh token TTL: one year.
pub const MAX_REFRESH_TOKEN_TTL_SECONDS: i64 = 365 * 24 * 60 * 60;

#[derive(Clone)]
pub struct AuthConfig {
    jwt_secret: SecretString,
    issuer: String,
    audience: String,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
    password_policy: PasswordPolicy,
}

impl AuthConfig {
    #[must_use]
    pub fn new(jwt_secret: SecretString) -> Self {
        Self {
            jwt_secret,
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
            password_policy: PasswordPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: String) -> Self {
        self.audience = audience;
        self
    }

    /// Clamped to `1..=MAX_ACCESS_TOKEN_TTL_SECONDS`.
    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = seconds.clamp(1, MAX_ACCESS_TOKEN_TTL_SECONDS);
        self
    }

    /// Clamped to `1..=MAX_REFRESH_TOKEN_TTL_SECONDS`.
    #[must_use]
    pub fn with_refresh_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_token_ttl_seconds = seconds.clamp(1, MAX_REFRESH_TOKEN_TTL_SECONDS);
        self
    }

    #[must_use]
    pub fn with_password_policy(mut self, policy: PasswordPolicy) -> Self {
        self.password_policy = policy;
        self
    }

    #[must_use]
    pub fn jwt_secret(&self) -> &SecretString {
        &self.jwt_secret
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
        Duration::seconds(self.access_token_ttl_seconds)
    }

    #[must_use]
    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::seconds(self.refresh_token_ttl_seconds)
    }

    #[must_use]
    pub fn refresh_token_ttl_seconds(&self) -> i64 {
        self.refresh_token_ttl_seconds
    }

    #[must_use]
    pub fn password_policy(&self) -> &PasswordPolicy {
        &self.password_policy
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"***")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_token_ttl_seconds", &self.access_token_ttl_seconds)
            .field("refresh_token_ttl_seconds", &self.refresh_token_ttl_seconds)
            .field("password_policy", &self.password_policy)
            .finish()
    }
}
