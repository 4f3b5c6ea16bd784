//! Registration, login and the refresh-token rotation protocol.
//!
//! The engine owns no mutable state; every call is an independent unit of
//! work against the two stores. Rotation correctness under concurrent
//! duplicate presentation rests on [`TokenLedger::rotate`] being atomic: of
//! two callers racing on one token, exactly one sees the flag flip.

use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::task;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    codec::{generate_random_secret, hash_secret, Claims, TokenCodec, REFRESH_TOKEN_BYTES},
    config::AuthConfig,
    error::{AuthError, CryptoError},
    password::{hash_password, verify_password},
};
use crate::store::{CredentialStore, RefreshTokenRecord, StoreError, TokenLedger, User};

/// What a successful login or refresh hands back.
///
/// `refresh_token` is the raw secret; only its hash was persisted, so this is
/// the one and only time it is available.
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"***")
            .field("refresh_token", &"***")
            .finish()
    }
}

/// Request metadata recorded on every ledger row.
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub device_info: String,
    pub ip_address: Option<IpAddr>,
}

impl ClientContext {
    #[must_use]
    pub fn new(device_info: impl Into<String>, ip_address: Option<IpAddr>) -> Self {
        Self {
            device_info: device_info.into(),
            ip_address,
        }
    }
}

/// Password checked against [`AuthEngine::dummy_hash`] when the username is
/// unknown, so both login failures pay for one Argon2 verification.
const DUMMY_PASSWORD: &str = "rotacio-unknown-user";

pub struct AuthEngine {
    users: Arc<dyn CredentialStore>,
    ledger: Arc<dyn TokenLedger>,
    codec: TokenCodec,
    config: AuthConfig,
    dummy_hash: Option<String>,
}

impl AuthEngine {
    #[must_use]
    pub fn new(
        users: Arc<dyn CredentialStore>,
        ledger: Arc<dyn TokenLedger>,
        config: AuthConfig,
    ) -> Self {
        let codec = TokenCodec::new(
            config.jwt_secret(),
            config.issuer(),
            config.audience(),
            config.access_token_ttl(),
        );
        let dummy_hash = match hash_password(DUMMY_PASSWORD, config.password_policy()) {
            Ok(hash) => Some(hash),
            Err(err) => {
                warn!("Failed to hash dummy password: {err}");
                None
            }
        };
        Self {
            users,
            ledger,
            codec,
            config,
            dummy_hash,
        }
    }

    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Create a user with a unique username.
    #[instrument(skip(self, password))]
    pub async fn register(&self, username: &str, password: &str) -> Result<User, AuthError> {
        if self.users.find_by_username(username).await?.is_some() {
            return Err(AuthError::Conflict);
        }

        let policy = *self.config.password_policy();
        let password = password.to_owned();
        let password_hash = task::spawn_blocking(move || hash_password(&password, &policy))
            .await
            .map_err(CryptoError::Worker)??;

        let now = Utc::now();
        let user = User {
            id: Uuid::now_v7(),
            username: username.to_owned(),
            password_hash,
            created_at: now,
            updated_at: now,
        };

        // The lookup above can lose a race against a concurrent registration.
        let user = match self.users.create(&user).await {
            Ok(user) => user,
            Err(StoreError::UniqueViolation) => return Err(AuthError::Conflict),
            Err(err) => return Err(err.into()),
        };

        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Verify credentials and open a new session.
    #[instrument(skip(self, password, client), fields(device = %client.device_info))]
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        client: &ClientContext,
    ) -> Result<TokenPair, AuthError> {
        let user = self.users.find_by_username(username).await?;

        // Unknown users still cost one verification, against the dummy hash.
        let stored_hash = match &user {
            Some(user) => user.password_hash.clone(),
            None => self.dummy_hash.clone().unwrap_or_default(),
        };
        let password = password.to_owned();
        let matches = task::spawn_blocking(move || verify_password(&password, &stored_hash))
            .await
            .map_err(CryptoError::Worker)?;
        let Some(user) = user.filter(|_| matches) else {
            return Err(AuthError::InvalidCredentials);
        };

        let now = Utc::now();
        let refresh_token = generate_random_secret(REFRESH_TOKEN_BYTES)?;
        let record = self.new_record(user.id, &refresh_token, client, now);
        self.ledger.create(&record).await?;

        let access_token = self.codec.issue_access_token(user.id, now)?;

        info!(user_id = %user.id, session_id = %record.id, "login succeeded");
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Exchange a refresh token for a new pair, consuming the presented one.
    ///
    /// A token that was already rotated yields [`AuthError::RevokedToken`],
    /// whether the replay is sequential or concurrent. If persisting the
    /// replacement fails the presented token stays valid.
    #[instrument(skip(self, raw_refresh_token, client), fields(device = %client.device_info))]
    pub async fn refresh(
        &self,
        raw_refresh_token: &str,
        client: &ClientContext,
    ) -> Result<TokenPair, AuthError> {
        let hashed_token = hash_secret(raw_refresh_token);

        let Some(state) = self.ledger.find_by_hash(&hashed_token).await? else {
            return Err(AuthError::InvalidToken);
        };
        if state.revoked {
            warn!(user_id = %state.user_id, "revoked refresh token presented");
            return Err(AuthError::RevokedToken);
        }
        let now = Utc::now();
        if state.expires_at <= now {
            return Err(AuthError::ExpiredToken);
        }

        let access_token = self.codec.issue_access_token(state.user_id, now)?;

        let refresh_token = generate_random_secret(REFRESH_TOKEN_BYTES)?;
        let replacement = self.new_record(state.user_id, &refresh_token, client, now);

        if !self.ledger.rotate(&hashed_token, &replacement).await? {
            warn!(user_id = %state.user_id, "refresh token consumed concurrently");
            return Err(AuthError::RevokedToken);
        }

        info!(user_id = %state.user_id, session_id = %replacement.id, "refresh token rotated");
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Revoke a refresh token outright. Returns whether a live token was revoked.
    #[instrument(skip(self, raw_refresh_token))]
    pub async fn revoke(&self, raw_refresh_token: &str) -> Result<bool, AuthError> {
        let revoked = self
            .ledger
            .revoke_by_hash(&hash_secret(raw_refresh_token))
            .await?;
        Ok(revoked)
    }

    /// Check a bearer access token. No store is consulted.
    pub fn verify_access_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.codec.parse_access_token(token)
    }

    /// Ping both stores.
    pub async fn check_stores(&self) -> Result<(), StoreError> {
        self.users.ping().await?;
        self.ledger.ping().await
    }

    /// PHC string verified for unknown usernames, hashed with the configured
    /// policy.
    #[must_use]
    pub fn dummy_hash(&self) -> Option<&str> {
        self.dummy_hash.as_deref()
    }

    fn new_record(
        &self,
        user_id: Uuid,
        raw_secret: &str,
        client: &ClientContext,
        now: DateTime<Utc>,
    ) -> RefreshTokenRecord {
        RefreshTokenRecord {
            id: Uuid::now_v7(),
            user_id,
            hashed_token: hash_secret(raw_secret),
            expires_at: now + self.config.refresh_token_ttl(),
            revoked: false,
            created_at: now,
            last_used_at: None,
            device_info: client.device_info.clone(),
            ip_address: client.ip_address,
        }
    }
}

impl std::fmt::Debug for AuthEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthEngine")
            .field("codec", &self.codec)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::PasswordPolicy;
    use crate::store::{MemoryCredentialStore, MemoryTokenLedger};
    use anyhow::{anyhow, Result};
    use argon2::Params;
    use chrono::Duration;
    use secrecy::SecretString;

    const SECRET: &str = "engine-test-signing-secret-with-32+-bytes";

    struct Harness {
        engine: Arc<AuthEngine>,
        ledger: Arc<MemoryTokenLedger>,
    }

    fn harness() -> Harness {
        let users = Arc::new(MemoryCredentialStore::new());
        let ledger = Arc::new(MemoryTokenLedger::new());
        let config = AuthConfig::new(SecretString::from(SECRET.to_string())).with_password_policy(
            PasswordPolicy {
                memory_kib: Params::MIN_M_COST,
                iterations: Params::MIN_T_COST,
                parallelism: 1,
            },
        );
        let engine = Arc::new(AuthEngine::new(users, ledger.clone(), config));
        Harness { engine, ledger }
    }

    fn client() -> ClientContext {
        ClientContext::new("test-agent/1.0", "203.0.113.7".parse().ok())
    }

    #[tokio::test]
    async fn register_then_login() -> Result<()> {
        let h = harness();
        let user = h.engine.register("alice", "pw123").await?;
        assert_eq!(user.username, "alice");
        assert_ne!(user.password_hash, "pw123");

        let pair = h.engine.login("alice", "pw123", &client()).await?;
        let claims = h.engine.codec().parse_access_token(&pair.access_token)?;
        assert_eq!(claims.user_id(), Some(user.id));
        assert_eq!(h.ledger.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_username_conflicts_regardless_of_password() -> Result<()> {
        let h = harness();
        h.engine.register("alice", "pw123").await?;

        for password in ["pw123", "something-else", ""] {
            let result = h.engine.register("alice", password).await;
            assert!(matches!(result, Err(AuthError::Conflict)));
        }
        Ok(())
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_are_indistinguishable() -> Result<()> {
        let h = harness();
        h.engine.register("alice", "pw123").await?;

        let wrong = h
            .engine
            .login("alice", "nope", &client())
            .await
            .err()
            .ok_or_else(|| anyhow!("wrong password logged in"))?;
        let unknown = h
            .engine
            .login("mallory", "pw123", &client())
            .await
            .err()
            .ok_or_else(|| anyhow!("unknown user logged in"))?;

        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert_eq!(wrong.kind(), unknown.kind());
        assert!(h.ledger.is_empty());
        Ok(())
    }

    #[test]
    fn dummy_hash_uses_configured_policy() -> Result<()> {
        let h = harness();
        let policy = *h.engine.config().password_policy();
        let dummy = h
            .engine
            .dummy_hash()
            .ok_or_else(|| anyhow!("dummy hash missing"))?;

        let parsed = argon2::PasswordHash::new(dummy).map_err(|e| anyhow!(e.to_string()))?;
        assert_eq!(parsed.params.get_decimal("m"), Some(policy.memory_kib));
        assert_eq!(parsed.params.get_decimal("t"), Some(policy.iterations));
        assert_eq!(parsed.params.get_decimal("p"), Some(policy.parallelism));
        assert!(verify_password(DUMMY_PASSWORD, dummy));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_user_login_pays_for_password_verification() -> Result<()> {
        // Costly enough that a skipped verification stands out.
        let config = AuthConfig::new(SecretString::from(SECRET.to_string())).with_password_policy(
            PasswordPolicy {
                memory_kib: 8 * 1024,
                iterations: 3,
                parallelism: 1,
            },
        );
        let engine = AuthEngine::new(
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(MemoryTokenLedger::new()),
            config,
        );
        engine.register("alice", "pw123").await?;

        let mut known = std::time::Duration::MAX;
        let mut unknown = std::time::Duration::MAX;
        for _ in 0..3 {
            let started = std::time::Instant::now();
            let result = engine.login("alice", "wrong", &client()).await;
            known = known.min(started.elapsed());
            assert!(matches!(result, Err(AuthError::InvalidCredentials)));

            let started = std::time::Instant::now();
            let result = engine.login("mallory", "wrong", &client()).await;
            unknown = unknown.min(started.elapsed());
            assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        }

        assert!(
            unknown * 4 >= known,
            "unknown user answered in {unknown:?}, known user in {known:?}"
        );
        Ok(())
    }

    #[tokio::test]
    async fn logins_issue_distinct_tokens() -> Result<()> {
        let h = harness();
        h.engine.register("alice", "pw123").await?;
        let first = h.engine.login("alice", "pw123", &client()).await?;
        let second = h.engine.login("alice", "pw123", &client()).await?;
        assert_ne!(first.refresh_token, second.refresh_token);
        assert_ne!(first.access_token, second.access_token);
        Ok(())
    }

    #[tokio::test]
    async fn ledger_stores_hash_and_metadata_only() -> Result<()> {
        let h = harness();
        let user = h.engine.register("alice", "pw123").await?;
        let pair = h.engine.login("alice", "pw123", &client()).await?;

        let record = h
            .ledger
            .get(&hash_secret(&pair.refresh_token))
            .ok_or_else(|| anyhow!("record missing"))?;
        assert_ne!(record.hashed_token, pair.refresh_token);
        assert_eq!(record.user_id, user.id);
        assert!(!record.revoked);
        assert_eq!(record.device_info, "test-agent/1.0");
        assert_eq!(record.ip_address, "203.0.113.7".parse().ok());

        let ttl = record.expires_at - record.created_at;
        assert_eq!(ttl, Duration::days(30));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_succeeds_exactly_once() -> Result<()> {
        let h = harness();
        h.engine.register("alice", "pw123").await?;
        let login = h.engine.login("alice", "pw123", &client()).await?;

        let rotated = h.engine.refresh(&login.refresh_token, &client()).await?;
        assert_ne!(rotated.refresh_token, login.refresh_token);

        let replay = h.engine.refresh(&login.refresh_token, &client()).await;
        assert!(matches!(replay, Err(AuthError::RevokedToken)));

        // The replacement is good for exactly one more rotation.
        let again = h.engine.refresh(&rotated.refresh_token, &client()).await?;
        assert_ne!(again.refresh_token, rotated.refresh_token);
        let replay = h.engine.refresh(&rotated.refresh_token, &client()).await;
        assert!(matches!(replay, Err(AuthError::RevokedToken)));

        assert_eq!(h.ledger.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_refresh_token_is_invalid() {
        let h = harness();
        let result = h.engine.refresh("never-issued", &client()).await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn expired_refresh_token_is_rejected_even_if_unused() -> Result<()> {
        let h = harness();
        let user = h.engine.register("alice", "pw123").await?;

        let raw = generate_random_secret(REFRESH_TOKEN_BYTES)?;
        let issued = Utc::now() - Duration::days(31);
        let record = RefreshTokenRecord {
            id: Uuid::now_v7(),
            user_id: user.id,
            hashed_token: hash_secret(&raw),
            expires_at: issued + Duration::days(30),
            revoked: false,
            created_at: issued,
            last_used_at: None,
            device_info: String::new(),
            ip_address: None,
        };
        h.ledger.create(&record).await?;

        let result = h.engine.refresh(&raw, &client()).await;
        assert!(matches!(result, Err(AuthError::ExpiredToken)));
        assert!(h.ledger.get(&record.hashed_token).is_some_and(|r| !r.revoked));
        Ok(())
    }

    #[tokio::test]
    async fn refreshed_access_token_belongs_to_owner() -> Result<()> {
        let h = harness();
        let user = h.engine.register("alice", "pw123").await?;
        let login = h.engine.login("alice", "pw123", &client()).await?;
        let rotated = h.engine.refresh(&login.refresh_token, &client()).await?;

        let claims = h.engine.codec().parse_access_token(&rotated.access_token)?;
        assert_eq!(claims.user_id(), Some(user.id));
        Ok(())
    }

    #[tokio::test]
    async fn failed_rotation_keeps_old_token_valid() -> Result<()> {
        let h = harness();
        h.engine.register("alice", "pw123").await?;
        let login = h.engine.login("alice", "pw123", &client()).await?;

        h.ledger.fail_writes(true);
        let result = h.engine.refresh(&login.refresh_token, &client()).await;
        assert!(matches!(result, Err(AuthError::Store(_))));
        assert!(h
            .ledger
            .get(&hash_secret(&login.refresh_token))
            .is_some_and(|r| !r.revoked));
        assert_eq!(h.ledger.len(), 1);

        h.ledger.fail_writes(false);
        let retried = h.engine.refresh(&login.refresh_token, &client()).await?;
        assert_ne!(retried.refresh_token, login.refresh_token);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_refresh_has_one_winner() -> Result<()> {
        let h = harness();
        h.engine.register("alice", "pw123").await?;

        for _ in 0..16 {
            let login = h.engine.login("alice", "pw123", &client()).await?;

            let tasks: Vec<_> = (0..4)
                .map(|_| {
                    let engine = h.engine.clone();
                    let token = login.refresh_token.clone();
                    tokio::spawn(async move { engine.refresh(&token, &client()).await })
                })
                .collect();

            let mut winners = Vec::new();
            for handle in tasks {
                match handle.await? {
                    Ok(pair) => winners.push(pair),
                    Err(AuthError::RevokedToken) => {}
                    Err(other) => return Err(anyhow!("unexpected error: {other}")),
                }
            }
            assert_eq!(winners.len(), 1);

            // The winning replacement is the only live descendant.
            let winner = winners.remove(0);
            h.engine.refresh(&winner.refresh_token, &client()).await?;
        }
        Ok(())
    }

    #[tokio::test]
    async fn revoke_invalidates_refresh_token() -> Result<()> {
        let h = harness();
        h.engine.register("alice", "pw123").await?;
        let login = h.engine.login("alice", "pw123", &client()).await?;

        assert!(h.engine.revoke(&login.refresh_token).await?);
        assert!(!h.engine.revoke(&login.refresh_token).await?);
        assert!(!h.engine.revoke("unknown").await?);

        let result = h.engine.refresh(&login.refresh_token, &client()).await;
        assert!(matches!(result, Err(AuthError::RevokedToken)));
        Ok(())
    }

    #[tokio::test]
    async fn scenario_alice() -> Result<()> {
        let h = harness();
        let user = h.engine.register("alice", "pw123").await?;
        assert_eq!(user.username, "alice");

        let first = h.engine.login("alice", "pw123", &client()).await?;
        let second = h.engine.login("alice", "pw123", &client()).await?;
        assert_ne!(first.refresh_token, second.refresh_token);

        let token1 = first.refresh_token;
        let rotated = h.engine.refresh(&token1, &client()).await?;
        assert_ne!(rotated.refresh_token, token1);
        assert!(matches!(
            h.engine.refresh(&token1, &client()).await,
            Err(AuthError::RevokedToken)
        ));
        Ok(())
    }

    #[test]
    fn token_pair_debug_redacts() {
        let pair = TokenPair {
            access_token: "eyJ.secret".to_string(),
            refresh_token: "raw-secret".to_string(),
        };
        let rendered = format!("{pair:?}");
        assert!(!rendered.contains("secret"));
    }
}
