//! Postgres-backed stores (`sql/schema.sql`).

use async_trait::async_trait;
use sqlx::{postgres::PgRow, Connection, FromRow, PgPool, Row};
use tracing::{info_span, Instrument};

use super::{CredentialStore, RefreshTokenRecord, StoreError, TokenLedger, TokenState, User};

impl<'r> FromRow<'r, PgRow> for User {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for TokenState {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            revoked: row.try_get("revoked")?,
            expires_at: row.try_get("expires_at")?,
        })
    }
}

fn db_span(operation: &'static str, statement: &'static str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

async fn ping_pool(pool: &PgPool) -> Result<(), StoreError> {
    let mut conn = pool
        .acquire()
        .instrument(info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        ))
        .await?;
    conn.ping()
        .instrument(info_span!(
            "db.ping",
            db.system = "postgresql",
            db.operation = "PING"
        ))
        .await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create(&self, user: &User) -> Result<User, StoreError> {
        let query = r"
            INSERT INTO users (id, username, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, password_hash, created_at, updated_at
        ";
        let stored = sqlx::query_as::<_, User>(query)
            .bind(user.id)
            .bind(&user.username)
            .bind(&user.password_hash)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await?;
        Ok(stored)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let query = r"
            SELECT id, username, password_hash, created_at, updated_at
            FROM users
            WHERE username = $1
        ";
        let user = sqlx::query_as::<_, User>(query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(user)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        ping_pool(&self.pool).await
    }
}

#[derive(Debug, Clone)]
pub struct PgTokenLedger {
    pool: PgPool,
}

impl PgTokenLedger {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const INSERT_REFRESH_TOKEN: &str = r"
    INSERT INTO refresh_tokens
        (id, user_id, hashed_token, expires_at, revoked, created_at, device_info, ip_address)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
";

// Conditional on the flag so concurrent revocations of one row serialize
// and only the first one reports a change.
const REVOKE_REFRESH_TOKEN: &str = r"
    UPDATE refresh_tokens
    SET revoked = TRUE, last_used_at = NOW()
    WHERE hashed_token = $1 AND revoked = FALSE
";

fn insert_record<'q>(
    record: &'q RefreshTokenRecord,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(INSERT_REFRESH_TOKEN)
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.hashed_token)
        .bind(record.expires_at)
        .bind(record.revoked)
        .bind(record.created_at)
        .bind(&record.device_info)
        .bind(record.ip_address)
}

#[async_trait]
impl TokenLedger for PgTokenLedger {
    async fn create(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        insert_record(record)
            .execute(&self.pool)
            .instrument(db_span("INSERT", INSERT_REFRESH_TOKEN))
            .await?;
        Ok(())
    }

    async fn find_by_hash(&self, hashed_token: &str) -> Result<Option<TokenState>, StoreError> {
        let query = r"
            SELECT user_id, revoked, expires_at
            FROM refresh_tokens
            WHERE hashed_token = $1
        ";
        let state = sqlx::query_as::<_, TokenState>(query)
            .bind(hashed_token)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(state)
    }

    async fn revoke_by_hash(&self, hashed_token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(REVOKE_REFRESH_TOKEN)
            .bind(hashed_token)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", REVOKE_REFRESH_TOKEN))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn rotate(
        &self,
        hashed_token: &str,
        replacement: &RefreshTokenRecord,
    ) -> Result<bool, StoreError> {
        // The replacement row is written before the old one is revoked, and
        // both land in one commit or neither does.
        let mut tx = self.pool.begin().await?;

        insert_record(replacement)
            .execute(&mut *tx)
            .instrument(db_span("INSERT", INSERT_REFRESH_TOKEN))
            .await?;

        let revoked = sqlx::query(REVOKE_REFRESH_TOKEN)
            .bind(hashed_token)
            .execute(&mut *tx)
            .instrument(db_span("UPDATE", REVOKE_REFRESH_TOKEN))
            .await?;

        if revoked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        ping_pool(&self.pool).await
    }
}
