//! Refresh token repository
//!
//! Persists the rotation lifecycle of refresh tokens. Tokens are stored as
//! SHA-256 hex digests; the plaintext never reaches the database.
//!
//! Every write accepts an optional transaction connection. With `Some`, the
//! statement runs on that connection and the caller owns commit/rollback;
//! with `None` it runs on the pool as its own implicit transaction.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::core::db::models::{CreateRefreshToken, RefreshToken, RefreshTokenWithOwner};

/// Refresh token repository error types
#[derive(Debug, thiserror::Error)]
pub enum RefreshTokenRepositoryError {
    #[error("Refresh token digest already stored")]
    DuplicateDigest,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

fn map_insert_error(err: sqlx::Error) -> RefreshTokenRepositoryError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            RefreshTokenRepositoryError::DuplicateDigest
        }
        _ => RefreshTokenRepositoryError::DatabaseError(err),
    }
}

/// Refresh token repository for database operations
#[derive(Clone)]
pub struct RefreshTokenRepository {
    pool: PgPool,
}

impl RefreshTokenRepository {
    /// Create a new refresh token repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Hash a token using SHA-256, hex encoded
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        let result = hasher.finalize();
        hex::encode(result)
    }

    /// Append a new refresh token row
    pub async fn insert(
        &self,
        tx: Option<&mut PgConnection>,
        dto: &CreateRefreshToken,
    ) -> Result<RefreshToken, RefreshTokenRepositoryError> {
        let query = sqlx::query_as::<_, RefreshToken>(
            r#"
            INSERT INTO refresh_token
                (account_id, token_hash, device_id, ip_address, user_agent, issued_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, account_id, token_hash, device_id, ip_address, user_agent,
                      issued_at, expires_at, last_used_at, is_revoked
            "#,
        )
        .bind(dto.account_id)
        .bind(&dto.token_hash)
        .bind(&dto.client.device_id)
        .bind(&dto.client.ip_address)
        .bind(&dto.client.user_agent)
        .bind(dto.issued_at)
        .bind(dto.expires_at);

        let token = match tx {
            Some(conn) => query.fetch_one(conn).await,
            None => query.fetch_one(&self.pool).await,
        }
        .map_err(map_insert_error)?;

        Ok(token)
    }

    /// Find a token by digest, together with the owner's role and player id.
    ///
    /// The matched `refresh_token` row is locked `FOR UPDATE` so that a
    /// concurrent rotation of the same token waits for this transaction and
    /// then observes its outcome.
    pub async fn find_by_digest(
        &self,
        tx: Option<&mut PgConnection>,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenWithOwner>, RefreshTokenRepositoryError> {
        let query = sqlx::query_as::<_, RefreshTokenWithOwner>(
            r#"
            SELECT rt.id, rt.account_id, rt.token_hash, rt.device_id, rt.ip_address,
                   rt.user_agent, rt.issued_at, rt.expires_at, rt.last_used_at,
                   rt.is_revoked, a.role, p.id AS player_id
            FROM refresh_token rt
            JOIN account a ON a.id = rt.account_id
            JOIN player p ON p.account_id = a.id
            WHERE rt.token_hash = $1
            FOR UPDATE OF rt
            "#,
        )
        .bind(token_hash);

        let token = match tx {
            Some(conn) => query.fetch_optional(conn).await?,
            None => query.fetch_optional(&self.pool).await?,
        };

        Ok(token)
    }

    /// Account owning the token with this digest, without locking anything
    pub async fn find_owner(
        &self,
        tx: Option<&mut PgConnection>,
        token_hash: &str,
    ) -> Result<Option<Uuid>, RefreshTokenRepositoryError> {
        let query = sqlx::query_scalar::<_, Uuid>(
            "SELECT account_id FROM refresh_token WHERE token_hash = $1",
        )
        .bind(token_hash);

        let owner = match tx {
            Some(conn) => query.fetch_optional(conn).await?,
            None => query.fetch_optional(&self.pool).await?,
        };

        Ok(owner)
    }

    /// Record that the token was presented
    pub async fn mark_used(
        &self,
        tx: Option<&mut PgConnection>,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RefreshTokenRepositoryError> {
        let query = sqlx::query(
            r#"
            UPDATE refresh_token
            SET last_used_at = $2
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .bind(now);

        let result = match tx {
            Some(conn) => query.execute(conn).await?,
            None => query.execute(&self.pool).await?,
        };

        Ok(result.rows_affected() > 0)
    }

    /// Revoke a single token. Returns false if it was already revoked.
    pub async fn revoke_by_id(
        &self,
        tx: Option<&mut PgConnection>,
        id: Uuid,
    ) -> Result<bool, RefreshTokenRepositoryError> {
        let query = sqlx::query(
            r#"
            UPDATE refresh_token
            SET is_revoked = TRUE
            WHERE id = $1 AND is_revoked = FALSE
            "#,
        )
        .bind(id);

        let result = match tx {
            Some(conn) => query.execute(conn).await?,
            None => query.execute(&self.pool).await?,
        };

        Ok(result.rows_affected() > 0)
    }

    /// Revoke every not-yet-revoked token of an account
    pub async fn revoke_all_for_account(
        &self,
        tx: Option<&mut PgConnection>,
        account_id: Uuid,
    ) -> Result<u64, RefreshTokenRepositoryError> {
        let query = sqlx::query(
            r#"
            UPDATE refresh_token
            SET is_revoked = TRUE
            WHERE account_id = $1 AND is_revoked = FALSE
            "#,
        )
        .bind(account_id);

        let result = match tx {
            Some(conn) => query.execute(conn).await?,
            None => query.execute(&self.pool).await?,
        };

        Ok(result.rows_affected())
    }

    /// All tokens of an account, newest first
    pub async fn find_by_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<RefreshToken>, RefreshTokenRepositoryError> {
        let tokens = sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT id, account_id, token_hash, device_id, ip_address, user_agent,
                   issued_at, expires_at, last_used_at, is_revoked
            FROM refresh_token
            WHERE account_id = $1
            ORDER BY issued_at DESC, id
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tokens)
    }

    /// Count non-revoked tokens of an account
    pub async fn count_live_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<i64, RefreshTokenRepositoryError> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM refresh_token
            WHERE account_id = $1 AND is_revoked = FALSE
            "#,
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }
}
