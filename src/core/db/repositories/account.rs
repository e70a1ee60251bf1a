//! Account repository for database operations

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::core::db::models::{Account, AccountWithPlayer, CreateAccount};

/// Account repository error types
#[derive(Debug, thiserror::Error)]
pub enum AccountRepositoryError {
    #[error("Account not found")]
    NotFound,

    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Canonical form of an email address as stored on `account.email`
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Account repository for database operations
#[derive(Clone)]
pub struct AccountRepository {
    pool: PgPool,
}

impl AccountRepository {
    /// Create a new account repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert an account. The email is normalized before it is stored.
    pub async fn insert(
        &self,
        tx: Option<&mut PgConnection>,
        dto: &CreateAccount,
    ) -> Result<Account, AccountRepositoryError> {
        let query = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO account (name, email, dob, gender, phone_number, password)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, name, email, dob, gender, phone_number, password, role, created_at
            "#,
        )
        .bind(&dto.name)
        .bind(normalize_email(&dto.email))
        .bind(dto.dob)
        .bind(dto.gender)
        .bind(&dto.phone_number)
        .bind(&dto.password_hash);

        let result = match tx {
            Some(conn) => query.fetch_one(conn).await,
            None => query.fetch_one(&self.pool).await,
        };

        result.map_err(|err| match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AccountRepositoryError::EmailAlreadyExists
            }
            _ => AccountRepositoryError::DatabaseError(err),
        })
    }

    /// Find an account by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, AccountRepositoryError> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, name, email, dob, gender, phone_number, password, role, created_at
            FROM account
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    /// Find an account by email
    pub async fn find_by_email(
        &self,
        tx: Option<&mut PgConnection>,
        email: &str,
    ) -> Result<Option<Account>, AccountRepositoryError> {
        let query = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, name, email, dob, gender, phone_number, password, role, created_at
            FROM account
            WHERE email = $1
            "#,
        )
        .bind(normalize_email(email));

        let account = match tx {
            Some(conn) => query.fetch_optional(conn).await?,
            None => query.fetch_optional(&self.pool).await?,
        };

        Ok(account)
    }

    /// Find an account by email together with its player profile id
    pub async fn find_by_email_with_player(
        &self,
        tx: Option<&mut PgConnection>,
        email: &str,
    ) -> Result<Option<AccountWithPlayer>, AccountRepositoryError> {
        let query = sqlx::query_as::<_, AccountWithPlayer>(
            r#"
            SELECT a.id, a.name, a.email, a.dob, a.gender, a.phone_number, a.password,
                   a.role, a.created_at, p.id AS player_id
            FROM account a
            JOIN player p ON p.account_id = a.id
            WHERE a.email = $1
            "#,
        )
        .bind(normalize_email(email));

        let account = match tx {
            Some(conn) => query.fetch_optional(conn).await?,
            None => query.fetch_optional(&self.pool).await?,
        };

        Ok(account)
    }

    /// Lock the account row until the surrounding transaction ends.
    ///
    /// Login and refresh take this lock before touching refresh tokens, so
    /// token issuance for one account is serialized. Returns `false` when
    /// the account no longer exists.
    pub async fn lock(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<bool, AccountRepositoryError> {
        let locked = sqlx::query_scalar::<_, Uuid>("SELECT id FROM account WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await?;

        Ok(locked.is_some())
    }

    /// Delete an account. Its player profile and refresh tokens cascade.
    pub async fn delete(&self, id: Uuid) -> Result<(), AccountRepositoryError> {
        let result = sqlx::query("DELETE FROM account WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AccountRepositoryError::NotFound);
        }

        Ok(())
    }
}
