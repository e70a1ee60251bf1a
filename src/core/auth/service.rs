//! Authentication service
//!
//! Signup, login, refresh-token rotation and logout. Every operation that
//! writes more than one row runs inside a single database transaction; an
//! early return drops the transaction, which rolls it back.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::core::auth::jwt::{JwtError, JwtService, TokenPair};
use crate::core::auth::password::{MAX_PASSWORD_BYTES, PasswordError, PasswordHasher};
use crate::core::auth::permissions::Role;
use crate::core::clock::{Clock, SystemClock};
use crate::core::db::models::{ClientMetadata, CreateAccount, CreateRefreshToken, Gender};
use crate::core::db::repositories::{
    AccountRepository, AccountRepositoryError, PlayerRepository, PlayerRepositoryError,
    RefreshTokenRepository, RefreshTokenRepositoryError,
};
use crate::core::error::ErrorKind;

/// Authentication service error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid date of birth {0:?}")]
    InvalidBirthDate(String),

    #[error("account with email already exists")]
    EmailAlreadyExists,

    #[error("no account with that email")]
    AccountNotFound,

    #[error("password does not match")]
    PasswordMismatch,

    #[error("refresh token not found")]
    RefreshTokenNotFound,

    #[error("refresh token is revoked")]
    RefreshTokenRevoked,

    #[error("refresh token is expired")]
    RefreshTokenExpired,

    #[error("Password hashing failed: {0}")]
    Password(#[from] PasswordError),

    #[error("Token minting failed: {0}")]
    Token(#[from] JwtError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Refresh token store error: {0}")]
    RefreshTokenStore(#[from] RefreshTokenRepositoryError),

    #[error("Player store error: {0}")]
    PlayerStore(#[from] PlayerRepositoryError),
}

impl From<AccountRepositoryError> for AuthError {
    fn from(err: AccountRepositoryError) -> Self {
        match err {
            AccountRepositoryError::EmailAlreadyExists => AuthError::EmailAlreadyExists,
            AccountRepositoryError::NotFound => AuthError::AccountNotFound,
            AccountRepositoryError::DatabaseError(e) => AuthError::Database(e),
        }
    }
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::InvalidBirthDate(_) => ErrorKind::Validation,
            AuthError::EmailAlreadyExists => ErrorKind::Duplicate,
            AuthError::AccountNotFound | AuthError::PasswordMismatch => ErrorKind::NotFound,
            AuthError::RefreshTokenNotFound
            | AuthError::RefreshTokenRevoked
            | AuthError::RefreshTokenExpired => ErrorKind::Unauthorized,
            AuthError::Password(_)
            | AuthError::Token(_)
            | AuthError::Database(_)
            | AuthError::RefreshTokenStore(_)
            | AuthError::PlayerStore(_) => ErrorKind::Internal,
        }
    }
}

const DOB_FORMAT: &str = "%Y-%m-%d";

fn validate_password_bytes(password: &str) -> Result<(), ValidationError> {
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(ValidationError::new("length")
            .with_message(format!("must be at most {MAX_PASSWORD_BYTES} bytes").into()));
    }
    Ok(())
}

fn validate_dob(dob: &str) -> Result<(), ValidationError> {
    NaiveDate::parse_from_str(dob, DOB_FORMAT)
        .map(|_| ())
        .map_err(|_| {
            ValidationError::new("date").with_message("must be a date in YYYY-MM-DD format".into())
        })
}

/// Signup request data
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(email, length(max = 255))]
    pub email: String,
    #[validate(custom(function = "validate_dob"))]
    pub dob: String,
    pub gender: Gender,
    #[validate(length(min = 1, max = 32))]
    pub phone: String,
    #[validate(length(min = 8), custom(function = "validate_password_bytes"))]
    pub password: String,
}

/// Login request data
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub refresh_token: String,
}

/// Password reset request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PasswordResetRequest {
    #[validate(email)]
    pub email: String,
}

/// Token pair as returned to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
}

impl From<TokenPair> for AuthResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }
    }
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    pool: PgPool,
    accounts: AccountRepository,
    players: PlayerRepository,
    refresh_tokens: RefreshTokenRepository,
    jwt: JwtService,
    hasher: PasswordHasher,
    clock: Arc<dyn Clock>,
}

impl AuthService {
    /// Create a new authentication service reading time from the system clock
    pub fn new(pool: PgPool, jwt: JwtService, hasher: PasswordHasher) -> Self {
        Self::with_clock(pool, jwt, hasher, Arc::new(SystemClock))
    }

    pub fn with_clock(
        pool: PgPool,
        jwt: JwtService,
        hasher: PasswordHasher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            accounts: AccountRepository::new(pool.clone()),
            players: PlayerRepository::new(pool.clone()),
            refresh_tokens: RefreshTokenRepository::new(pool.clone()),
            pool,
            jwt,
            hasher,
            clock,
        }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    /// Mint a pair and persist the digest of its refresh token on `conn`
    async fn issue_pair(
        &self,
        conn: &mut PgConnection,
        account_id: Uuid,
        role: Role,
        player_id: Uuid,
        client: ClientMetadata,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let pair = self
            .jwt
            .generate_token_pair(account_id, role.as_str(), player_id, now)?;

        let record = CreateRefreshToken {
            account_id,
            token_hash: RefreshTokenRepository::hash_token(&pair.refresh_token),
            issued_at: pair.issued_at,
            expires_at: pair.refresh_expires_at,
            client,
        };
        self.refresh_tokens.insert(Some(conn), &record).await?;

        Ok(pair)
    }

    /// Register an account with its player profile and first token pair
    pub async fn signup(
        &self,
        request: SignupRequest,
        client: ClientMetadata,
    ) -> Result<TokenPair, AuthError> {
        let dob = NaiveDate::parse_from_str(&request.dob, DOB_FORMAT)
            .map_err(|_| AuthError::InvalidBirthDate(request.dob.clone()))?;

        let password_hash = self.hasher.hash_blocking(&request.password).await?;

        if self.accounts.find_by_email(None, &request.email).await?.is_some() {
            return Err(AuthError::EmailAlreadyExists);
        }

        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        let account = self
            .accounts
            .insert(
                Some(&mut *tx),
                &CreateAccount {
                    name: request.name,
                    email: request.email,
                    dob,
                    gender: request.gender,
                    phone_number: request.phone,
                    password_hash,
                },
            )
            .await?;
        let player = self.players.insert(Some(&mut *tx), account.id).await?;

        let pair = self
            .issue_pair(&mut *tx, account.id, account.role, player.id, client, now)
            .await?;

        tx.commit().await?;

        tracing::info!(account_id = %account.id, player_id = %player.id, "account signed up");
        Ok(pair)
    }

    /// Exchange credentials for a new pair, revoking every earlier refresh token
    pub async fn login(
        &self,
        request: LoginRequest,
        client: ClientMetadata,
    ) -> Result<TokenPair, AuthError> {
        let Some(found) = self
            .accounts
            .find_by_email_with_player(None, &request.email)
            .await?
        else {
            self.hasher.verify_missing_blocking(&request.password).await?;
            return Err(AuthError::AccountNotFound);
        };

        let verification = self
            .hasher
            .verify_blocking(&found.account.password, &request.password)
            .await?;
        if !verification.is_match() {
            return Err(AuthError::PasswordMismatch);
        }

        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        if !self.accounts.lock(&mut *tx, found.account.id).await? {
            return Err(AuthError::AccountNotFound);
        }

        let revoked = self
            .refresh_tokens
            .revoke_all_for_account(Some(&mut *tx), found.account.id)
            .await?;

        let pair = self
            .issue_pair(
                &mut *tx,
                found.account.id,
                found.account.role,
                found.player_id,
                client,
                now,
            )
            .await?;

        tx.commit().await?;

        tracing::info!(account_id = %found.account.id, revoked, "account logged in");
        Ok(pair)
    }

    /// Rotate a refresh token.
    ///
    /// Runs under the owning account's row lock, like `login`, so at most one
    /// refresh token of an account is live once either commits.
    ///
    /// Presenting a revoked token revokes every remaining token of the
    /// account. Presenting an expired token revokes it. Both outcomes are
    /// committed before the error is returned.
    pub async fn refresh(
        &self,
        request: RefreshRequest,
        client: ClientMetadata,
    ) -> Result<TokenPair, AuthError> {
        let digest = RefreshTokenRepository::hash_token(&request.refresh_token);
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        // Account first, then the token row: the same order login uses
        let owner = self
            .refresh_tokens
            .find_owner(Some(&mut *tx), &digest)
            .await?
            .ok_or(AuthError::RefreshTokenNotFound)?;
        if !self.accounts.lock(&mut *tx, owner).await? {
            return Err(AuthError::RefreshTokenNotFound);
        }

        let found = self
            .refresh_tokens
            .find_by_digest(Some(&mut *tx), &digest)
            .await?
            .ok_or(AuthError::RefreshTokenNotFound)?;
        let token = &found.token;

        if token.is_revoked {
            let revoked = self
                .refresh_tokens
                .revoke_all_for_account(Some(&mut *tx), token.account_id)
                .await?;
            tx.commit().await?;

            tracing::warn!(
                account_id = %token.account_id,
                token_id = %token.id,
                revoked,
                "revoked refresh token replayed; revoked all tokens of the account"
            );
            return Err(AuthError::RefreshTokenRevoked);
        }

        if token.is_expired_at(now) {
            self.refresh_tokens
                .revoke_by_id(Some(&mut *tx), token.id)
                .await?;
            tx.commit().await?;

            tracing::info!(account_id = %token.account_id, token_id = %token.id, "expired refresh token presented");
            return Err(AuthError::RefreshTokenExpired);
        }

        self.refresh_tokens
            .mark_used(Some(&mut *tx), &digest, now)
            .await?;
        self.refresh_tokens
            .revoke_by_id(Some(&mut *tx), token.id)
            .await?;

        let pair = self
            .issue_pair(
                &mut *tx,
                token.account_id,
                found.role,
                found.player_id,
                client,
                now,
            )
            .await?;

        tx.commit().await?;

        tracing::debug!(account_id = %token.account_id, rotated = %token.id, "refresh token rotated");
        Ok(pair)
    }

    /// Revoke every live refresh token of an account
    pub async fn logout(&self, account_id: Uuid) -> Result<u64, AuthError> {
        let revoked = self
            .refresh_tokens
            .revoke_all_for_account(None, account_id)
            .await?;

        tracing::info!(%account_id, revoked, "account logged out");
        Ok(revoked)
    }
}
