//! Database models
//!
//! Entity structs that map to the `account`, `player` and `refresh_token`
//! tables.

use chrono::{DateTime, NaiveDate, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::core::auth::permissions::Role;

/// Helper module for deserializing Option<Option<T>> where:
/// - Missing field -> None (don't update)
/// - Field with null -> Some(None) (set to null)
/// - Field with value -> Some(Some(value)) (set to value)
pub mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

// ============================================================================
// Account Model
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[display("male")]
    Male,
    #[display("female")]
    Female,
}

/// Registered account
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub dob: NaiveDate,
    pub gender: Gender,
    pub phone_number: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Account joined with its player profile id
#[derive(Debug, Clone, FromRow)]
pub struct AccountWithPlayer {
    #[sqlx(flatten)]
    pub account: Account,
    pub player_id: Uuid,
}

/// Account data for creation (password already hashed)
#[derive(Debug, Clone)]
pub struct CreateAccount {
    pub name: String,
    pub email: String,
    pub dob: NaiveDate,
    pub gender: Gender,
    pub phone_number: String,
    pub password_hash: String,
}

// ============================================================================
// Player Model
// ============================================================================

/// Player profile, one per account
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Player {
    pub id: Uuid,
    pub account_id: Uuid,
    pub height: Option<f32>,
    pub weight: Option<f32>,
    pub handedness: Option<String>,
    pub racket: Option<String>,
    pub matches_played: i32,
    pub matches_won: i32,
    pub matches_scheduled: i32,
    pub seasons_played: i32,
    pub current_league_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Player data for updates. Length limits follow the `player` columns.
#[derive(Debug, Clone, Deserialize, Default, Validate)]
pub struct UpdatePlayer {
    #[serde(default, deserialize_with = "double_option::deserialize")]
    pub height: Option<Option<f32>>,
    #[serde(default, deserialize_with = "double_option::deserialize")]
    pub weight: Option<Option<f32>>,
    #[serde(default, deserialize_with = "double_option::deserialize")]
    #[validate(length(max = 16))]
    pub handedness: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option::deserialize")]
    #[validate(length(max = 255))]
    pub racket: Option<Option<String>>,
}

// ============================================================================
// Refresh Token Model
// ============================================================================

/// Refresh token rotation record. Only the digest of the token is stored.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub account_id: Uuid,
    pub token_hash: String,
    pub device_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub is_revoked: bool,
}

impl RefreshToken {
    /// Expired tokens stop being usable exactly at `expires_at`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Refresh token joined with the owner's role and player id
#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenWithOwner {
    #[sqlx(flatten)]
    pub token: RefreshToken,
    pub role: Role,
    pub player_id: Uuid,
}

/// Client details recorded alongside a new refresh token
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMetadata {
    pub device_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Refresh token data for creation (token already digested)
#[derive(Debug, Clone)]
pub struct CreateRefreshToken {
    pub account_id: Uuid,
    pub token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub client: ClientMetadata,
}
