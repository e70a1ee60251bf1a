//! Player profile repository

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::core::db::models::{Player, UpdatePlayer};

/// Player repository error types
#[derive(Debug, thiserror::Error)]
pub enum PlayerRepositoryError {
    #[error("Player not found")]
    NotFound,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

const PLAYER_COLUMNS: &str = "id, account_id, height, weight, handedness, racket, \
     matches_played, matches_won, matches_scheduled, seasons_played, current_league_id, created_at";

/// Player repository for database operations
#[derive(Clone)]
pub struct PlayerRepository {
    pool: PgPool,
}

impl PlayerRepository {
    /// Create a new player repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the empty player profile of an account
    pub async fn insert(
        &self,
        tx: Option<&mut PgConnection>,
        account_id: Uuid,
    ) -> Result<Player, PlayerRepositoryError> {
        let sql = format!("INSERT INTO player (account_id) VALUES ($1) RETURNING {PLAYER_COLUMNS}");
        let query = sqlx::query_as::<_, Player>(&sql).bind(account_id);

        let player = match tx {
            Some(conn) => query.fetch_one(conn).await?,
            None => query.fetch_one(&self.pool).await?,
        };

        Ok(player)
    }

    /// Find a player by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Player>, PlayerRepositoryError> {
        let sql = format!("SELECT {PLAYER_COLUMNS} FROM player WHERE id = $1");
        let player = sqlx::query_as::<_, Player>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(player)
    }

    /// Update profile fields. Absent fields keep their value; explicit nulls clear it.
    pub async fn update(
        &self,
        id: Uuid,
        updates: &UpdatePlayer,
    ) -> Result<Player, PlayerRepositoryError> {
        let sql = format!(
            r#"
            UPDATE player SET
                height = CASE WHEN $2 THEN $3 ELSE height END,
                weight = CASE WHEN $4 THEN $5 ELSE weight END,
                handedness = CASE WHEN $6 THEN $7 ELSE handedness END,
                racket = CASE WHEN $8 THEN $9 ELSE racket END
            WHERE id = $1
            RETURNING {PLAYER_COLUMNS}
            "#
        );

        let player = sqlx::query_as::<_, Player>(&sql)
            .bind(id)
            .bind(updates.height.is_some())
            .bind(updates.height.flatten())
            .bind(updates.weight.is_some())
            .bind(updates.weight.flatten())
            .bind(updates.handedness.is_some())
            .bind(updates.handedness.clone().flatten())
            .bind(updates.racket.is_some())
            .bind(updates.racket.clone().flatten())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(PlayerRepositoryError::NotFound)?;

        Ok(player)
    }

    /// Whether the player profile belongs to the account
    pub async fn is_owned_by_account(
        &self,
        player_id: Uuid,
        account_id: Uuid,
    ) -> Result<bool, PlayerRepositoryError> {
        let owned: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM player WHERE id = $1 AND account_id = $2)",
        )
        .bind(player_id)
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(owned.0)
    }
}
