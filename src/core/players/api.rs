//! Player API endpoints
//!
//! - GET /v1/players/{player_id} - Any authenticated caller
//! - PATCH /v1/players/{player_id} - `update:player` or the owning account
//! - DELETE /v1/accounts/{account_id} - `delete:player` or the account itself

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, State,
        rejection::PathRejection,
    },
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{delete, get, patch},
};
use uuid::Uuid;

use crate::core::auth::access::{AccessRule, OwnerKind, OwnershipRule, ResolverError, enforce};
use crate::core::auth::jwt::JwtService;
use crate::core::auth::middleware::{Identity, require_auth};
use crate::core::auth::permissions::Permission;
use crate::core::db::models::{Player, UpdatePlayer};
use crate::core::db::repositories::{
    AccountRepository, AccountRepositoryError, PlayerRepository, PlayerRepositoryError,
};
use crate::core::error::{ApiError, FieldLocation, InvalidField, ValidatedJson};

/// Player API state
#[derive(Clone)]
pub struct PlayerApiState {
    pub players: PlayerRepository,
    pub accounts: AccountRepository,
    pub jwt: JwtService,
}

impl From<PlayerRepositoryError> for ApiError {
    fn from(err: PlayerRepositoryError) -> Self {
        match err {
            PlayerRepositoryError::NotFound => ApiError::not_found("player not found"),
            PlayerRepositoryError::DatabaseError(e) => {
                tracing::error!(error = %e, "player query failed");
                ApiError::internal()
            }
        }
    }
}

impl From<AccountRepositoryError> for ApiError {
    fn from(err: AccountRepositoryError) -> Self {
        match err {
            AccountRepositoryError::NotFound => ApiError::not_found("account not found"),
            other => {
                tracing::error!(error = %other, "account query failed");
                ApiError::internal()
            }
        }
    }
}

fn path_id(path: Result<Path<Uuid>, PathRejection>, field: &str) -> Result<Uuid, ApiError> {
    path.map(|Path(id)| id).map_err(|rejection| {
        tracing::debug!(error = %rejection, "rejected path parameter");
        ApiError::validation(vec![InvalidField::new(
            field,
            "must be a UUID",
            FieldLocation::Path,
        )])
    })
}

/// Owner check for `/v1/players/{player_id}`: the player belongs to the caller's account
fn player_owned_by_caller(players: PlayerRepository) -> OwnershipRule {
    OwnershipRule::new(
        OwnerKind::Account,
        "player_id",
        move |player_id: String, account_id: Uuid| {
            let players = players.clone();
            async move {
                let Ok(player_id) = Uuid::parse_str(&player_id) else {
                    return Ok(false);
                };
                players
                    .is_owned_by_account(player_id, account_id)
                    .await
                    .map_err(ResolverError::from)
            }
        },
    )
}

/// Create the player API router
pub fn player_api_router(state: PlayerApiState) -> Router {
    let update_rule = Arc::new(AccessRule::PermissionOrOwnership(
        Permission::UpdatePlayer,
        player_owned_by_caller(state.players.clone()),
    ));
    let delete_rule = Arc::new(AccessRule::PermissionOrOwnership(
        Permission::DeletePlayer,
        OwnershipRule::is_self(OwnerKind::Account, "account_id"),
    ));
    let jwt = state.jwt.clone();
    let state = Arc::new(state);

    let read = Router::new().route("/v1/players/{player_id}", get(get_player_handler));

    let update = Router::new()
        .route("/v1/players/{player_id}", patch(update_player_handler))
        .route_layer(from_fn_with_state(update_rule, enforce));

    let remove = Router::new()
        .route("/v1/accounts/{account_id}", delete(delete_account_handler))
        .route_layer(from_fn_with_state(delete_rule, enforce));

    read.merge(update)
        .merge(remove)
        .route_layer(from_fn_with_state(jwt, require_auth))
        .with_state(state)
}

/// GET /v1/players/{player_id}
async fn get_player_handler(
    State(state): State<Arc<PlayerApiState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Player>, ApiError> {
    let player_id = path_id(path, "player_id")?;

    let player = state
        .players
        .find_by_id(player_id)
        .await?
        .ok_or(PlayerRepositoryError::NotFound)?;

    Ok(Json(player))
}

/// PATCH /v1/players/{player_id}
async fn update_player_handler(
    State(state): State<Arc<PlayerApiState>>,
    identity: Identity,
    path: Result<Path<Uuid>, PathRejection>,
    ValidatedJson(updates): ValidatedJson<UpdatePlayer>,
) -> Result<Json<Player>, ApiError> {
    let player_id = path_id(path, "player_id")?;

    let player = state.players.update(player_id, &updates).await?;

    tracing::info!(%player_id, by = %identity.account_id, "player profile updated");
    Ok(Json(player))
}

/// DELETE /v1/accounts/{account_id}
async fn delete_account_handler(
    State(state): State<Arc<PlayerApiState>>,
    identity: Identity,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let account_id = path_id(path, "account_id")?;

    state.accounts.delete(account_id).await?;

    tracing::info!(%account_id, by = %identity.account_id, "account deleted");
    Ok(StatusCode::NO_CONTENT)
}
