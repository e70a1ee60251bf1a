//! HTTP application: shared state and the top-level router

use axum::{
    Json, Router,
    extract::{MatchedPath, Request, State},
    http::{HeaderValue, Method, StatusCode, header},
    routing::get,
};
use serde_json::json;
use sqlx::PgPool;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{Span, info_span};

use crate::core::auth::{AuthApiState, AuthService, JwtService, PasswordHasher, auth_api_router};
use crate::core::config::Config;
use crate::core::db::pool;
use crate::core::db::repositories::{AccountRepository, PlayerRepository};
use crate::core::players::{PlayerApiState, player_api_router};

/// Everything the routers need, built once at startup
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub jwt: JwtService,
    pub auth: AuthService,
    pub cors_allowed_origins: Vec<String>,
}

impl AppState {
    pub fn new(pool: PgPool, config: &Config) -> Self {
        let jwt = JwtService::new(config.jwt.clone());
        let auth = AuthService::new(pool.clone(), jwt.clone(), PasswordHasher::new(config.bcrypt_cost));

        Self {
            pool,
            jwt,
            auth,
            cors_allowed_origins: config.cors_allowed_origins.clone(),
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring malformed CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_origin(AllowOrigin::list(origins))
}

fn make_span(request: &Request) -> Span {
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
    )
}

/// GET /health
async fn health_handler(State(pool): State<PgPool>) -> (StatusCode, Json<serde_json::Value>) {
    match pool::health_check(&pool).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(err) => {
            tracing::error!(error = %err, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        }
    }
}

/// Build the full application router
pub fn build_router(state: AppState) -> Router {
    let auth_api = auth_api_router(AuthApiState {
        auth_service: state.auth.clone(),
    });
    let player_api = player_api_router(PlayerApiState {
        players: PlayerRepository::new(state.pool.clone()),
        accounts: AccountRepository::new(state.pool.clone()),
        jwt: state.jwt.clone(),
    });

    Router::new()
        .route("/health", get(health_handler).with_state(state.pool.clone()))
        .merge(auth_api)
        .merge(player_api)
        .layer(TraceLayer::new_for_http().make_span_with(make_span))
        .layer(cors_layer(&state.cors_allowed_origins))
}
