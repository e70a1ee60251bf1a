//! Auth API endpoints
//!
//! - POST /v1/auth/signup - Register an account and get tokens
//! - POST /v1/auth/tokens/access - Exchange credentials for tokens
//! - POST /v1/auth/tokens/refresh - Rotate a refresh token
//! - POST /v1/auth/logout - Revoke every refresh token of the caller
//! - POST /v1/auth/password/reset - Request a password reset (accepted, not delivered)

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequestParts, State},
    http::{HeaderMap, StatusCode, header, request::Parts},
    middleware::from_fn_with_state,
    routing::post,
};
use serde::Serialize;

use crate::core::auth::middleware::{Identity, require_auth};
use crate::core::auth::service::{
    AuthError, AuthResponse, AuthService, LoginRequest, PasswordResetRequest, RefreshRequest,
    SignupRequest,
};
use crate::core::db::models::ClientMetadata;
use crate::core::error::{ApiError, FieldLocation, InvalidField, ValidatedJson};

const DEVICE_ID_HEADER: &str = "x-device-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

const MAX_DEVICE_ID_LEN: usize = 255;
const MAX_IP_ADDRESS_LEN: usize = 64;

/// Auth API state containing the auth service
#[derive(Clone)]
pub struct AuthApiState {
    pub auth_service: AuthService,
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match &err {
            AuthError::InvalidBirthDate(_) => ApiError::validation(vec![InvalidField::new(
                "dob",
                "must be a date in YYYY-MM-DD format",
                FieldLocation::Body,
            )]),
            AuthError::EmailAlreadyExists => ApiError::new(err.kind().status(), err.to_string()),
            AuthError::AccountNotFound | AuthError::PasswordMismatch => {
                tracing::info!(reason = %err, "login rejected");
                ApiError::unauthorized("invalid email or password")
            }
            AuthError::RefreshTokenNotFound
            | AuthError::RefreshTokenRevoked
            | AuthError::RefreshTokenExpired => ApiError::unauthorized(err.to_string()),
            AuthError::Password(_)
            | AuthError::Token(_)
            | AuthError::Database(_)
            | AuthError::RefreshTokenStore(_)
            | AuthError::PlayerStore(_) => {
                tracing::error!(error = %err, "auth operation failed");
                ApiError::internal()
            }
        }
    }
}

fn header_value(headers: &HeaderMap, name: impl header::AsHeaderName, max_len: usize) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }
    Some(value.chars().take(max_len).collect())
}

/// Client details taken from request headers
pub fn client_metadata(headers: &HeaderMap) -> ClientMetadata {
    let ip_address = header_value(headers, FORWARDED_FOR_HEADER, usize::MAX).and_then(|value| {
        value
            .split(',')
            .next()
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(|ip| ip.chars().take(MAX_IP_ADDRESS_LEN).collect())
    });

    ClientMetadata {
        device_id: header_value(headers, DEVICE_ID_HEADER, MAX_DEVICE_ID_LEN),
        ip_address,
        user_agent: header_value(headers, header::USER_AGENT, usize::MAX),
    }
}

impl<S> FromRequestParts<S> for ClientMetadata
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(client_metadata(&parts.headers))
    }
}

/// Generic message body
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Create the auth API router
pub fn auth_api_router(state: AuthApiState) -> Router {
    let jwt = state.auth_service.jwt().clone();
    let state = Arc::new(state);

    let authenticated = Router::new()
        .route("/v1/auth/logout", post(logout_handler))
        .route_layer(from_fn_with_state(jwt, require_auth));

    Router::new()
        .route("/v1/auth/signup", post(signup_handler))
        .route("/v1/auth/tokens/access", post(access_handler))
        .route("/v1/auth/tokens/refresh", post(refresh_handler))
        .route("/v1/auth/password/reset", post(password_reset_handler))
        .merge(authenticated)
        .with_state(state)
}

/// POST /v1/auth/signup
async fn signup_handler(
    State(state): State<Arc<AuthApiState>>,
    client: ClientMetadata,
    ValidatedJson(request): ValidatedJson<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    tracing::debug!(email = %request.email, "signup attempt");

    let pair = state.auth_service.signup(request, client).await?;

    Ok((StatusCode::CREATED, Json(pair.into())))
}

/// POST /v1/auth/tokens/access
async fn access_handler(
    State(state): State<Arc<AuthApiState>>,
    client: ClientMetadata,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    tracing::debug!(email = %request.email, "login attempt");

    let pair = state.auth_service.login(request, client).await?;

    Ok(Json(pair.into()))
}

/// POST /v1/auth/tokens/refresh
async fn refresh_handler(
    State(state): State<Arc<AuthApiState>>,
    client: ClientMetadata,
    ValidatedJson(request): ValidatedJson<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let pair = state.auth_service.refresh(request, client).await?;

    Ok(Json(pair.into()))
}

/// POST /v1/auth/logout
async fn logout_handler(
    State(state): State<Arc<AuthApiState>>,
    identity: Identity,
) -> Result<StatusCode, ApiError> {
    state.auth_service.logout(identity.account_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/auth/password/reset
///
/// Always accepted so the response does not reveal whether the email is registered.
async fn password_reset_handler(
    ValidatedJson(request): ValidatedJson<PasswordResetRequest>,
) -> (StatusCode, Json<MessageResponse>) {
    tracing::info!(email = %request.email, "password reset requested");

    (
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "if the account exists, reset instructions will be sent".to_string(),
        }),
    )
}
