//! Bearer token middleware
//!
//! Verifies the `Authorization: Bearer` access token and publishes the
//! caller's [`Identity`] in the request extensions for the access gate and
//! handlers further down the stack.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};
use uuid::Uuid;

use crate::core::auth::jwt::{JwtError, JwtService};
use crate::core::error::ApiError;

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub account_id: Uuid,
    /// Role name exactly as carried in the token
    pub role: String,
    pub player_id: Uuid,
}

fn token_error(err: &JwtError) -> ApiError {
    match err {
        JwtError::Expired => ApiError::unauthorized("access token is expired"),
        _ => ApiError::unauthorized("invalid access token"),
    }
}

/// Decode a bearer token into the identity it carries
pub fn authenticate(jwt: &JwtService, token: &str) -> Result<Identity, JwtError> {
    let claims = jwt.decode(token)?;

    Ok(Identity {
        account_id: claims.account_id()?,
        role: claims.role,
        player_id: claims.player_id,
    })
}

/// Reject requests without a valid access token; attach [`Identity`] otherwise
pub async fn require_auth(
    State(jwt): State<JwtService>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.map_err(|rejection| {
        tracing::debug!(reason = %rejection, "request without bearer token");
        ApiError::unauthorized("missing bearer token")
    })?;

    let identity = authenticate(&jwt, bearer.token()).map_err(|err| {
        tracing::info!(error = %err, "access token rejected");
        token_error(&err)
    })?;

    tracing::trace!(account_id = %identity.account_id, role = %identity.role, "request authenticated");
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Identity>().cloned().ok_or_else(|| {
            tracing::error!(path = %parts.uri.path(), "identity requested on a route without require_auth");
            ApiError::internal()
        })
    }
}
