//! Route access rules
//!
//! A route is gated by one [`AccessRule`]: a role permission, ownership of
//! the addressed resource, or either of the two. Rules run after
//! [`require_auth`](crate::core::auth::middleware::require_auth) and read
//! the [`Identity`] it published.
//!
//! ```rust,ignore
//! let rule = AccessRule::PermissionOrOwnership(
//!     Permission::UpdatePlayer,
//!     OwnershipRule::new(OwnerKind::Account, "player_id", resolver),
//! );
//! router
//!     .route_layer(from_fn_with_state(Arc::new(rule), enforce))
//!     .route_layer(from_fn_with_state(jwt, require_auth))
//! ```

use std::{error::Error as StdError, future::Future, sync::Arc};

use axum::{
    extract::{RawPathParams, Request, State, rejection::RawPathParamsRejection},
    middleware::Next,
    response::Response,
};
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::core::auth::middleware::Identity;
use crate::core::auth::permissions::{Permission, is_granted};
use crate::core::error::{ApiError, ErrorKind};

pub type ResolverError = Box<dyn StdError + Send + Sync>;

/// Decides whether `owner_id` owns the resource named by a path parameter
pub type OwnershipResolver =
    Arc<dyn Fn(String, Uuid) -> BoxFuture<'static, Result<bool, ResolverError>> + Send + Sync>;

/// Which identity value is compared against the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerKind {
    Account,
    Player,
}

impl OwnerKind {
    fn owner_id(self, identity: &Identity) -> Uuid {
        match self {
            OwnerKind::Account => identity.account_id,
            OwnerKind::Player => identity.player_id,
        }
    }
}

#[derive(Clone)]
pub struct OwnershipRule {
    pub owner: OwnerKind,
    /// Name of the path parameter carrying the resource id
    pub param: &'static str,
    pub resolver: OwnershipResolver,
}

impl OwnershipRule {
    pub fn new<F, Fut>(owner: OwnerKind, param: &'static str, resolver: F) -> Self
    where
        F: Fn(String, Uuid) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, ResolverError>> + Send + 'static,
    {
        Self {
            owner,
            param,
            resolver: Arc::new(move |resource_id, owner_id| Box::pin(resolver(resource_id, owner_id))),
        }
    }

    /// The resource id in `param` must equal the caller's own id
    pub fn is_self(owner: OwnerKind, param: &'static str) -> Self {
        Self::new(owner, param, |resource_id: String, owner_id: Uuid| async move {
            Ok(Uuid::parse_str(&resource_id).is_ok_and(|id| id == owner_id))
        })
    }
}

impl std::fmt::Debug for OwnershipRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnershipRule")
            .field("owner", &self.owner)
            .field("param", &self.param)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum AccessRule {
    Permission(Permission),
    Ownership(OwnershipRule),
    PermissionOrOwnership(Permission, OwnershipRule),
}

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("request is not authenticated")]
    Unauthenticated,

    #[error("role {role:?} lacks permission {permission}")]
    MissingPermission { role: String, permission: Permission },

    #[error("caller does not own the resource")]
    NotOwner,

    #[error("path parameter {0:?} not present on route")]
    MissingParameter(&'static str),

    #[error("ownership resolver failed: {0}")]
    Resolver(#[source] ResolverError),
}

impl AccessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccessError::Unauthenticated => ErrorKind::Unauthorized,
            AccessError::MissingPermission { .. } | AccessError::NotOwner => ErrorKind::Forbidden,
            AccessError::MissingParameter(_) | AccessError::Resolver(_) => ErrorKind::Internal,
        }
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        match err.kind() {
            ErrorKind::Unauthorized => ApiError::unauthorized("missing bearer token"),
            ErrorKind::Forbidden => {
                tracing::info!(reason = %err, "access denied");
                ApiError::forbidden("access denied")
            }
            _ => {
                tracing::error!(error = %err, "access check failed");
                ApiError::internal()
            }
        }
    }
}

fn check_permission(identity: &Identity, permission: Permission) -> Result<(), AccessError> {
    if is_granted(&identity.role, permission) {
        Ok(())
    } else {
        Err(AccessError::MissingPermission {
            role: identity.role.clone(),
            permission,
        })
    }
}

async fn check_ownership<P>(
    rule: &OwnershipRule,
    identity: &Identity,
    path_param: P,
) -> Result<(), AccessError>
where
    P: Fn(&str) -> Option<String>,
{
    let resource_id = path_param(rule.param).ok_or(AccessError::MissingParameter(rule.param))?;
    let owner_id = rule.owner.owner_id(identity);

    match (rule.resolver)(resource_id, owner_id).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(AccessError::NotOwner),
        Err(err) => Err(AccessError::Resolver(err)),
    }
}

/// Evaluate `rule` for `identity`; `path_param` looks up matched path parameters by name
pub async fn evaluate<P>(rule: &AccessRule, identity: &Identity, path_param: P) -> Result<(), AccessError>
where
    P: Fn(&str) -> Option<String>,
{
    match rule {
        AccessRule::Permission(permission) => check_permission(identity, *permission),
        AccessRule::Ownership(ownership) => check_ownership(ownership, identity, path_param).await,
        AccessRule::PermissionOrOwnership(permission, ownership) => {
            if check_permission(identity, *permission).is_ok() {
                return Ok(());
            }
            check_ownership(ownership, identity, path_param).await
        }
    }
}

/// Middleware enforcing an [`AccessRule`]; install with `route_layer`
pub async fn enforce(
    State(rule): State<Arc<AccessRule>>,
    params: Result<RawPathParams, RawPathParamsRejection>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = request
        .extensions()
        .get::<Identity>()
        .cloned()
        .ok_or(AccessError::Unauthenticated)?;

    let params: Vec<(String, String)> = params
        .map(|params| {
            params
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect()
        })
        .unwrap_or_default();
    let lookup = |name: &str| {
        params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    };

    evaluate(&rule, &identity, lookup).await?;

    Ok(next.run(request).await)
}
