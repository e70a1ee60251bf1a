//! Authentication and authorization
//!
//! - Password hashing and verification
//! - JWT access/refresh token minting and validation
//! - Signup, login and refresh-token rotation
//! - Bearer token middleware and the permission/ownership access gate

pub mod access;
pub mod api;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod permissions;
pub mod service;

pub use access::{AccessError, AccessRule, OwnerKind, OwnershipRule, enforce};
pub use api::{AuthApiState, auth_api_router};
pub use jwt::{Claims, JwtConfig, JwtError, JwtService, TokenPair};
pub use middleware::{Identity, require_auth};
pub use password::{PasswordError, PasswordHasher, Verification};
pub use permissions::{Permission, Role};
pub use service::{
    AuthError, AuthResponse, AuthService, LoginRequest, PasswordResetRequest, RefreshRequest,
    SignupRequest,
};
