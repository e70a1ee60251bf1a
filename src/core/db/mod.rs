//! Database module
//!
//! Connectivity, models and repositories for persistent storage using
//! PostgreSQL and SQLx.

pub mod models;
pub mod pool;
pub mod repositories;

// Re-export commonly used items
pub use models::*;
pub use pool::{DbConfig, DbError, connect, connect_and_migrate};
pub use repositories::{
    AccountRepository, AccountRepositoryError, PlayerRepository, PlayerRepositoryError,
    RefreshTokenRepository, RefreshTokenRepositoryError,
};

pub use sqlx::PgPool;
