//! Database repositories
//!
//! Repositories encapsulate data access for the account, player and
//! refresh token tables. Write operations take an optional transaction
//! connection so the auth service can run several of them atomically.

pub mod account;
pub mod player;
pub mod refresh_token;

pub use account::{AccountRepository, AccountRepositoryError, normalize_email};
pub use player::{PlayerRepository, PlayerRepositoryError};
pub use refresh_token::{RefreshTokenRepository, RefreshTokenRepositoryError};
