//! Player profiles
//!
//! Read and update player profiles and delete accounts. Every route sits
//! behind the access gate.

pub mod api;

pub use api::{PlayerApiState, player_api_router};
