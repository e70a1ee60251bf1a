//! Core of the gdsi API: configuration, errors, persistence, authentication
//! and the player endpoints built on top of them.

pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod players;
