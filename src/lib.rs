//! gdsi - tennis league API
//!
//! Accounts, player profiles and the authentication core that issues and
//! rotates tokens and gates privileged routes.

pub mod app;
pub mod core;
