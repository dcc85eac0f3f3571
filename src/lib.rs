//! classdesk: authentication and administration backend for a small
//! classroom-management front end.
//!
//! - [`auth`]: password hashing, credential checks, signed bearer tokens,
//!   admin bootstrap
//! - [`store`]: SQLite persistence for accounts, groups, feedback and the
//!   append-only audit trail
//! - [`gateway`]: the axum HTTP surface
//! - [`config`]: `config.toml` loading with environment overrides

pub mod auth;
pub mod config;
pub mod gateway;
pub mod store;
