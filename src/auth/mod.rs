//! Credential handling, bearer tokens and the startup admin bootstrap.
//!
//! Provides:
//! - Password hashing with PBKDF2-HMAC-SHA256 in PHC string format (random salt per hash)
//! - Authentication against the account store, with identical failures for
//!   unknown users and wrong passwords
//! - HMAC-SHA256 signed bearer tokens with an absolute expiry
//! - Idempotent creation of the default `admin` account
//!
//! ## Design Decisions
//! - No external JWT dependency: tokens are `claims.signature`, both base64url,
//!   signed with the existing `hmac` + `sha2` crates.
//! - The signing key is injected from configuration (or generated per process);
//!   it never lives in source.
//! - The disabled-account check runs only after the password verifies, so a
//!   wrong password never reveals whether an account is disabled.

pub mod authenticator;
pub mod bootstrap;
pub mod password;
pub mod token;

pub use authenticator::Authenticator;
pub use bootstrap::{ensure_admin, ADMIN_USERNAME, DEFAULT_ADMIN_PASSWORD};
pub use password::PasswordService;
pub use token::{ParsedToken, TokenSigner, DEFAULT_TOKEN_TTL_SECS};

use crate::store::StoreError;

/// Failures surfaced by authentication and token handling.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("User is disabled")]
    AccountDisabled,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("token expiry out of range")]
    ExpiryOutOfRange,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("token encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}
