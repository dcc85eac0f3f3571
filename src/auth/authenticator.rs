//! Username/password verification against the account store.

use super::password::{self, PasswordService};
use super::AuthError;
use crate::store::{accounts, Account, Database};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Verifies submitted credentials. Pure read; callers record the audit entry.
#[derive(Clone)]
pub struct Authenticator {
    db: Database,
    /// Digest of a random secret, verified on the unknown-user path so both
    /// failure paths pay the same hashing cost.
    decoy_hash: String,
}

impl Authenticator {
    pub fn new(db: Database, passwords: &PasswordService) -> Result<Self, AuthError> {
        let decoy: [u8; 16] = rand::random();
        let decoy_hash = passwords.hash(&URL_SAFE_NO_PAD.encode(decoy))?;
        Ok(Self { db, decoy_hash })
    }

    /// Check `password` for `username`.
    ///
    /// Unknown users and wrong passwords both yield
    /// [`AuthError::InvalidCredentials`]. A disabled account is reported as
    /// [`AuthError::AccountDisabled`] only once the password has verified.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Account, AuthError> {
        let conn = self.db.conn()?;
        let row = accounts::get_with_hash(&conn, username)?;
        drop(conn);

        let Some((account, stored_hash)) = row else {
            let _ = password::verify(password, &self.decoy_hash);
            return Err(AuthError::InvalidCredentials);
        };

        if !password::verify(password, &stored_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        if !account.active {
            return Err(AuthError::AccountDisabled);
        }

        Ok(account)
    }
}
