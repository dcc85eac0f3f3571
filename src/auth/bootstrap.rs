//! Startup step that guarantees an administrator identity exists.

use super::password::PasswordService;
use super::AuthError;
use crate::store::{accounts, audit, Database, NewAccount, StoreError};

/// Username of the bootstrap administrator.
pub const ADMIN_USERNAME: &str = "admin";

/// Password used when none is configured. Startup warns when it is in effect.
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";

/// Create the `admin` account if it is missing. Returns `true` when an
/// account was created. Safe to run on every start.
pub fn ensure_admin(
    db: &Database,
    passwords: &PasswordService,
    admin_password: &str,
) -> Result<bool, AuthError> {
    {
        let conn = db.conn()?;
        if accounts::exists(&conn, ADMIN_USERNAME)? {
            tracing::debug!("Admin account present, bootstrap skipped");
            return Ok(false);
        }
    }

    let password_hash = passwords.hash(admin_password)?;
    let account = NewAccount {
        username: ADMIN_USERNAME.to_string(),
        password_hash,
        first_name: "System".to_string(),
        last_name: "Administrator".to_string(),
        role: "admin".to_string(),
        group_name: String::new(),
        active: true,
    };

    let created = db.transaction(|tx| -> Result<bool, AuthError> {
        match accounts::create(tx, &account) {
            Ok(()) => {
                audit::record(tx, None, "Created default admin account")?;
                Ok(true)
            }
            // another process won the race between the check and the insert
            Err(StoreError::Conflict(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    })?;

    if created {
        if admin_password == DEFAULT_ADMIN_PASSWORD {
            tracing::warn!(
                "Default admin account created with the built-in password; \
                 set auth.admin_password or CLASSDESK_ADMIN_PASSWORD and change it"
            );
        } else {
            tracing::info!("Default admin account created");
        }
    }
    Ok(created)
}
