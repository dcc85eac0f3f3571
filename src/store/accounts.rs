//! Account rows: the credential store the authenticator reads from.

use super::{conflict_on_constraint, StoreError, StoreResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

/// A user identity. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub group_name: String,
    pub active: bool,
}

/// Insert payload. `password_hash` must already be a PHC digest.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub group_name: String,
    pub active: bool,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub password_hash: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub group_name: Option<String>,
}

impl AccountUpdate {
    pub fn is_empty(&self) -> bool {
        self.password_hash.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.role.is_none()
            && self.group_name.is_none()
    }
}

const ACCOUNT_COLUMNS: &str = "username, first_name, last_name, role, group_name, active";

fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        username: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        role: row.get(3)?,
        group_name: row.get(4)?,
        active: row.get(5)?,
    })
}

pub fn create(conn: &Connection, account: &NewAccount) -> StoreResult<()> {
    let username = account.username.trim();
    if username.is_empty() {
        return Err(StoreError::Conflict("Username cannot be empty".into()));
    }

    conn.execute(
        "INSERT INTO accounts (username, password_hash, first_name, last_name, role, group_name, active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            username,
            account.password_hash,
            account.first_name,
            account.last_name,
            account.role,
            account.group_name,
            account.active,
        ],
    )
    .map_err(|e| conflict_on_constraint(e, format!("User '{username}' already exists")))?;
    Ok(())
}

pub fn get(conn: &Connection, username: &str) -> StoreResult<Option<Account>> {
    let account = conn
        .query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = ?1"),
            params![username],
            row_to_account,
        )
        .optional()?;
    Ok(account)
}

/// Account plus its stored digest, for credential checks only.
pub fn get_with_hash(conn: &Connection, username: &str) -> StoreResult<Option<(Account, String)>> {
    let row = conn
        .query_row(
            &format!("SELECT {ACCOUNT_COLUMNS}, password_hash FROM accounts WHERE username = ?1"),
            params![username],
            |row| Ok((row_to_account(row)?, row.get::<_, String>(6)?)),
        )
        .optional()?;
    Ok(row)
}

pub fn exists(conn: &Connection, username: &str) -> StoreResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM accounts WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn list(conn: &Connection) -> StoreResult<Vec<Account>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY username"
    ))?;
    let accounts = stmt
        .query_map([], row_to_account)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(accounts)
}

pub fn update(conn: &Connection, username: &str, changes: &AccountUpdate) -> StoreResult<()> {
    let updated = conn.execute(
        "UPDATE accounts SET
            password_hash = COALESCE(?2, password_hash),
            first_name    = COALESCE(?3, first_name),
            last_name     = COALESCE(?4, last_name),
            role          = COALESCE(?5, role),
            group_name    = COALESCE(?6, group_name)
         WHERE username = ?1",
        params![
            username,
            changes.password_hash,
            changes.first_name,
            changes.last_name,
            changes.role,
            changes.group_name,
        ],
    )?;
    if updated == 0 {
        return Err(StoreError::NotFound(format!("User '{username}'")));
    }
    Ok(())
}

/// Flip the active flag. Returns the new state.
pub fn toggle(conn: &Connection, username: &str) -> StoreResult<bool> {
    let active: Option<bool> = conn
        .query_row(
            "UPDATE accounts SET active = 1 - active WHERE username = ?1 RETURNING active",
            params![username],
            |row| row.get(0),
        )
        .optional()?;
    active.ok_or_else(|| StoreError::NotFound(format!("User '{username}'")))
}

pub fn delete(conn: &Connection, username: &str) -> StoreResult<()> {
    let deleted = conn.execute("DELETE FROM accounts WHERE username = ?1", params![username])?;
    if deleted == 0 {
        return Err(StoreError::NotFound(format!("User '{username}'")));
    }
    Ok(())
}
