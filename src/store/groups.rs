//! Group rows. Accounts reference groups by name only; deleting a group
//! leaves those references dangling.

use super::{conflict_on_constraint, StoreError, StoreResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub group_name: String,
    pub active: bool,
}

fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        group_name: row.get(0)?,
        active: row.get(1)?,
    })
}

/// Create an active group. The name is trimmed; blank names and duplicates conflict.
pub fn create(conn: &Connection, group_name: &str) -> StoreResult<Group> {
    let name = group_name.trim();
    if name.is_empty() {
        return Err(StoreError::Conflict("Group name cannot be empty".into()));
    }

    conn.execute(
        "INSERT INTO user_groups (group_name, active) VALUES (?1, 1)",
        params![name],
    )
    .map_err(|e| conflict_on_constraint(e, format!("Group '{name}' already exists")))?;

    Ok(Group {
        group_name: name.to_string(),
        active: true,
    })
}

pub fn list(conn: &Connection) -> StoreResult<Vec<Group>> {
    let mut stmt = conn.prepare("SELECT group_name, active FROM user_groups ORDER BY group_name")?;
    let groups = stmt
        .query_map([], row_to_group)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(groups)
}

pub fn list_active(conn: &Connection) -> StoreResult<Vec<Group>> {
    let mut stmt = conn.prepare(
        "SELECT group_name, active FROM user_groups WHERE active = 1 ORDER BY group_name",
    )?;
    let groups = stmt
        .query_map([], row_to_group)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(groups)
}

/// Flip the active flag. Returns the new state.
pub fn toggle(conn: &Connection, group_name: &str) -> StoreResult<bool> {
    let active: Option<bool> = conn
        .query_row(
            "UPDATE user_groups SET active = 1 - active WHERE group_name = ?1 RETURNING active",
            params![group_name],
            |row| row.get(0),
        )
        .optional()?;
    active.ok_or_else(|| StoreError::NotFound(format!("Group '{group_name}'")))
}

pub fn delete(conn: &Connection, group_name: &str) -> StoreResult<()> {
    let deleted = conn.execute(
        "DELETE FROM user_groups WHERE group_name = ?1",
        params![group_name],
    )?;
    if deleted == 0 {
        return Err(StoreError::NotFound(format!("Group '{group_name}'")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::test_db;
    use crate::store::{accounts, NewAccount};

    #[test]
    fn blank_name_conflicts() {
        let (_tmp, db) = test_db();
        let conn = db.conn().unwrap();

        for name in ["", "   ", "\t\n"] {
            let err = create(&conn, name).unwrap_err();
            assert!(matches!(err, StoreError::Conflict(_)), "name {name:?}");
        }
    }

    #[test]
    fn duplicate_name_conflicts() {
        let (_tmp, db) = test_db();
        let conn = db.conn().unwrap();

        create(&conn, "Evening").unwrap();
        assert!(matches!(
            create(&conn, "Evening"),
            Err(StoreError::Conflict(_))
        ));
        // trimmed before the uniqueness check
        assert!(matches!(
            create(&conn, "  Evening "),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn list_active_hides_toggled_groups() {
        let (_tmp, db) = test_db();
        let conn = db.conn().unwrap();

        create(&conn, "A").unwrap();
        create(&conn, "B").unwrap();
        assert!(!toggle(&conn, "B").unwrap());

        assert_eq!(list(&conn).unwrap().len(), 2);
        let active = list_active(&conn).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].group_name, "A");
    }

    #[test]
    fn delete_does_not_cascade_to_accounts() {
        let (_tmp, db) = test_db();
        let conn = db.conn().unwrap();

        create(&conn, "Morning").unwrap();
        accounts::create(
            &conn,
            &NewAccount {
                username: "bob".into(),
                password_hash: "x".into(),
                first_name: String::new(),
                last_name: String::new(),
                role: "student".into(),
                group_name: "Morning".into(),
                active: true,
            },
        )
        .unwrap();

        delete(&conn, "Morning").unwrap();
        let bob = accounts::get(&conn, "bob").unwrap().unwrap();
        assert_eq!(bob.group_name, "Morning");
        assert!(matches!(
            delete(&conn, "Morning"),
            Err(StoreError::NotFound(_))
        ));
    }
}
