//! Append-only audit trail.
//!
//! There is deliberately no update or delete function here, and the schema
//! triggers in [`super::Database`] abort any `UPDATE`/`DELETE` issued
//! against `audit_logs` by other means. Ordering is by the autoincrement id,
//! which follows call order within one database.

use super::{parse_timestamp, StoreResult};
use chrono::{DateTime, Local, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

/// Presentation format for timestamps (fixed-width, local time).
pub const DISPLAY_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// One recorded action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub id: i64,
    /// Actor; `None` for system events such as bootstrap.
    pub username: Option<String>,
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

/// Wire shape of an audit entry; the timestamp is rendered only here.
#[derive(Debug, Clone, Serialize)]
pub struct AuditView {
    pub id: i64,
    pub username: Option<String>,
    pub action: String,
    pub timestamp: String,
}

impl From<&AuditEntry> for AuditView {
    fn from(entry: &AuditEntry) -> Self {
        Self {
            id: entry.id,
            username: entry.username.clone(),
            action: entry.action.clone(),
            timestamp: format_local(&entry.timestamp),
        }
    }
}

/// Render a UTC instant as `DD/MM/YYYY HH:MM:SS` in the server's local zone.
pub fn format_local(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format(DISPLAY_FORMAT).to_string()
}

/// Append one entry stamped with the current time.
pub fn record(conn: &Connection, actor: Option<&str>, action: &str) -> StoreResult<AuditEntry> {
    let timestamp = Utc::now();
    conn.execute(
        "INSERT INTO audit_logs (username, action, timestamp) VALUES (?1, ?2, ?3)",
        params![actor, action, timestamp.to_rfc3339()],
    )?;

    tracing::debug!(actor = actor.unwrap_or("-"), action, "Audit entry recorded");

    Ok(AuditEntry {
        id: conn.last_insert_rowid(),
        username: actor.map(str::to_string),
        action: action.to_string(),
        timestamp,
    })
}

/// Every entry, newest first.
pub fn list_all(conn: &Connection) -> StoreResult<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, action, timestamp FROM audit_logs ORDER BY id DESC",
    )?;
    let entries = stmt
        .query_map([], |row| {
            let raw: String = row.get(3)?;
            Ok(AuditEntry {
                id: row.get(0)?,
                username: row.get(1)?,
                action: row.get(2)?,
                timestamp: parse_timestamp(&raw, 3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

pub fn count(conn: &Connection) -> StoreResult<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM audit_logs", [], |row| row.get(0))?;
    Ok(count as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::test_db;
    use crate::store::{accounts, groups, StoreError};

    #[test]
    fn list_is_newest_first() {
        let (_tmp, db) = test_db();
        let conn = db.conn().unwrap();

        for i in 0..5 {
            record(&conn, Some("admin"), &format!("action {i}")).unwrap();
        }

        let entries = list_all(&conn).unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(count(&conn).unwrap(), 5);
        let actions: Vec<_> = entries.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(
            actions,
            ["action 4", "action 3", "action 2", "action 1", "action 0"]
        );
        assert!(entries.windows(2).all(|w| w[0].id > w[1].id));
    }

    #[test]
    fn actor_may_be_absent() {
        let (_tmp, db) = test_db();
        let conn = db.conn().unwrap();

        let entry = record(&conn, None, "System started").unwrap();
        assert!(entry.username.is_none());
        assert_eq!(list_all(&conn).unwrap()[0].username, None);
    }

    #[test]
    fn update_and_delete_are_rejected() {
        let (_tmp, db) = test_db();
        let conn = db.conn().unwrap();

        record(&conn, Some("admin"), "Logged in").unwrap();

        let update = conn.execute("UPDATE audit_logs SET action = 'tampered'", []);
        assert!(update.is_err());
        let delete = conn.execute("DELETE FROM audit_logs", []);
        assert!(delete.is_err());

        let entries = list_all(&conn).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "Logged in");
    }

    #[test]
    fn other_mutations_leave_trail_untouched() {
        let (_tmp, db) = test_db();
        let conn = db.conn().unwrap();

        record(&conn, Some("admin"), "first").unwrap();
        record(&conn, Some("admin"), "second").unwrap();
        let before = list_all(&conn).unwrap();

        groups::create(&conn, "G").unwrap();
        groups::toggle(&conn, "G").unwrap();
        groups::delete(&conn, "G").unwrap();
        assert!(matches!(
            accounts::delete(&conn, "nobody"),
            Err(StoreError::NotFound(_))
        ));

        assert_eq!(list_all(&conn).unwrap(), before);
    }

    #[test]
    fn view_uses_fixed_width_format() {
        let entry = AuditEntry {
            id: 1,
            username: Some("admin".into()),
            action: "Logged in".into(),
            timestamp: Utc::now(),
        };
        let view = AuditView::from(&entry);
        assert_eq!(view.timestamp.len(), "16/10/2026 09:05:01".len());
        assert_eq!(&view.timestamp[2..3], "/");
        assert_eq!(&view.timestamp[10..11], " ");
    }
}
