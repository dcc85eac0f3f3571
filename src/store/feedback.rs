//! Feedback submissions and the report view built from them.

use super::audit::format_local;
use super::{parse_timestamp, StoreResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

/// Insert payload for a feedback submission.
#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub username: String,
    pub group_name: String,
    pub subject: String,
    pub level: String,
    pub problems: String,
    pub notes: String,
}

/// A stored submission. Append-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackRecord {
    pub id: i64,
    pub username: String,
    pub group_name: String,
    pub subject: String,
    pub level: String,
    pub problems: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// One report line: feedback joined with the submitter's name, timestamp
/// split into its date and time parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub date: String,
    pub time: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub group_name: String,
    pub subject: String,
    pub level: String,
    pub problems: String,
    pub notes: String,
}

pub fn submit(conn: &Connection, feedback: &NewFeedback) -> StoreResult<FeedbackRecord> {
    let created_at = Utc::now();
    conn.execute(
        "INSERT INTO feedback (username, group_name, subject, level, problems, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            feedback.username,
            feedback.group_name,
            feedback.subject,
            feedback.level,
            feedback.problems,
            feedback.notes,
            created_at.to_rfc3339(),
        ],
    )?;

    Ok(FeedbackRecord {
        id: conn.last_insert_rowid(),
        username: feedback.username.clone(),
        group_name: feedback.group_name.clone(),
        subject: feedback.subject.clone(),
        level: feedback.level.clone(),
        problems: feedback.problems.clone(),
        notes: feedback.notes.clone(),
        created_at,
    })
}

/// All submissions newest first. Submitters that no longer exist keep their
/// rows with empty names.
pub fn report(conn: &Connection) -> StoreResult<Vec<ReportRow>> {
    let mut stmt = conn.prepare(
        "SELECT f.created_at, f.username,
                COALESCE(a.first_name, ''), COALESCE(a.last_name, ''),
                f.group_name, f.subject, f.level, f.problems, f.notes
         FROM feedback f
         LEFT JOIN accounts a ON a.username = f.username
         ORDER BY f.id DESC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let raw: String = row.get(0)?;
            let rendered = format_local(&parse_timestamp(&raw, 0)?);
            let (date, time) = split_timestamp(&rendered);
            Ok(ReportRow {
                date,
                time,
                username: row.get(1)?,
                first_name: row.get(2)?,
                last_name: row.get(3)?,
                group_name: row.get(4)?,
                subject: row.get(5)?,
                level: row.get(6)?,
                problems: row.get(7)?,
                notes: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Split a rendered timestamp at its first space.
fn split_timestamp(rendered: &str) -> (String, String) {
    match rendered.split_once(' ') {
        Some((date, time)) => (date.to_string(), time.to_string()),
        None => (rendered.to_string(), String::new()),
    }
}
