//! Feedback intake, the report view, and the audit trail.

use super::{authorize, parse_body, run_blocking, status, ApiError, ApiResult, AppState, StatusBody};
use crate::store::{audit, feedback, AuditView, NewFeedback, ReportRow};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    response::Json,
};
use serde::Deserialize;

type Body<T> = std::result::Result<Json<T>, JsonRejection>;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedbackBody {
    pub username: String,
    pub group: String,
    pub subject: String,
    pub level: String,
    pub problems: String,
    pub notes: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditBody {
    pub action: String,
}

/// POST /feedback
pub(crate) async fn handle_feedback_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body<FeedbackBody>,
) -> ApiResult<Json<StatusBody>> {
    let caller = authorize(&state, &headers, false).await?;
    let body = parse_body(body)?;

    let submission = NewFeedback {
        username: body.username,
        group_name: body.group,
        subject: body.subject,
        level: body.level,
        problems: body.problems,
        notes: body.notes,
    };

    let id = run_blocking(move || {
        state.db.transaction(|tx| -> ApiResult<i64> {
            let record = feedback::submit(tx, &submission)?;
            audit::record(
                tx,
                Some(&caller.username),
                &format!("Submitted feedback for {}", record.subject),
            )?;
            Ok(record.id)
        })
    })
    .await?;

    tracing::debug!(feedback_id = id, "Feedback stored");
    Ok(status("Feedback submitted"))
}

/// GET /reports
pub(crate) async fn handle_reports(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<ReportRow>>> {
    authorize(&state, &headers, true).await?;
    let rows = run_blocking(move || {
        let conn = state.db.conn()?;
        Ok(feedback::report(&conn)?)
    })
    .await?;
    Ok(Json(rows))
}

/// GET /audit: newest first, timestamps rendered in local time.
pub(crate) async fn handle_audit_list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<AuditView>>> {
    authorize(&state, &headers, true).await?;
    let entries = run_blocking(move || {
        let conn = state.db.conn()?;
        Ok(audit::list_all(&conn)?)
    })
    .await?;
    Ok(Json(entries.iter().map(AuditView::from).collect()))
}

/// POST /audit: record a client-side action for the caller.
pub(crate) async fn handle_audit_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body<AuditBody>,
) -> ApiResult<Json<StatusBody>> {
    let caller = authorize(&state, &headers, false).await?;
    let body = parse_body(body)?;
    let action = body.action.trim().to_string();
    if action.is_empty() {
        return Err(ApiError::Conflict("Action cannot be empty".into()));
    }

    run_blocking(move || {
        let conn = state.db.conn()?;
        audit::record(&conn, Some(&caller.username), &action)?;
        Ok(())
    })
    .await?;

    Ok(status("Recorded"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ADMIN_USERNAME;
    use crate::gateway::test_support::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    fn feedback_body(username: &str, subject: &str) -> Body<FeedbackBody> {
        Ok(Json(FeedbackBody {
            username: username.into(),
            group: "Morning".into(),
            subject: subject.into(),
            level: "B1".into(),
            problems: "none".into(),
            notes: "good class".into(),
        }))
    }

    #[tokio::test]
    async fn feedback_shows_up_in_reports_newest_first() {
        let (_tmp, state) = test_state(false);
        add_user(&state, "bob", "pw1", "student", true);
        let bob = bearer(&state, "bob");

        handle_feedback_submit(State(state.clone()), bob.clone(), feedback_body("bob", "Maths"))
            .await
            .unwrap();
        handle_feedback_submit(State(state.clone()), bob, feedback_body("bob", "Physics"))
            .await
            .unwrap();

        let Json(rows) = handle_reports(State(state.clone()), bearer(&state, ADMIN_USERNAME))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].subject, "Physics");
        assert_eq!(rows[0].first_name, "First");
        assert_eq!(rows[0].date.len(), 10);
        assert_eq!(rows[0].time.len(), 8);

        let actions = audit_actions(&state);
        assert_eq!(actions[0], "Submitted feedback for Physics");
    }

    #[tokio::test]
    async fn feedback_from_unknown_user_has_blank_names() {
        let (_tmp, state) = test_state(false);
        handle_feedback_submit(
            State(state.clone()),
            bearer(&state, ADMIN_USERNAME),
            feedback_body("walk-in", "Art"),
        )
        .await
        .unwrap();

        let Json(rows) = handle_reports(State(state.clone()), bearer(&state, ADMIN_USERNAME))
            .await
            .unwrap();
        assert_eq!(rows[0].username, "walk-in");
        assert_eq!(rows[0].first_name, "");
    }

    #[tokio::test]
    async fn audit_list_serializes_fixed_width_timestamps() {
        let (_tmp, state) = test_state(false);
        let admin = bearer(&state, ADMIN_USERNAME);
        handle_audit_record(
            State(state.clone()),
            admin.clone(),
            Ok(Json(AuditBody {
                action: "Opened reports page".into(),
            })),
        )
        .await
        .unwrap();

        let response = handle_audit_list(State(state.clone()), admin)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let entries = json.as_array().unwrap();
        assert_eq!(entries[0]["action"], "Opened reports page");
        assert_eq!(entries[0]["username"], ADMIN_USERNAME);
        assert_eq!(entries[0]["timestamp"].as_str().unwrap().len(), 19);
        // bootstrap entry is the oldest and has no actor
        assert!(entries.last().unwrap()["username"].is_null());
        assert!(entries[0]["id"].as_i64() > entries[1]["id"].as_i64());
    }

    #[tokio::test]
    async fn blank_audit_action_is_400() {
        let (_tmp, state) = test_state(false);
        let err = handle_audit_record(
            State(state.clone()),
            bearer(&state, ADMIN_USERNAME),
            Ok(Json(AuditBody {
                action: "  ".into(),
            })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reports_and_audit_gated_when_roles_enforced() {
        let (_tmp, state) = test_state(true);
        add_user(&state, "bob", "pw1", "student", true);
        let bob = bearer(&state, "bob");

        let err = handle_reports(State(state.clone()), bob.clone()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        let err = handle_audit_list(State(state.clone()), bob.clone())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        // students can still submit feedback
        handle_feedback_submit(State(state.clone()), bob, feedback_body("bob", "Maths"))
            .await
            .unwrap();
    }
}
