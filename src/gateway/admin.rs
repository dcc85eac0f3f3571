//! User and group administration routes.
//!
//! Every mutation commits together with its audit entry; the actor is the
//! verified caller.

use super::{
    authorize, parse_body, run_blocking, status, ApiError, ApiResult, AppState, StatusBody,
};
use crate::store::{accounts, audit, groups, Account, AccountUpdate, Group, NewAccount};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    response::Json,
};
use serde::{Deserialize, Serialize};

type Body<T> = std::result::Result<Json<T>, JsonRejection>;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateUserBody {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub group: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserBody {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UsernameBody {
    pub username: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupNameBody {
    pub group_name: String,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub status: &'static str,
    pub active: bool,
}

// ── Users ────────────────────────────────────────────────────────

/// GET /users
pub(crate) async fn handle_users_list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Account>>> {
    authorize(&state, &headers, true).await?;
    let users = run_blocking(move || {
        let conn = state.db.conn()?;
        Ok(accounts::list(&conn)?)
    })
    .await?;
    Ok(Json(users))
}

/// POST /users/create
pub(crate) async fn handle_user_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body<CreateUserBody>,
) -> ApiResult<Json<StatusBody>> {
    let caller = authorize(&state, &headers, true).await?;
    let body = parse_body(body)?;

    let created = run_blocking(move || {
        let account = NewAccount {
            username: body.username.trim().to_string(),
            password_hash: state.passwords.hash(&body.password)?,
            first_name: body.first_name,
            last_name: body.last_name,
            role: body.role,
            group_name: body.group,
            active: true,
        };
        state.db.transaction(|tx| -> ApiResult<String> {
            accounts::create(tx, &account)?;
            audit::record(
                tx,
                Some(&caller.username),
                &format!("Created user {}", account.username),
            )?;
            Ok(account.username.clone())
        })
    })
    .await?;

    tracing::info!(username = %created, "User created");
    Ok(status("User created"))
}

/// POST /users/update: only the supplied fields change.
pub(crate) async fn handle_user_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body<UpdateUserBody>,
) -> ApiResult<Json<StatusBody>> {
    let caller = authorize(&state, &headers, true).await?;
    let body = parse_body(body)?;

    run_blocking(move || {
        let changes = AccountUpdate {
            password_hash: body
                .password
                .as_deref()
                .map(|p| state.passwords.hash(p))
                .transpose()?,
            first_name: body.first_name,
            last_name: body.last_name,
            role: body.role,
            group_name: body.group,
        };
        if changes.is_empty() {
            return Err(ApiError::Conflict("Nothing to update".into()));
        }
        state.db.transaction(|tx| -> ApiResult<()> {
            accounts::update(tx, &body.username, &changes)?;
            audit::record(
                tx,
                Some(&caller.username),
                &format!("Updated user {}", body.username),
            )?;
            Ok(())
        })
    })
    .await?;

    Ok(status("User updated"))
}

/// POST /users/toggle: flips `active`, returns the new state.
pub(crate) async fn handle_user_toggle(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body<UsernameBody>,
) -> ApiResult<Json<ToggleResponse>> {
    let caller = authorize(&state, &headers, true).await?;
    let body = parse_body(body)?;
    if body.username == caller.username {
        return Err(ApiError::Conflict("Cannot disable your own account".into()));
    }

    let active = run_blocking(move || {
        state.db.transaction(|tx| -> ApiResult<bool> {
            let active = accounts::toggle(tx, &body.username)?;
            audit::record(
                tx,
                Some(&caller.username),
                &format!("Toggled user {}", body.username),
            )?;
            Ok(active)
        })
    })
    .await?;

    Ok(Json(ToggleResponse {
        status: "User toggled",
        active,
    }))
}

/// POST /users/delete
pub(crate) async fn handle_user_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body<UsernameBody>,
) -> ApiResult<Json<StatusBody>> {
    let caller = authorize(&state, &headers, true).await?;
    let body = parse_body(body)?;
    if body.username == caller.username {
        return Err(ApiError::Conflict("Cannot delete your own account".into()));
    }

    run_blocking(move || {
        state.db.transaction(|tx| -> ApiResult<()> {
            accounts::delete(tx, &body.username)?;
            audit::record(
                tx,
                Some(&caller.username),
                &format!("Deleted user {}", body.username),
            )?;
            Ok(())
        })
    })
    .await?;

    Ok(status("User deleted"))
}

// ── Groups ───────────────────────────────────────────────────────

/// GET /groups
pub(crate) async fn handle_groups_list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Group>>> {
    authorize(&state, &headers, false).await?;
    let all = run_blocking(move || {
        let conn = state.db.conn()?;
        Ok(groups::list(&conn)?)
    })
    .await?;
    Ok(Json(all))
}

/// GET /groups/active
pub(crate) async fn handle_groups_active(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Group>>> {
    authorize(&state, &headers, false).await?;
    let active = run_blocking(move || {
        let conn = state.db.conn()?;
        Ok(groups::list_active(&conn)?)
    })
    .await?;
    Ok(Json(active))
}

/// POST /groups/create
pub(crate) async fn handle_group_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body<GroupNameBody>,
) -> ApiResult<Json<StatusBody>> {
    let caller = authorize(&state, &headers, true).await?;
    let body = parse_body(body)?;

    run_blocking(move || {
        state.db.transaction(|tx| -> ApiResult<()> {
            let group = groups::create(tx, &body.group_name)?;
            audit::record(
                tx,
                Some(&caller.username),
                &format!("Created group {}", group.group_name),
            )?;
            Ok(())
        })
    })
    .await?;

    Ok(status("Group created"))
}

/// POST /groups/toggle
pub(crate) async fn handle_group_toggle(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body<GroupNameBody>,
) -> ApiResult<Json<ToggleResponse>> {
    let caller = authorize(&state, &headers, true).await?;
    let body = parse_body(body)?;

    let active = run_blocking(move || {
        state.db.transaction(|tx| -> ApiResult<bool> {
            let active = groups::toggle(tx, &body.group_name)?;
            audit::record(
                tx,
                Some(&caller.username),
                &format!("Toggled group {}", body.group_name),
            )?;
            Ok(active)
        })
    })
    .await?;

    Ok(Json(ToggleResponse {
        status: "Group toggled",
        active,
    }))
}

/// POST /groups/delete: accounts referencing the group keep the name.
pub(crate) async fn handle_group_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body<GroupNameBody>,
) -> ApiResult<Json<StatusBody>> {
    let caller = authorize(&state, &headers, true).await?;
    let body = parse_body(body)?;

    run_blocking(move || {
        state.db.transaction(|tx| -> ApiResult<()> {
            groups::delete(tx, &body.group_name)?;
            audit::record(
                tx,
                Some(&caller.username),
                &format!("Deleted group {}", body.group_name),
            )?;
            Ok(())
        })
    })
    .await?;

    Ok(status("Group deleted"))
}
