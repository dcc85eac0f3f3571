//! Axum-based HTTP gateway for the admin front end.
//!
//! - Request body size limit (64KB max)
//! - Request timeout (30s)
//! - Bearer-token verification on every route except `/` and `/login`
//! - CORS restricted to configured origins
//!
//! Store and hashing work is blocking, so handlers hand it to
//! `spawn_blocking`. Every mutation and its audit entry share one
//! transaction.

pub mod admin;
pub mod records;

use crate::auth::{AuthError, Authenticator, PasswordService, TokenSigner};
use crate::config::{Config, GatewayConfig};
use crate::store::{accounts, audit, Database, StoreError};
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Maximum request body size (64KB)
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s)
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub authenticator: Arc<Authenticator>,
    pub signer: Arc<TokenSigner>,
    pub passwords: PasswordService,
    /// Reject non-admin callers on administrative routes.
    pub enforce_admin_role: bool,
}

impl AppState {
    pub fn new(
        db: Database,
        signer: TokenSigner,
        passwords: PasswordService,
        enforce_admin_role: bool,
    ) -> Result<Self, AuthError> {
        let authenticator = Authenticator::new(db.clone(), &passwords)?;
        Ok(Self {
            db,
            authenticator: Arc::new(authenticator),
            signer: Arc::new(signer),
            passwords,
            enforce_admin_role,
        })
    }

    /// Open the store, run the admin bootstrap and build the token signer.
    pub fn from_config(config: &Config) -> Result<Self> {
        let db = config.open_database()?;
        let passwords = PasswordService::new(config.auth.hash_rounds);

        crate::auth::ensure_admin(&db, &passwords, &config.auth.admin_password)
            .context("Admin bootstrap failed")?;

        let signer = match config.auth.signing_key.as_deref() {
            Some(key) => {
                if key.len() < 32 {
                    tracing::warn!("Token signing key is shorter than 32 bytes");
                }
                TokenSigner::new(key.as_bytes(), config.auth.token_ttl_secs)?
            }
            None => {
                tracing::warn!(
                    "No token signing key configured; generated a per-process key. \
                     Issued tokens will not survive a restart"
                );
                TokenSigner::generate(config.auth.token_ttl_secs)?
            }
        };

        Ok(Self::new(
            db,
            signer,
            passwords,
            config.gateway.enforce_admin_role,
        )?)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// ERRORS
// ══════════════════════════════════════════════════════════════════════════════

/// Error returned by every handler; rendered as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("User is disabled")]
    AccountDisabled,
    #[error("Admin role required")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Missing Authorization header")]
    MissingToken,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials
            | Self::MissingToken
            | Self::InvalidToken
            | Self::TokenExpired => StatusCode::UNAUTHORIZED,
            Self::AccountDisabled | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            StoreError::Conflict(message) => Self::Conflict(message),
            other => Self::Internal(other.into()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::AccountDisabled => Self::AccountDisabled,
            AuthError::InvalidToken => Self::InvalidToken,
            AuthError::TokenExpired => Self::TokenExpired,
            AuthError::Store(e) => e.into(),
            other => Self::Internal(other.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(e) => {
                tracing::error!("Request failed: {e:#}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

// ══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ══════════════════════════════════════════════════════════════════════════════

/// Unwrap a JSON body, turning malformed or incomplete payloads into 400s.
pub(crate) fn parse_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(b)| b)
        .map_err(|e| ApiError::Conflict(format!("Invalid request: {}", e.body_text())))
}

/// Run store/hashing work off the async executor.
pub(crate) async fn run_blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Blocking task failed: {e}")))?
}

/// Extract bearer token from Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// The verified identity behind a request.
#[derive(Debug, Clone)]
pub struct Caller {
    pub username: String,
    pub role: String,
}

/// Verify the bearer token and load the caller. The account must still exist
/// and be active. With `admin_only` and role enforcement on, non-admins get 403.
pub(crate) async fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    admin_only: bool,
) -> ApiResult<Caller> {
    let token = extract_bearer_token(headers).ok_or(ApiError::MissingToken)?;
    let username = state.signer.verify(token)?;

    let db = state.db.clone();
    let account = run_blocking(move || {
        let conn = db.conn()?;
        Ok(accounts::get(&conn, &username)?)
    })
    .await?
    .ok_or(ApiError::InvalidToken)?;

    if !account.active {
        return Err(ApiError::AccountDisabled);
    }
    if admin_only && state.enforce_admin_role && account.role != "admin" {
        tracing::warn!(username = %account.username, role = %account.role, "Admin route refused");
        return Err(ApiError::Forbidden);
    }

    Ok(Caller {
        username: account.username,
        role: account.role,
    })
}

#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub status: &'static str,
}

pub(crate) fn status(status: &'static str) -> Json<StatusBody> {
    Json(StatusBody { status })
}

// ══════════════════════════════════════════════════════════════════════════════
// ROUTER
// ══════════════════════════════════════════════════════════════════════════════

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    if origins.iter().any(|o| o.trim() == "*") {
        tracing::warn!("CORS allows any origin; restrict gateway.cors_origins in production");
        return base.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {origin}");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(allowed))
}

/// Build the application router with its middleware stack.
pub fn build_router(state: AppState, gateway: &GatewayConfig) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/login", post(handle_login))
        .route("/logout", post(handle_logout))
        .route("/users", get(admin::handle_users_list))
        .route("/users/create", post(admin::handle_user_create))
        .route("/users/update", post(admin::handle_user_update))
        .route("/users/toggle", post(admin::handle_user_toggle))
        .route("/users/delete", post(admin::handle_user_delete))
        .route("/groups", get(admin::handle_groups_list))
        .route("/groups/active", get(admin::handle_groups_active))
        .route("/groups/create", post(admin::handle_group_create))
        .route("/groups/toggle", post(admin::handle_group_toggle))
        .route("/groups/delete", post(admin::handle_group_delete))
        .route("/feedback", post(records::handle_feedback_submit))
        .route("/reports", get(records::handle_reports))
        .route(
            "/audit",
            get(records::handle_audit_list).post(records::handle_audit_record),
        )
        .with_state(state)
        .layer(cors_layer(&gateway.cors_origins))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP gateway until Ctrl+C.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    let state = AppState::from_config(&config)?;

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid listen address {host}:{port}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let local = listener.local_addr()?;

    tracing::info!(
        addr = %local,
        enforce_admin_role = config.gateway.enforce_admin_role,
        "classdesk gateway listening"
    );

    let app = build_router(state, &config.gateway);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// SESSION HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /: liveness probe, always public.
async fn handle_root() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "Backend running" }))
}

/// Request body for login.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginBody {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub role: String,
    pub group: String,
}

/// POST /login: verify credentials, issue a token, audit the login.
/// Failed attempts are logged but not audited.
pub(crate) async fn handle_login(
    State(state): State<AppState>,
    body: std::result::Result<Json<LoginBody>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let body = parse_body(body)?;
    let username = body.username.clone();

    let result = run_blocking(move || {
        let account = state
            .authenticator
            .authenticate(&body.username, &body.password)?;
        let token = state.signer.issue(&account.username)?;

        let conn = state.db.conn()?;
        audit::record(&conn, Some(&account.username), "Logged in")?;

        Ok(LoginResponse {
            token,
            username: account.username,
            role: account.role,
            group: account.group_name,
        })
    })
    .await;

    match &result {
        Ok(_) => tracing::info!(username = %username, "Login succeeded"),
        Err(ApiError::InvalidCredentials) => {
            tracing::warn!(username = %username, "Login rejected: invalid credentials");
        }
        Err(ApiError::AccountDisabled) => {
            tracing::warn!(username = %username, "Login rejected: account disabled");
        }
        Err(_) => {}
    }

    result.map(Json)
}

/// Request body for logout.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogoutBody {
    pub username: String,
}

/// POST /logout: audit the end of a session. Tokens are stateless and
/// simply expire.
pub(crate) async fn handle_logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: std::result::Result<Json<LogoutBody>, JsonRejection>,
) -> ApiResult<Json<StatusBody>> {
    let caller = authorize(&state, &headers, false).await?;
    let body = parse_body(body)?;
    if body.username != caller.username {
        return Err(ApiError::Conflict(
            "Username does not match the session".into(),
        ));
    }

    run_blocking(move || {
        let conn = state.db.conn()?;
        audit::record(&conn, Some(&caller.username), "Logged out")?;
        Ok(())
    })
    .await?;

    Ok(status("Logged out"))
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::auth::ADMIN_USERNAME;

    fn login_body(username: &str, password: &str) -> std::result::Result<Json<LoginBody>, JsonRejection> {
        Ok(Json(LoginBody {
            username: username.into(),
            password: password.into(),
        }))
    }

    #[test]
    fn security_body_limit_is_64kb() {
        assert_eq!(MAX_BODY_SIZE, 65_536);
    }

    #[test]
    fn login_body_rejects_unknown_fields() {
        let parsed: std::result::Result<LoginBody, _> =
            serde_json::from_str(r#"{"username":"bob","password":"pw","extra":1}"#);
        assert!(parsed.is_err());
        let missing: std::result::Result<LoginBody, _> =
            serde_json::from_str(r#"{"username":"bob"}"#);
        assert!(missing.is_err());
    }

    #[test]
    fn error_status_mapping() {
        assert_eq!(ApiError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::AccountDisabled.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Conflict("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::TokenExpired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(StoreError::NotFound("User 'bob'".into())).to_string(),
            "User 'bob' not found"
        );
    }

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer_token(&headers).is_none());
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_none());
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer_token(&headers), Some("abc.def"));
    }

    #[tokio::test]
    async fn root_reports_running() {
        let response = handle_root().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "Backend running");
    }

    #[tokio::test]
    async fn login_success_issues_token_and_audits() {
        let (_tmp, state) = test_state(false);
        add_user(&state, "bob", "pw1", "student", true);
        let before = audit_actions(&state).len();

        let Json(response) = handle_login(State(state.clone()), login_body("bob", "pw1"))
            .await
            .unwrap();
        assert_eq!(response.username, "bob");
        assert_eq!(response.role, "student");
        assert_eq!(response.group, "Morning");
        assert_eq!(state.signer.verify(&response.token).unwrap(), "bob");

        let actions = audit_actions(&state);
        assert_eq!(actions.len(), before + 1);
        assert_eq!(actions[0], "Logged in");
    }

    #[tokio::test]
    async fn login_wrong_password_is_401_without_audit() {
        let (_tmp, state) = test_state(false);
        add_user(&state, "bob", "pw1", "student", true);
        let before = audit_actions(&state).len();

        let err = handle_login(State(state.clone()), login_body("bob", "wrong"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let unknown = handle_login(State(state.clone()), login_body("ghost", "wrong"))
            .await
            .unwrap_err();
        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.to_string(), unknown.to_string());

        assert_eq!(audit_actions(&state).len(), before);
    }

    #[tokio::test]
    async fn login_disabled_account_is_403() {
        let (_tmp, state) = test_state(false);
        add_user(&state, "bob", "pw1", "student", false);

        let err = handle_login(State(state.clone()), login_body("bob", "pw1"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        let wrong = handle_login(State(state), login_body("bob", "bad"))
            .await
            .unwrap_err();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_requires_token_and_audits() {
        let (_tmp, state) = test_state(false);

        let missing = handle_logout(
            State(state.clone()),
            HeaderMap::new(),
            Ok(Json(LogoutBody {
                username: ADMIN_USERNAME.into(),
            })),
        )
        .await
        .unwrap_err();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let Json(body) = handle_logout(
            State(state.clone()),
            bearer(&state, ADMIN_USERNAME),
            Ok(Json(LogoutBody {
                username: ADMIN_USERNAME.into(),
            })),
        )
        .await
        .unwrap();
        assert_eq!(body.status, "Logged out");
        assert_eq!(audit_actions(&state)[0], "Logged out");
    }

    #[tokio::test]
    async fn logout_for_another_user_is_rejected() {
        let (_tmp, state) = test_state(false);
        add_user(&state, "bob", "pw1", "student", true);

        let err = handle_logout(
            State(state.clone()),
            bearer(&state, "bob"),
            Ok(Json(LogoutBody {
                username: ADMIN_USERNAME.into(),
            })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn authorize_rejects_bad_tokens() {
        let (_tmp, state) = test_state(false);

        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer dummy-token-for-now"),
        );
        let err = authorize(&state, &headers, false).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidToken));

        let expired = state
            .signer
            .issue_at(ADMIN_USERNAME, chrono::Utc::now() - chrono::Duration::hours(2))
            .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {expired}")).unwrap(),
        );
        let err = authorize(&state, &headers, false).await.unwrap_err();
        assert!(matches!(err, ApiError::TokenExpired));
    }

    #[tokio::test]
    async fn authorize_rejects_deleted_and_disabled_accounts() {
        let (_tmp, state) = test_state(false);
        add_user(&state, "bob", "pw1", "student", true);
        let headers = bearer(&state, "bob");

        {
            let conn = state.db.conn().unwrap();
            accounts::toggle(&conn, "bob").unwrap();
        }
        let err = authorize(&state, &headers, false).await.unwrap_err();
        assert!(matches!(err, ApiError::AccountDisabled));

        {
            let conn = state.db.conn().unwrap();
            accounts::delete(&conn, "bob").unwrap();
        }
        let err = authorize(&state, &headers, false).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidToken));
    }

    #[tokio::test]
    async fn admin_role_only_checked_when_enforced() {
        let (_tmp, relaxed) = test_state(false);
        add_user(&relaxed, "bob", "pw1", "student", true);
        let caller = authorize(&relaxed, &bearer(&relaxed, "bob"), true)
            .await
            .unwrap();
        assert_eq!(caller.role, "student");

        let (_tmp2, strict) = test_state(true);
        add_user(&strict, "bob", "pw1", "student", true);
        let err = authorize(&strict, &bearer(&strict, "bob"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));
        assert!(authorize(&strict, &bearer(&strict, ADMIN_USERNAME), true)
            .await
            .is_ok());
    }
}
