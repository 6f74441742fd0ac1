use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{instrument, warn};

use crate::{
    auth::{claims::Claims, jwt::AuthUser},
    error::ApiError,
    state::AppState,
    users::{
        dto::{CreateUserRequest, CredentialsRequest, LoginResponse, MeResponse},
        model::{User, UserSummary, UserUpdate},
    },
};

const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Emails are stored trimmed and lowercased; every entry point goes through here.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_email(email: &mut String) -> Result<(), ApiError> {
    *email = normalize_email(email);
    if !is_valid_email(email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::BadRequest("Invalid email".into()));
    }
    Ok(())
}

fn check_credentials(email: &mut String, password: &str) -> Result<(), ApiError> {
    check_email(email)?;
    if password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(ApiError::BadRequest("Password too short".into()));
    }
    Ok(())
}

fn require_admin(claims: &Claims) -> Result<(), ApiError> {
    if !claims.is_admin {
        warn!(user_id = claims.user_id, "admin required");
        return Err(ApiError::Forbidden("Admin required".into()));
    }
    Ok(())
}

/// Admins may read any account, everyone else only their own.
fn require_self_or_admin(claims: &Claims, user: &User) -> Result<(), ApiError> {
    if claims.user_id == user.id {
        return Ok(());
    }
    require_admin(claims)
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/me", get(get_me))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/email/:email", get(get_user_by_email))
        .route("/users/phone/:phone", get(get_user_by_phone))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<CredentialsRequest>,
) -> Result<StatusCode, ApiError> {
    check_credentials(&mut payload.email, &payload.password)?;
    state.users.register(&payload.email, &payload.password).await?;
    Ok(StatusCode::CREATED)
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<CredentialsRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    check_email(&mut payload.email)?;
    let token = state
        .users
        .email_login(&payload.email, &payload.password)
        .await
        .map_err(|e| {
            // unknown email and bad password look the same to the caller
            if e.is_not_found() {
                ApiError::Unauthorized("Invalid credentials".into())
            } else {
                ApiError::from(e)
            }
        })?;
    Ok(Json(LoginResponse { token }))
}

#[instrument(skip_all)]
pub async fn get_me(AuthUser(claims): AuthUser) -> Json<MeResponse> {
    Json(MeResponse {
        id: claims.user_id,
        uuid: claims.uuid,
        username: claims.username,
        email: claims.email,
        is_admin: claims.is_admin,
    })
}

#[instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    require_admin(&claims)?;
    Ok(Json(state.users.get_user_list().await?))
}

#[instrument(skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(mut payload): Json<CreateUserRequest>,
) -> Result<StatusCode, ApiError> {
    require_admin(&claims)?;
    check_credentials(&mut payload.email, &payload.password)?;
    state
        .users
        .create(&payload.email, &payload.password, &payload.name, payload.status)
        .await?;
    Ok(StatusCode::CREATED)
}

#[instrument(skip(state, claims))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    if claims.user_id != id {
        require_admin(&claims)?;
    }
    Ok(Json(state.users.get_user_by_id(id).await?))
}

#[instrument(skip(state, claims))]
pub async fn get_user_by_email(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(email): Path<String>,
) -> Result<Json<User>, ApiError> {
    let email = normalize_email(&email);
    if claims.email != email {
        require_admin(&claims)?;
    }
    Ok(Json(state.users.get_user_by_email(&email).await?))
}

#[instrument(skip(state, claims))]
pub async fn get_user_by_phone(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(phone): Path<i64>,
) -> Result<Json<User>, ApiError> {
    let user = state.users.get_user_by_phone(phone).await?;
    require_self_or_admin(&claims, &user)?;
    Ok(Json(user))
}

#[instrument(skip(state, claims, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<i64>,
    Json(mut payload): Json<UserUpdate>,
) -> Result<StatusCode, ApiError> {
    require_admin(&claims)?;
    if let Some(email) = payload.email.as_mut() {
        check_email(email)?;
    }
    state.users.update_user(id, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, claims))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    require_admin(&claims)?;
    state.users.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::build_app;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let req = match body {
            Some(v) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(v.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request should build");

        let resp = app.clone().oneshot(req).await.expect("request should be handled");
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("body should read");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
        };
        (status, json)
    }

    fn test_app() -> (AppState, Router) {
        let state = AppState::fake();
        let app = build_app(state.clone());
        (state, app)
    }

    async fn admin_token(state: &AppState) -> String {
        state
            .users
            .ensure_admin("root@example.com", "rootpass")
            .await
            .expect("seed admin");
        state
            .users
            .email_login("root@example.com", "rootpass")
            .await
            .expect("admin login")
    }

    async fn user_token(state: &AppState, email: &str) -> (i64, String) {
        state.users.register(email, "secret1").await.expect("register");
        let id = state.users.get_user_by_email(email).await.expect("lookup").id;
        let token = state.users.email_login(email, "secret1").await.expect("login");
        (id, token)
    }

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@b.com"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.com"));
        assert!(!is_valid_email(""));
        assert_eq!(normalize_email("  Bob@Example.COM "), "bob@example.com");
    }

    #[tokio::test]
    async fn register_login_and_me() {
        let (_, app) = test_app();

        let creds = json!({ "email": " New@Example.com ", "password": "secret1" });
        let (status, _) = call(&app, "POST", "/api/v1/auth/register", None, Some(creds)).await;
        assert_eq!(status, StatusCode::CREATED);

        let creds = json!({ "email": "New@Example.com", "password": "secret1" });
        let (status, body) = call(&app, "POST", "/api/v1/auth/login", None, Some(creds)).await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().expect("token").to_string();

        let (status, me) = call(&app, "GET", "/api/v1/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["email"], "new@example.com");
        assert_eq!(me["is_admin"], false);
    }

    #[tokio::test]
    async fn login_failures() {
        let (state, app) = test_app();
        let admin = admin_token(&state).await;
        let body = json!({ "email": "off@example.com", "password": "secret1", "status": 0 });
        let (status, _) = call(&app, "POST", "/api/v1/users", Some(&admin), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);

        let wrong = json!({ "email": "off@example.com", "password": "nope" });
        let (status, _) = call(&app, "POST", "/api/v1/auth/login", None, Some(wrong)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let right = json!({ "email": "off@example.com", "password": "secret1" });
        let (status, _) = call(&app, "POST", "/api/v1/auth/login", None, Some(right)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let unknown = json!({ "email": "ghost@example.com", "password": "secret1" });
        let (status, _) = call(&app, "POST", "/api/v1/auth/login", None, Some(unknown)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn me_requires_valid_token() {
        let (_, app) = test_app();
        let (status, _) = call(&app, "GET", "/api/v1/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, body) = call(&app, "GET", "/api/v1/me", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn user_routes_reject_anonymous_callers() {
        let (state, app) = test_app();
        let (id, _) = user_token(&state, "eve@example.com").await;
        let uri = format!("/api/v1/users/{id}");

        let (status, _) =
            call(&app, "PUT", &uri, None, Some(json!({ "is_admin": true }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&app, "DELETE", &uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&app, "GET", "/api/v1/users", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&app, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let body = json!({ "email": "x@example.com", "password": "secret1" });
        let (status, _) = call(&app, "POST", "/api/v1/users", None, Some(body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let user = state.users.get_user_by_id(id).await.expect("still there");
        assert!(!user.is_admin);
    }

    #[tokio::test]
    async fn user_routes_reject_non_admins() {
        let (state, app) = test_app();
        let (eve, eve_token) = user_token(&state, "eve@example.com").await;
        let (bob, _) = user_token(&state, "bob@example.com").await;
        let eve_uri = format!("/api/v1/users/{eve}");
        let bob_uri = format!("/api/v1/users/{bob}");
        let token = Some(eve_token.as_str());

        let patch = json!({ "is_admin": true });
        let (status, _) = call(&app, "PUT", &eve_uri, token, Some(patch)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = call(&app, "DELETE", &bob_uri, token, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = call(&app, "GET", "/api/v1/users", token, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = call(&app, "GET", &bob_uri, token, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = call(&app, "GET", "/api/v1/users/email/bob@example.com", token, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = call(&app, "GET", "/api/v1/users/email/nobody@example.com", token, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // own record is readable
        let (status, me) = call(&app, "GET", &eve_uri, token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["email"], "eve@example.com");

        assert!(!state.users.get_user_by_id(eve).await.expect("eve").is_admin);
        assert!(state.users.get_user_by_id(bob).await.is_ok());
    }

    #[tokio::test]
    async fn email_lookup_accepts_submitted_casing() {
        let (_, app) = test_app();
        let creds = json!({ "email": "Bob@Example.com", "password": "secret1" });
        let (status, _) = call(&app, "POST", "/api/v1/auth/register", None, Some(creds.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, body) = call(&app, "POST", "/api/v1/auth/login", None, Some(creds)).await;
        let token = body["token"].as_str().expect("token").to_string();

        let (status, user) =
            call(&app, "GET", "/api/v1/users/email/Bob@Example.com", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user["email"], "bob@example.com");
    }

    #[tokio::test]
    async fn user_crud_over_http() {
        let (state, app) = test_app();
        let admin = admin_token(&state).await;
        let token = Some(admin.as_str());

        let body = json!({ "email": "a@b.com", "password": "pw1234", "name": "Alice" });
        let (status, _) = call(&app, "POST", "/api/v1/users", token, Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = call(&app, "POST", "/api/v1/users", token, Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, user) = call(&app, "GET", "/api/v1/users/email/a@b.com", token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(user.get("password").is_none());
        let id = user["id"].as_i64().expect("id");

        let patch = json!({ "phone": 5550100, "name": "Alicia" });
        let uri = format!("/api/v1/users/{id}");
        let (status, _) = call(&app, "PUT", &uri, token, Some(patch)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, user) = call(&app, "GET", "/api/v1/users/phone/5550100", token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user["name"], "Alicia");

        let (status, list) = call(&app, "GET", "/api/v1/users", token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().map(Vec::len), Some(2));

        let (status, _) = call(&app, "DELETE", &uri, token, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = call(&app, "GET", &uri, token, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().expect("error").contains("by id"));
    }

    #[tokio::test]
    async fn register_validates_input() {
        let (_, app) = test_app();
        let bad_email = json!({ "email": "nope", "password": "secret1" });
        let (status, _) = call(&app, "POST", "/api/v1/auth/register", None, Some(bad_email)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let short = json!({ "email": "a@b.com", "password": "123" });
        let (status, _) = call(&app, "POST", "/api/v1/auth/register", None, Some(short)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
