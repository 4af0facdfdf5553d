//! Account authentication: Argon2 password hashing, signed bearer tokens and
//! the `/api/auth` routes.

use std::sync::LazyLock;

use anyhow::{Result, anyhow};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use axum::{
    Json, Router,
    extract::{FromRequestParts, State},
    http::{StatusCode, header, request::Parts},
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::api::{ApiError, SharedState};
use super::extract::ApiJson;
use super::models::*;
use super::notify;
use crate::errors::MarketError;

/// Signing secret used when none is configured outside production.
pub const DEV_JWT_SECRET: &str = "freelancie-dev-secret-change-me";

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

/// At least 6 characters, at least one digit.
pub fn validate_password(password: &str) -> Result<(), MarketError> {
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if password.chars().count() < 6 || !has_digit {
        return Err(MarketError::invalid(
            "Password must be at least 6 characters long and contain a number",
        ));
    }
    Ok(())
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

/// Secrets and lifetimes for issued credentials.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_secs: i64,
    pub reset_ttl_secs: i64,
    pub hash_params: HashParams,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl_secs: 7 * 24 * 60 * 60,
            reset_ttl_secs: 60 * 60,
            hash_params: HashParams::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(rename = "userId")]
    user_id: i64,
    iat: i64,
    exp: i64,
}

/// Why a bearer token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    Expired,
    Invalid,
}

impl TokenError {
    fn message(self) -> &'static str {
        match self {
            Self::Expired => "Token expired.",
            Self::Invalid => "Invalid token.",
        }
    }
}

impl AuthConfig {
    fn hasher(&self) -> Result<Argon2<'static>> {
        let p = self.hash_params;
        let params = Params::new(p.memory_kib, p.iterations, p.parallelism, None)
            .map_err(|e| anyhow!("Invalid argon2 parameters: {e}"))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    pub fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .hasher()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("Failed to hash password: {e}"))?;
        Ok(hash.to_string())
    }

    /// Hash on the blocking pool; Argon2 is deliberately slow.
    pub async fn hash_password_blocking(&self, password: String) -> Result<String> {
        let config = self.clone();
        tokio::task::spawn_blocking(move || config.hash_password(&password)).await?
    }

    pub fn issue_token(&self, user_id: i64) -> Result<String> {
        self.issue_token_with_ttl(user_id, self.token_ttl_secs)
    }

    fn issue_token_with_ttl(&self, user_id: i64, ttl_secs: i64) -> Result<String> {
        let iat = chrono::Utc::now().timestamp();
        let claims = Claims {
            user_id,
            iat,
            exp: iat + ttl_secs,
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| anyhow!("Failed to sign token: {e}"))
    }

    /// Returns the `userId` claim of a valid token.
    pub fn decode_token(&self, token: &str) -> Result<i64, TokenError> {
        jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims.user_id)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        })
    }
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// `verify_password` on the blocking pool.
pub async fn verify_password_blocking(password: String, hash: String) -> Result<bool> {
    Ok(tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await?)
}

fn digest_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

// ── Extractor ─────────────────────────────────────────────────────────

/// The account behind a valid `Authorization: Bearer` header.
pub struct AuthUser(pub User);

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("Access denied. No token provided.".into()))?;

        let user_id = state
            .auth
            .decode_token(token)
            .map_err(|e| ApiError::Unauthorized(e.message().into()))?;

        let user = state
            .db
            .call(move |db| db.get_user(user_id))
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Invalid token. User not found.".into()))?;
        Ok(AuthUser(user))
    }
}

// ── Request payloads ──────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
    pub preferred_notification: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Deserialize)]
pub struct ResetRequest {
    pub email: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Deserialize)]
pub struct DeleteAccountRequest {
    pub password: Option<String>,
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ── Routes ────────────────────────────────────────────────────────────

pub fn auth_router() -> Router<SharedState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/profile", get(get_profile).put(update_profile))
        .route("/change-password", put(change_password))
        .route("/password-reset-request", post(password_reset_request))
        .route("/password-reset", post(password_reset))
        .route("/account", delete(delete_account))
}

async fn register(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(name), Some(email), Some(password), Some(role)) = (
        required(req.name),
        required(req.email),
        required(req.password),
        required(req.role),
    ) else {
        return Err(ApiError::BadRequest(
            "Name, email, password, and role are required".into(),
        ));
    };
    if !is_valid_email(&email) {
        return Err(ApiError::BadRequest("Please provide a valid email".into()));
    }
    validate_password(&password)?;
    let role: Role = role.parse().map_err(ApiError::BadRequest)?;
    let preferred_notification = match req.preferred_notification {
        Some(name) => name.parse::<NotificationChannel>()?,
        None => NotificationChannel::default(),
    };

    let password_hash = state.auth.hash_password_blocking(password).await?;
    let user = state
        .db
        .call(move |db| {
            db.create_user(&NewUser {
                name: name.trim().to_string(),
                email,
                role,
                preferred_notification,
                password_hash: Some(password_hash),
            })
        })
        .await?;
    let token = state.auth.issue_token(user.id)?;
    tracing::info!(user_id = user.id, "account registered");

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "message": "User registered successfully",
            "token": token,
            "user": user,
        })),
    ))
}

async fn login(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(email), Some(password)) = (required(req.email), required(req.password)) else {
        return Err(ApiError::BadRequest("Email and password are required".into()));
    };
    let invalid = || ApiError::Unauthorized("Invalid email or password".into());

    let (user, hash) = state
        .db
        .call(move |db| db.get_credentials(&email))
        .await?
        .ok_or_else(invalid)?;
    let hash = hash.ok_or_else(invalid)?;
    if !verify_password_blocking(password, hash).await? {
        tracing::debug!(user_id = user.id, "login rejected");
        return Err(invalid());
    }

    let token = state.auth.issue_token(user.id)?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Login successful",
        "token": token,
        "user": user,
    })))
}

async fn get_profile(AuthUser(user): AuthUser) -> impl IntoResponse {
    Json(serde_json::json!({ "success": true, "user": user }))
}

async fn update_profile(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    ApiJson(mut update): ApiJson<ProfileUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(name) = update.name.as_mut() {
        *name = name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::BadRequest("Name cannot be empty".into()));
        }
    }
    if let Some(skills) = update.skills.as_mut() {
        *skills = skills
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    let user_id = user.id;
    let user = state
        .db
        .call(move |db| db.update_profile(user_id, &update))
        .await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Profile updated successfully",
        "user": user,
    })))
}

async fn change_password(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(current), Some(new)) = (
        required(req.current_password),
        required(req.new_password),
    ) else {
        return Err(ApiError::BadRequest(
            "Current password and new password are required".into(),
        ));
    };
    validate_password(&new)?;

    let user_id = user.id;
    let hash = state
        .db
        .call(move |db| db.get_password_hash(user_id))
        .await?
        .unwrap_or_default();
    if !verify_password_blocking(current, hash).await? {
        return Err(ApiError::BadRequest("Current password is incorrect".into()));
    }

    let new_hash = state.auth.hash_password_blocking(new).await?;
    state
        .db
        .call(move |db| db.set_password_hash(user_id, &new_hash))
        .await?;
    tracing::info!(user_id, "password changed");
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Password changed successfully",
    })))
}

/// Issue a single-use reset token for `email` and deliver it on the owner's
/// preferred channel. Returns the raw token, or `None` when there is no
/// account with a password for that email.
///
/// In-app delivery goes out on the shared WebSocket broadcast, so reset
/// tokens for in-app users are sent by email instead.
pub async fn request_password_reset(state: &SharedState, email: &str) -> Result<Option<String>> {
    let lookup = email.to_string();
    let Some((user, Some(_))) = state.db.call(move |db| db.get_credentials(&lookup)).await? else {
        return Ok(None);
    };

    let token = uuid::Uuid::new_v4().simple().to_string();
    let token_hash = digest_token(&token);
    let expires_at = chrono::Utc::now().timestamp() + state.auth.reset_ttl_secs;
    let user_id = user.id;
    state
        .db
        .call(move |db| db.store_reset_token(user_id, &token_hash, expires_at))
        .await?;

    let channel = reset_channel(user.preferred_notification);
    let minutes = state.auth.reset_ttl_secs / 60;
    let message = format!("Your password reset token is {token}. It expires in {minutes} minutes.");
    notify::dispatch(channel, &state.ws_tx, &user.address_for(channel), &message).await?;
    tracing::info!(user_id, channel = channel.as_str(), "password reset token issued");
    Ok(Some(token))
}

fn reset_channel(preferred: NotificationChannel) -> NotificationChannel {
    match preferred {
        NotificationChannel::InApp => NotificationChannel::Email,
        other => other,
    }
}

async fn password_reset_request(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<ResetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(email) = required(req.email) else {
        return Err(ApiError::BadRequest("Email is required".into()));
    };
    if !is_valid_email(&email) {
        return Err(ApiError::BadRequest("Please provide a valid email".into()));
    }
    request_password_reset(&state, &email).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "If an account with that email exists, a password reset token has been sent",
    })))
}

async fn password_reset(
    State(state): State<SharedState>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(token), Some(new)) = (required(req.token), required(req.new_password)) else {
        return Err(ApiError::BadRequest(
            "Token and new password are required".into(),
        ));
    };
    validate_password(&new)?;

    let token_hash = digest_token(token.trim());
    let now = chrono::Utc::now().timestamp();
    let user_id = state
        .db
        .call(move |db| db.consume_reset_token(&token_hash, now))
        .await?
        .ok_or(MarketError::InvalidResetToken)?;

    let new_hash = state.auth.hash_password_blocking(new).await?;
    state
        .db
        .call(move |db| db.set_password_hash(user_id, &new_hash))
        .await?;
    tracing::info!(user_id, "password reset");
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Password has been reset successfully",
    })))
}

async fn delete_account(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    ApiJson(req): ApiJson<DeleteAccountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(password) = required(req.password) else {
        return Err(ApiError::BadRequest("Password is required".into()));
    };
    let user_id = user.id;
    let hash = state
        .db
        .call(move |db| db.get_password_hash(user_id))
        .await?
        .unwrap_or_default();
    if !verify_password_blocking(password, hash).await? {
        return Err(ApiError::BadRequest("Password is incorrect".into()));
    }
    state.db.call(move |db| db.delete_user(user_id)).await?;
    tracing::info!(user_id, "account deleted");
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Account deleted successfully",
    })))
}

#[cfg(test)]
pub(crate) fn fast_auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: "test-secret".to_string(),
        hash_params: HashParams {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        },
        ..AuthConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::api::AppState;
    use crate::market::db::{DbHandle, MarketDb};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> SharedState {
        let db = DbHandle::new(MarketDb::new_in_memory().unwrap());
        Arc::new(AppState::new(db, fast_auth_config()))
    }

    fn app(state: &SharedState) -> Router {
        Router::new()
            .nest("/api/auth", auth_router())
            .with_state(state.clone())
    }

    async fn send(
        state: &SharedState,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body.to_string())).unwrap();
        let response = app(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    async fn register_alice(state: &SharedState) -> String {
        let (status, body) = send(
            state,
            "POST",
            "/api/auth/register",
            None,
            serde_json::json!({
                "name": "Alice",
                "email": "Alice@Example.com",
                "password": "secret1",
                "role": "client",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["token"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_password_rule() {
        assert!(validate_password("abc123").is_ok());
        assert!(validate_password("abcdef").is_err());
        assert!(validate_password("a1").is_err());
    }

    #[test]
    fn test_email_shape() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.d"));
    }

    #[test]
    fn test_hash_and_verify() {
        let auth = fast_auth_config();
        let hash = auth.hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not-a-hash"));
    }

    #[test]
    fn test_token_round_trip_and_failures() {
        let auth = fast_auth_config();
        let token = auth.issue_token(7).unwrap();
        assert_eq!(auth.decode_token(&token), Ok(7));

        let other = AuthConfig {
            jwt_secret: "another".into(),
            ..fast_auth_config()
        };
        assert_eq!(other.decode_token(&token), Err(TokenError::Invalid));
        assert_eq!(auth.decode_token("garbage"), Err(TokenError::Invalid));

        let expired = auth.issue_token_with_ttl(7, -3600).unwrap();
        assert_eq!(auth.decode_token(&expired), Err(TokenError::Expired));
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let state = test_state();
        register_alice(&state).await;

        let (status, body) = send(
            &state,
            "POST",
            "/api/auth/login",
            None,
            serde_json::json!({"email": "alice@example.com", "password": "secret1"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["user"]["email"], "alice@example.com");
        assert!(body["user"].get("passwordHash").is_none());

        let (status, body) = send(
            &state,
            "POST",
            "/api/auth/login",
            None,
            serde_json::json!({"email": "alice@example.com", "password": "wrong1"}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid email or password");
    }

    #[tokio::test]
    async fn test_register_validation() {
        let state = test_state();
        let (status, body) = send(
            &state,
            "POST",
            "/api/auth/register",
            None,
            serde_json::json!({"name": "Bob", "email": "bob@example.com", "password": "short", "role": "client"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            "Password must be at least 6 characters long and contain a number"
        );

        let (status, _) = send(
            &state,
            "POST",
            "/api/auth/register",
            None,
            serde_json::json!({"name": "Bob", "email": "bob@example.com", "password": "passw0rd", "role": "admin"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        register_alice(&state).await;
        let (status, body) = send(
            &state,
            "POST",
            "/api/auth/register",
            None,
            serde_json::json!({"name": "A2", "email": "alice@example.com", "password": "secret1", "role": "client"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Email already exists");
    }

    #[tokio::test]
    async fn test_profile_requires_token() {
        let state = test_state();
        let (status, body) =
            send(&state, "GET", "/api/auth/profile", None, serde_json::Value::Null).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Access denied. No token provided.");

        let (status, body) = send(
            &state,
            "GET",
            "/api/auth/profile",
            Some("nonsense"),
            serde_json::Value::Null,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid token.");

        let expired = state.auth.issue_token_with_ttl(1, -3600).unwrap();
        let (_, body) =
            send(&state, "GET", "/api/auth/profile", Some(&expired), serde_json::Value::Null)
                .await;
        assert_eq!(body["message"], "Token expired.");

        let orphan = state.auth.issue_token(999).unwrap();
        let (_, body) =
            send(&state, "GET", "/api/auth/profile", Some(&orphan), serde_json::Value::Null).await;
        assert_eq!(body["message"], "Invalid token. User not found.");
    }

    #[tokio::test]
    async fn test_profile_get_and_update() {
        let state = test_state();
        let token = register_alice(&state).await;

        let (status, body) = send(
            &state,
            "PUT",
            "/api/auth/profile",
            Some(&token),
            serde_json::json!({"bio": "Hiring", "skills": [" rust ", "", "sql"], "preferredNotification": "sms"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["bio"], "Hiring");
        assert_eq!(body["user"]["skills"], serde_json::json!(["rust", "sql"]));
        assert_eq!(body["user"]["preferredNotification"], "sms");

        let (status, body) =
            send(&state, "GET", "/api/auth/profile", Some(&token), serde_json::Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["name"], "Alice");
    }

    #[tokio::test]
    async fn test_change_password() {
        let state = test_state();
        let token = register_alice(&state).await;

        let (status, body) = send(
            &state,
            "PUT",
            "/api/auth/change-password",
            Some(&token),
            serde_json::json!({"currentPassword": "nope12", "newPassword": "newpass2"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Current password is incorrect");

        let (status, _) = send(
            &state,
            "PUT",
            "/api/auth/change-password",
            Some(&token),
            serde_json::json!({"currentPassword": "secret1", "newPassword": "newpass2"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &state,
            "POST",
            "/api/auth/login",
            None,
            serde_json::json!({"email": "alice@example.com", "password": "newpass2"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let state = test_state();
        register_alice(&state).await;

        let (status, body) = send(
            &state,
            "POST",
            "/api/auth/password-reset-request",
            None,
            serde_json::json!({"email": "nobody@example.com"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let unknown_message = body["message"].clone();

        assert!(request_password_reset(&state, "nobody@example.com").await.unwrap().is_none());
        let token = request_password_reset(&state, "alice@example.com")
            .await
            .unwrap()
            .unwrap();

        let (status, body) = send(
            &state,
            "POST",
            "/api/auth/password-reset-request",
            None,
            serde_json::json!({"email": "alice@example.com"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], unknown_message);

        let (status, _) = send(
            &state,
            "POST",
            "/api/auth/password-reset",
            None,
            serde_json::json!({"token": token, "newPassword": "fresh123"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // single use
        let (status, body) = send(
            &state,
            "POST",
            "/api/auth/password-reset",
            None,
            serde_json::json!({"token": token, "newPassword": "again123"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid or expired reset token");

        let (status, _) = send(
            &state,
            "POST",
            "/api/auth/login",
            None,
            serde_json::json!({"email": "alice@example.com", "password": "fresh123"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_reset_token_never_broadcast_to_in_app_users() {
        let state = test_state();
        let token = register_alice(&state).await;
        send(
            &state,
            "PUT",
            "/api/auth/profile",
            Some(&token),
            serde_json::json!({"preferredNotification": "inapp"}),
        )
        .await;

        let mut listener = state.ws_tx.subscribe();
        let reset = request_password_reset(&state, "alice@example.com")
            .await
            .unwrap()
            .unwrap();
        while let Ok(raw) = listener.try_recv() {
            assert!(!raw.contains(&reset), "reset token broadcast: {raw}");
        }
        assert_eq!(reset_channel(NotificationChannel::InApp), NotificationChannel::Email);
        assert_eq!(reset_channel(NotificationChannel::Sms), NotificationChannel::Sms);
    }

    #[tokio::test]
    async fn test_passwordless_user_cannot_reset_into_login() {
        let state = test_state();
        state
            .db
            .call(|db| {
                db.create_user(&NewUser {
                    name: "Walk-in".into(),
                    email: "walkin@example.com".into(),
                    role: Role::Client,
                    preferred_notification: NotificationChannel::Email,
                    password_hash: None,
                })
            })
            .await
            .unwrap();

        assert!(request_password_reset(&state, "walkin@example.com").await.unwrap().is_none());

        let (status, body) = send(
            &state,
            "POST",
            "/api/auth/password-reset-request",
            None,
            serde_json::json!({"email": "walkin@example.com"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["message"],
            "If an account with that email exists, a password reset token has been sent"
        );

        let (status, _) = send(
            &state,
            "POST",
            "/api/auth/login",
            None,
            serde_json::json!({"email": "walkin@example.com", "password": "anything1"}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_verify_password_blocking() {
        let hash = fast_auth_config().hash_password("secret1").unwrap();
        assert!(verify_password_blocking("secret1".into(), hash.clone()).await.unwrap());
        assert!(!verify_password_blocking("secret2".into(), hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_auth_body_is_json_error() {
        let state = test_state();
        let request = Request::builder()
            .method("POST")
            .uri("/api/auth/login")
            .header("content-type", "application/json")
            .body(Body::from("{\"email\":"))
            .unwrap();
        let response = app(&state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_delete_account() {
        let state = test_state();
        let token = register_alice(&state).await;

        let (status, _) = send(
            &state,
            "DELETE",
            "/api/auth/account",
            Some(&token),
            serde_json::json!({"password": "wrong99"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &state,
            "DELETE",
            "/api/auth/account",
            Some(&token),
            serde_json::json!({"password": "secret1"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Account deleted successfully");

        let (status, body) =
            send(&state, "GET", "/api/auth/profile", Some(&token), serde_json::Value::Null).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid token. User not found.");
    }
}
