use std::sync::Arc;

use anyhow::anyhow;
use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use tracing::warn;

use parley_db::Database;
use parley_types::api::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use parley_types::models::User;

use crate::error::ApiError;
use crate::token;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
}

// -- Handlers --

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Argon2 hashing and the DB write are blocking; keep them off the async runtime
    let worker = state.clone();
    let user = tokio::task::spawn_blocking(move || register_user(&worker.db, &req))
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {e}"))??;

    let token = token::issue(&state.jwt_secret, &user.username)?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { user, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let worker = state.clone();
    let token = tokio::task::spawn_blocking(move || login_user(&worker.db, &worker.jwt_secret, &req))
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {e}"))??;

    Ok(Json(LoginResponse { token }))
}

// -- Core --

/// Create a new user account.
///
/// All five profile fields are required. A duplicate username surfaces as
/// `Conflict`, detected from the primary-key violation itself so that two
/// racing registrations cannot both succeed.
pub fn register_user(db: &Database, req: &RegisterRequest) -> Result<User, ApiError> {
    require_fields(&[
        ("username", &req.username),
        ("password", &req.password),
        ("first_name", &req.first_name),
        ("last_name", &req.last_name),
        ("phone", &req.phone),
    ])?;

    let password_hash = hash_password(&req.password)?;
    let joined_at = Utc::now();

    match db.create_user(
        &req.username,
        &password_hash,
        &req.first_name,
        &req.last_name,
        &req.phone,
        &joined_at.to_rfc3339(),
    ) {
        Ok(()) => {}
        Err(e) if parley_db::is_unique_violation(&e) => return Err(ApiError::Conflict),
        Err(e) => return Err(e.into()),
    }

    Ok(User {
        username: req.username.clone(),
        first_name: req.first_name.clone(),
        last_name: req.last_name.clone(),
        phone: req.phone.clone(),
        joined_at,
        last_login_at: None,
    })
}

/// Verify `password` against the stored hash for `username`.
///
/// An unknown username yields `Ok(false)`, the same result as a wrong
/// password — callers cannot tell the two apart.
pub fn authenticate(db: &Database, username: &str, password: &str) -> Result<bool, ApiError> {
    let Some(user) = db.get_user_by_username(username)? else {
        return Ok(false);
    };

    let parsed = PasswordHash::new(&user.password_hash)
        .map_err(|e| anyhow!("corrupt password hash for {username}: {e}"))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Authenticate and issue a token, recording the login time.
pub fn login_user(db: &Database, jwt_secret: &str, req: &LoginRequest) -> Result<String, ApiError> {
    require_fields(&[("username", &req.username), ("password", &req.password)])?;

    if !authenticate(db, &req.username, &req.password)? {
        return Err(ApiError::Authentication);
    }

    // Best-effort: a failed timestamp write must not fail the login
    if let Err(e) = db.update_last_login(&req.username, &Utc::now().to_rfc3339()) {
        warn!("failed to update last login for {}: {e:#}", req.username);
    }

    Ok(token::issue(jwt_secret, &req.username)?)
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {e}"))?;
    Ok(hash.to_string())
}

fn require_fields(fields: &[(&str, &str)]) -> Result<(), ApiError> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| *name)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(format!(
            "missing required fields: {}",
            missing.join(", ")
        )))
    }
}
