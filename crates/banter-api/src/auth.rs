use anyhow::anyhow;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{SecondsFormat, Utc};
use rand::RngCore;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use banter_db::queries::CreateUserOutcome;
use banter_types::api::{LoginRequest, RegisterRequest};
use banter_types::models::User;

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::profile::public_user;
use crate::{AppState, blocking};

pub const SESSION_COOKIE: &str = "banter_session";

const SESSION_TTL_DAYS: i64 = 30;
const PASSWORD_MIN_LEN: usize = 6;
const USERNAME_MIN_LEN: usize = 3;
const USERNAME_MAX_LEN: usize = 32;

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(CookieJar, Json<User>), ApiError> {
    let mut errors = Vec::new();
    let username_len = req.username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&username_len) {
        errors.push(field_error(
            "username",
            "must be between 3 and 32 characters",
        ));
    }
    if !req.email.contains('@') {
        errors.push(field_error("email", "must be a valid email address"));
    }
    if req.password.chars().count() < PASSWORD_MIN_LEN {
        errors.push(field_error("password", "must be at least 6 characters"));
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    // Hash with Argon2id before touching the database
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {e}"))?
        .to_string();

    let user_id = Uuid::new_v4().to_string();

    let db_state = state.clone();
    let row = blocking(move || {
        // The uniqueness decision lives inside create_user, under the same
        // lock as the insert, so concurrent registrations cannot race it.
        match db_state
            .db
            .create_user(&user_id, &req.username, &req.email, &password_hash)?
        {
            CreateUserOutcome::UsernameTaken => {
                return Err(ApiError::validation("username", "is already taken"));
            }
            CreateUserOutcome::EmailTaken => {
                return Err(ApiError::validation("email", "is already registered"));
            }
            CreateUserOutcome::Created => {}
        }

        db_state
            .db
            .get_user_by_id(&user_id)?
            .ok_or_else(|| ApiError::from(anyhow!("user row missing after insert")))
    })
    .await?;

    info!(username = %row.username, "user registered");

    let jar = establish_session(&state, jar, row.id.clone()).await?;
    Ok((jar, Json(public_user(row))))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<(CookieJar, Json<User>), ApiError> {
    let db_state = state.clone();
    let username = req.username.clone();
    let row = blocking(move || Ok(db_state.db.get_user_by_username(&username)?))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let parsed_hash =
        PasswordHash::new(&row.password).map_err(|e| anyhow!("stored hash unreadable: {e}"))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    // Login is a convenient point to drop expired sessions.
    let db_state = state.clone();
    blocking(move || {
        db_state.db.purge_expired_sessions()?;
        Ok(())
    })
    .await?;

    info!(username = %row.username, "user logged in");

    let jar = establish_session(&state, jar, row.id.clone()).await?;
    Ok((jar, Json(public_user(row))))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<serde_json::Value>), ApiError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let token = cookie.value().to_string();
        let db_state = state.clone();
        blocking(move || {
            db_state.db.delete_session(&token)?;
            Ok(())
        })
        .await?;
    }

    let jar = jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/"));
    Ok((jar, Json(json!({ "success": true }))))
}

/// Create a session row and attach its cookie to the jar.
async fn establish_session(
    state: &AppState,
    jar: CookieJar,
    user_id: String,
) -> Result<CookieJar, ApiError> {
    let mut token_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut token_bytes);
    let token = hex::encode(token_bytes);

    let expires_at = (Utc::now() + chrono::Duration::days(SESSION_TTL_DAYS))
        .to_rfc3339_opts(SecondsFormat::Millis, true);

    let db_state = state.clone();
    let session_token = token.clone();
    blocking(move || {
        db_state
            .db
            .create_session(&session_token, &user_id, &expires_at)?;
        Ok(())
    })
    .await?;

    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    Ok(jar.add(cookie))
}

fn field_error(field: &str, message: &str) -> banter_types::api::FieldError {
    banter_types::api::FieldError {
        field: field.to_string(),
        message: message.to_string(),
    }
}
