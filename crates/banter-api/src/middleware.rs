use anyhow::anyhow;
use axum::{extract::Request, extract::State, middleware::Next, response::Response};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use crate::auth::SESSION_COOKIE;
use crate::error::ApiError;
use crate::{AppState, blocking};

/// The resolved identity injected into request extensions by `require_auth`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
}

/// Resolve the session cookie to a user, or reject with 401. The lookup
/// ignores expired sessions, so a stale cookie behaves like no cookie.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(ApiError::Unauthorized)?;

    let row = blocking(move || {
        let session = state.db.get_session(&token)?.ok_or(ApiError::Unauthorized)?;
        state
            .db
            .get_user_by_id(&session.user_id)?
            .ok_or(ApiError::Unauthorized)
    })
    .await?;

    let id: Uuid = row
        .id
        .parse()
        .map_err(|e| anyhow!("corrupt user id '{}': {e}", row.id))?;

    req.extensions_mut().insert(AuthUser {
        id,
        username: row.username,
    });

    Ok(next.run(req).await)
}
