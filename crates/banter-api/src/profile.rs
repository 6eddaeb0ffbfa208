use anyhow::anyhow;
use axum::{Extension, Json, extract::State};
use tracing::warn;
use uuid::Uuid;

use banter_db::models::{UserRow, parse_timestamp};
use banter_types::api::UpdateProfileRequest;
use banter_types::models::{Preferences, User};

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::middleware::AuthUser;
use crate::{AppState, blocking};

const NAME_MAX_LEN: usize = 100;
const BIO_MAX_LEN: usize = 500;

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<User>, ApiError> {
    let user_id = user.id.to_string();
    let row = blocking(move || {
        state
            .db
            .get_user_by_id(&user_id)?
            .ok_or_else(|| ApiError::from(anyhow!("authenticated user row missing")))
    })
    .await?;

    Ok(Json(public_user(row)))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<Json<User>, ApiError> {
    let mut errors = Vec::new();
    if let Some(name) = &req.name {
        let len = name.chars().count();
        if len == 0 || len > NAME_MAX_LEN {
            errors.push(banter_types::api::FieldError {
                field: "name".to_string(),
                message: "must be between 1 and 100 characters".to_string(),
            });
        }
    }
    if let Some(bio) = &req.bio {
        if bio.chars().count() > BIO_MAX_LEN {
            errors.push(banter_types::api::FieldError {
                field: "bio".to_string(),
                message: "must be at most 500 characters".to_string(),
            });
        }
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    // Serialized explicitly at the persistence boundary; the stored blob is
    // always produced from the typed struct.
    let preferences_json = match &req.preferences {
        Some(prefs) => Some(
            serde_json::to_string(prefs)
                .map_err(|e| anyhow!("preferences serialization failed: {e}"))?,
        ),
        None => None,
    };

    let user_id = user.id.to_string();
    let row = blocking(move || {
        state.db.update_user_profile(
            &user_id,
            req.name.as_deref(),
            req.bio.as_deref(),
            preferences_json.as_deref(),
        )?;
        state
            .db
            .get_user_by_id(&user_id)?
            .ok_or_else(|| ApiError::from(anyhow!("authenticated user row missing")))
    })
    .await?;

    Ok(Json(public_user(row)))
}

/// Strip the password hash and parse stored fields into the public record.
pub(crate) fn public_user(row: UserRow) -> User {
    User {
        id: row.id.parse::<Uuid>().unwrap_or_else(|e| {
            warn!("Corrupt user id '{}': {}", row.id, e);
            Uuid::default()
        }),
        username: row.username,
        email: row.email,
        name: row.name,
        bio: row.bio,
        preferences: parse_preferences(row.preferences.as_deref()),
        created_at: parse_timestamp(&row.created_at),
    }
}

/// A malformed stored blob reads back as the empty default. Deliberate:
/// preferences are cosmetic and not worth failing a profile read over.
fn parse_preferences(raw: Option<&str>) -> Preferences {
    match raw {
        None => Preferences::default(),
        Some(s) => serde_json::from_str(s).unwrap_or_else(|e| {
            warn!("Corrupt preferences blob: {}", e);
            Preferences::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_blob_parses() {
        let prefs = parse_preferences(Some(r#"{"theme":"dark","notifications":true}"#));
        assert_eq!(prefs.theme.as_deref(), Some("dark"));
        assert_eq!(prefs.notifications, Some(true));
    }

    #[test]
    fn missing_and_corrupt_blobs_read_as_default() {
        assert_eq!(parse_preferences(None), Preferences::default());
        assert_eq!(parse_preferences(Some("{not json")), Preferences::default());
        // Unknown keys in stored data count as corruption, same default.
        assert_eq!(
            parse_preferences(Some(r#"{"legacy_key":1}"#)),
            Preferences::default()
        );
    }
}
