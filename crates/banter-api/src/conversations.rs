use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::warn;
use uuid::Uuid;

use banter_db::models::{ConversationRow, parse_timestamp};
use banter_types::api::{CreateConversationRequest, DeleteConversationResponse};
use banter_types::models::Conversation;

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::middleware::AuthUser;
use crate::{AppState, blocking};

/// Titles derived from a first message get truncated client-side; the same
/// cap is applied here so explicit creates cannot exceed it.
const TITLE_MAX_LEN: usize = 100;

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let user_id = user.id.to_string();
    let rows = blocking(move || Ok(state.db.get_conversations(&user_id)?)).await?;

    Ok(Json(rows.into_iter().map(conversation_from_row).collect()))
}

pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<CreateConversationRequest>,
) -> Result<Json<Conversation>, ApiError> {
    let title: String = req.title.trim().chars().take(TITLE_MAX_LEN).collect();
    if title.is_empty() {
        return Err(ApiError::validation("title", "must not be empty"));
    }

    let id = Uuid::new_v4().to_string();
    let user_id = user.id.to_string();
    let row = blocking(move || Ok(state.db.create_conversation(&id, &user_id, &title)?)).await?;

    Ok(Json(conversation_from_row(row)))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DeleteConversationResponse>, ApiError> {
    let conversation_id = id.to_string();
    let user_id = user.id.to_string();
    let deleted =
        blocking(move || Ok(state.db.delete_conversation(&conversation_id, &user_id)?)).await?;

    if !deleted {
        // Not-owned and absent are indistinguishable on purpose.
        return Err(ApiError::NotFound("conversation"));
    }

    Ok(Json(DeleteConversationResponse { success: true }))
}

pub(crate) fn conversation_from_row(row: ConversationRow) -> Conversation {
    Conversation {
        id: row.id.parse::<Uuid>().unwrap_or_else(|e| {
            warn!("Corrupt conversation id '{}': {}", row.id, e);
            Uuid::default()
        }),
        user_id: row.user_id.parse::<Uuid>().unwrap_or_else(|e| {
            warn!("Corrupt user_id on conversation '{}': {}", row.id, e);
            Uuid::default()
        }),
        title: row.title,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    }
}
