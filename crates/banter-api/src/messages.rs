use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::{error, warn};
use uuid::Uuid;

use banter_ai::CompletionError;
use banter_db::models::{MessageRow, parse_timestamp};
use banter_types::api::{SendMessageRequest, SendMessageResponse};
use banter_types::models::{Message, Role};

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::middleware::AuthUser;
use crate::{AppState, blocking};

/// At most this many stored messages prime the upstream call.
const CONTEXT_WINDOW: usize = 10;

/// Server-side cap matching the client's composer limit.
const CONTENT_MAX_LEN: usize = 1000;

/// Shown when the provider answered but the payload had no candidate text.
pub const FALLBACK_EMPTY_REPLY: &str = "Sorry, I wasn't able to come up with a response to that.";

/// Shown when the provider call failed outright (non-2xx, timeout, transport
/// error). The thread still advances; the failure is never a transport error
/// for the client.
pub const FALLBACK_UNAVAILABLE_REPLY: &str =
    "Sorry, something went wrong while processing your request. Please try again later.";

pub async fn get_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let conversation_id = id.to_string();
    let user_id = user.id.to_string();

    let rows = blocking(move || {
        state
            .db
            .get_conversation(&conversation_id, &user_id)?
            .ok_or(ApiError::NotFound("conversation"))?;
        Ok(state.db.get_messages(&conversation_id)?)
    })
    .await?;

    Ok(Json(rows.into_iter().map(message_from_row).collect()))
}

/// The central request flow: persist the user turn, call the upstream
/// completion API with a bounded context window, persist the assistant turn
/// (real or fallback), return both. Provider failure degrades gracefully —
/// the response is still 200.
pub async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    if req.content.trim().is_empty() {
        return Err(ApiError::validation("content", "must not be empty"));
    }
    if req.content.chars().count() > CONTENT_MAX_LEN {
        return Err(ApiError::validation(
            "content",
            "must be at most 1000 characters",
        ));
    }

    let content = req.content.clone();
    let conversation_id = id.to_string();
    let user_id = user.id.to_string();

    // History is read before the new turn is written so the prompt does not
    // repeat the question.
    let db_state = state.clone();
    let (history, user_row) = blocking(move || {
        db_state
            .db
            .get_conversation(&conversation_id, &user_id)?
            .ok_or(ApiError::NotFound("conversation"))?;

        let history = db_state.db.get_messages(&conversation_id)?;
        let user_row = db_state.db.insert_message(
            &Uuid::new_v4().to_string(),
            &conversation_id,
            &req.content,
            Role::User.as_str(),
            req.image_url.as_deref(),
        )?;

        Ok((history, user_row))
    })
    .await?;

    let prompt = build_prompt(&history, &content);
    let reply = match state.ai.complete(&prompt).await {
        Ok(text) => text,
        Err(CompletionError::MalformedResponse) => {
            warn!(conversation = %id, "completion response had no text, using fallback");
            FALLBACK_EMPTY_REPLY.to_string()
        }
        Err(err) => {
            error!(conversation = %id, "completion failed: {err}");
            FALLBACK_UNAVAILABLE_REPLY.to_string()
        }
    };

    let db_state = state.clone();
    let conversation_id = id.to_string();
    let ai_row = blocking(move || {
        Ok(db_state.db.insert_message(
            &Uuid::new_v4().to_string(),
            &conversation_id,
            &reply,
            Role::Assistant.as_str(),
            None,
        )?)
    })
    .await?;

    Ok(Json(SendMessageResponse {
        user_message: message_from_row(user_row),
        ai_message: message_from_row(ai_row),
        conversation_id: id,
    }))
}

/// Render the recent history as alternating speaker lines and append the new
/// question. A near-empty conversation skips the context framing.
fn build_prompt(history: &[MessageRow], question: &str) -> String {
    if history.len() < 2 {
        return format!(
            "You are a helpful AI assistant. Reply to the user's message.\n\nUser: {question}\nAssistant:"
        );
    }

    let start = history.len().saturating_sub(CONTEXT_WINDOW);
    let mut lines = String::new();
    for msg in &history[start..] {
        let speaker = match Role::parse(&msg.role) {
            Some(Role::Assistant) => "Assistant",
            _ => "User",
        };
        lines.push_str(speaker);
        lines.push_str(": ");
        lines.push_str(&msg.content);
        lines.push('\n');
    }

    format!(
        "You are a helpful AI assistant. Continue the conversation.\n\n{lines}User: {question}\nAssistant:"
    )
}

pub(crate) fn message_from_row(row: MessageRow) -> Message {
    Message {
        id: row.id.parse::<Uuid>().unwrap_or_else(|e| {
            warn!("Corrupt message id '{}': {}", row.id, e);
            Uuid::default()
        }),
        conversation_id: row.conversation_id.parse::<Uuid>().unwrap_or_else(|e| {
            warn!("Corrupt conversation_id on message '{}': {}", row.id, e);
            Uuid::default()
        }),
        content: row.content,
        role: Role::parse(&row.role).unwrap_or_else(|| {
            warn!("Corrupt role '{}' on message '{}'", row.role, row.id);
            Role::User
        }),
        image_url: row.image_url,
        created_at: parse_timestamp(&row.created_at),
    }
}
