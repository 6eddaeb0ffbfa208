pub mod auth;
pub mod conversations;
pub mod error;
pub mod extract;
pub mod limit;
pub mod messages;
pub mod middleware;
pub mod profile;
pub mod status;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Router,
    middleware as axum_middleware,
    routing::{delete, get, post},
};

use banter_ai::CompletionProvider;
use banter_db::Database;

use crate::error::ApiError;
use crate::limit::RateLimiter;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub ai: Arc<dyn CompletionProvider>,
    pub started_at: Instant,
}

impl AppStateInner {
    pub fn new(db: Database, ai: Arc<dyn CompletionProvider>) -> AppState {
        Arc::new(Self {
            db,
            ai,
            started_at: Instant::now(),
        })
    }
}

/// Abuse limits, taken per route class. The limiter is not a correctness
/// mechanism; it fails fast with 429 before any persistence work.
const AUTH_RATE_MAX: usize = 5;
const AUTH_RATE_WINDOW: Duration = Duration::from_secs(15 * 60);
const CHAT_RATE_MAX: usize = 10;
const CHAT_RATE_WINDOW: Duration = Duration::from_secs(60);

pub fn router(state: AppState) -> Router {
    let auth_limiter = RateLimiter::new(AUTH_RATE_MAX, AUTH_RATE_WINDOW);
    let chat_limiter = RateLimiter::new(CHAT_RATE_MAX, CHAT_RATE_WINDOW);

    let public = Router::new()
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
        .layer(axum_middleware::from_fn_with_state(
            auth_limiter,
            limit::rate_limit,
        ));

    let protected = Router::new()
        .route("/api/logout", post(auth::logout))
        .route(
            "/api/user/profile",
            get(profile::get_profile).put(profile::update_profile),
        )
        .route(
            "/api/conversations",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route(
            "/api/conversations/{id}",
            delete(conversations::delete_conversation),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // The messages routes carry their own limiter, outside auth so an
    // abusive sender is rejected before any session lookup. Reads pass
    // through the limiter untouched.
    let chat = Router::new()
        .route(
            "/api/conversations/{id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .layer(axum_middleware::from_fn_with_state(
            chat_limiter,
            limit::rate_limit,
        ));

    let liveness = Router::new()
        .route("/health", get(status::health))
        .route("/api/status", get(status::api_status));

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(chat)
        .merge(liveness)
        .with_state(state)
}

/// Run blocking database work off the async runtime.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::from(anyhow::anyhow!("blocking task join error: {e}")))?
}
