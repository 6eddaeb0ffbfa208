use axum::{
    Json,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;

use banter_types::api::FieldError;

use crate::error::ApiError;

/// `Json` with the rejection folded into the API error taxonomy: malformed
/// or mis-shaped bodies become a 400 with a structured error list instead of
/// axum's default 422.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|rej| {
            ApiError::Validation(vec![FieldError {
                field: "body".to_string(),
                message: rej.body_text(),
            }])
        })?;

        Ok(Self(value))
    }
}
