use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error payload shape produced by `AppError::error_response`, surfaced
/// here so the OpenAPI document can reference it.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}
