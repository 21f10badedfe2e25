use axum::{
    body::Body,
    extract::Request,
    middleware::Next,
    response::Response,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::AppError;

/// Largest JSON body accepted by validated routes
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Deserialize and validate the JSON body as `T` before the handler runs
pub async fn validate_json<T: DeserializeOwned + Validate>(
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| AppError::InvalidInput("Invalid request body".to_string()))?;

    let value: T = serde_json::from_slice(&bytes)
        .map_err(|e| AppError::InvalidInput(format!("Invalid JSON: {}", e)))?;

    value.validate().map_err(|e| {
        let mut errors = e
            .field_errors()
            .into_iter()
            .map(|(field, errors)| {
                let error_messages: Vec<String> = errors
                    .iter()
                    .map(|e| e.message.as_ref().map(|s| s.to_string()).unwrap_or_default())
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<String>>();
        errors.sort();

        AppError::InvalidInput(format!("Validation failed: {}", errors.join("; ")))
    })?;

    // Rebuild the request with the validated body
    let req = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(req).await)
}
