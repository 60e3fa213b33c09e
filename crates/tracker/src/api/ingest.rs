use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use models::{IngestContext, NewErrorEvent};

use super::{error::ApiError, App, Request};

pub const API_KEY_HEADER: &str = "x-api-key";

// Middleware which resolves the X-API-Key header into the IngestContext
// of its active environment.
pub async fn authorize_api_key(
    State(app): State<Arc<App>>,
    mut req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let api_key = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty());

    let Some(api_key) = api_key else {
        return ApiError::forbidden("X-API-Key header required").into_response();
    };

    let ctx = match app.store.resolve_api_key(api_key).await {
        Ok(Some(ctx)) => ctx,
        Ok(None) => return ApiError::forbidden("invalid API key").into_response(),
        Err(err) => return ApiError::from(err.context("resolving API key")).into_response(),
    };

    req.extensions_mut().insert(ctx);
    next.run(req).await
}

pub async fn log_error(
    State(app): State<Arc<App>>,
    axum::Extension(ctx): axum::Extension<IngestContext>,
    Request(event): Request<NewErrorEvent>,
) -> Result<(StatusCode, axum::Json<serde_json::Value>), ApiError> {
    crate::ingest_event(app.store.as_ref(), &app.queue, ctx, event).await?;

    Ok((
        StatusCode::CREATED,
        axum::Json(serde_json::json!({"success": true})),
    ))
}
