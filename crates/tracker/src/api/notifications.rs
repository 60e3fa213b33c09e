use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use models::{EnvironmentId, ProjectId};
use tracker_sql::error_groups::NotificationHistoryEntry;

use super::{error::ApiError, require_admin, App, UserContext};
use crate::alerts::TestNotificationError;

/// Sends a test message to the environment's Telegram chat.
pub async fn send_test(
    State(app): State<Arc<App>>,
    Extension(user): Extension<UserContext>,
    Path((project_id, environment_id)): Path<(ProjectId, EnvironmentId)>,
) -> Result<axum::response::Response, ApiError> {
    require_admin(&app, project_id, &user).await?;

    let environment =
        tracker_sql::environments::fetch_project_environment(project_id, environment_id, &app.pg_pool)
            .await?
            .ok_or_else(|| ApiError::not_found("environment"))?;

    let response = match app.notifier.send_test(&environment).await {
        Ok(()) => Json(serde_json::json!({
            "success": true,
            "message": "Test notification sent",
        }))
        .into_response(),
        Err(err @ (TestNotificationError::NotConfigured | TestNotificationError::Delivery(_))) => {
            if let TestNotificationError::Delivery(delivery) = &err {
                tracing::warn!(
                    %environment_id,
                    category = delivery.category(),
                    error = %delivery,
                    "test notification failed"
                );
            }
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "success": false,
                    "message": err.to_string(),
                })),
            )
                .into_response()
        }
        Err(TestNotificationError::Render(err)) => return Err(ApiError::from(err)),
    };

    Ok(response)
}

/// Lists the environment's groups which have been notified about.
pub async fn history(
    State(app): State<Arc<App>>,
    Extension(user): Extension<UserContext>,
    Path((project_id, environment_id)): Path<(ProjectId, EnvironmentId)>,
) -> Result<Json<Vec<NotificationHistoryEntry>>, ApiError> {
    require_admin(&app, project_id, &user).await?;

    let entries =
        tracker_sql::error_groups::notification_history(project_id, environment_id, &app.pg_pool)
            .await?;

    Ok(Json(entries))
}
