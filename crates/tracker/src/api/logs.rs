use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use models::{EnvironmentId, ErrorLog, GroupId, Level, LogId, ProjectId, Source};
use tracker_sql::error_logs::LogFilter;
use tracker_sql::Page;

use super::{error::ApiError, project_role, App, Request, UserContext};

const DEFAULT_LOG_LIMIT: i64 = 100;

#[derive(Debug, serde::Deserialize)]
pub struct LogQuery {
    level: Option<Level>,
    source: Option<Source>,
    environment_id: Option<EnvironmentId>,
    error_group_id: Option<GroupId>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, serde::Deserialize, validator::Validate)]
pub struct ResolveLog {
    resolved: bool,
}

pub async fn list_logs(
    State(app): State<Arc<App>>,
    Extension(user): Extension<UserContext>,
    Path(project_id): Path<ProjectId>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Vec<ErrorLog>>, ApiError> {
    project_role(&app, project_id, &user).await?;

    let filter = LogFilter {
        level: query.level,
        source: query.source,
        environment_id: query.environment_id,
        error_group_id: query.error_group_id,
    };
    let page = Page::new(query.limit, query.offset, DEFAULT_LOG_LIMIT);
    let logs = tracker_sql::error_logs::list_logs(project_id, filter, page, &app.pg_pool).await?;

    Ok(Json(logs))
}

pub async fn get_log(
    State(app): State<Arc<App>>,
    Extension(user): Extension<UserContext>,
    Path((project_id, log_id)): Path<(ProjectId, LogId)>,
) -> Result<Json<ErrorLog>, ApiError> {
    project_role(&app, project_id, &user).await?;

    let log = tracker_sql::error_logs::fetch_log(project_id, log_id, &app.pg_pool)
        .await?
        .ok_or_else(|| ApiError::not_found("error"))?;

    Ok(Json(log))
}

/// Sets the resolved flag of a single occurrence. Its group is unaffected.
pub async fn resolve_log(
    State(app): State<Arc<App>>,
    Extension(user): Extension<UserContext>,
    Path((project_id, log_id)): Path<(ProjectId, LogId)>,
    Request(body): Request<ResolveLog>,
) -> Result<Json<serde_json::Value>, ApiError> {
    project_role(&app, project_id, &user).await?;

    let updated =
        tracker_sql::error_logs::set_resolved(project_id, log_id, body.resolved, &app.pg_pool)
            .await?;
    if !updated {
        return Err(ApiError::not_found("error"));
    }

    Ok(Json(serde_json::json!({"success": true, "resolved": body.resolved})))
}
