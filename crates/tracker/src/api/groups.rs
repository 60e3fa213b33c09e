use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use models::{EnvironmentId, ErrorGroup, ErrorLog, GroupId, GroupStatus, ProjectId, StatusChange};
use tracker_sql::error_groups::{GroupFilter, GroupListing};
use tracker_sql::error_logs::LogFilter;
use tracker_sql::Page;

use super::{error::ApiError, project_role, App, UserContext};

const DEFAULT_GROUP_LIMIT: i64 = 50;
const DEFAULT_OCCURRENCE_LIMIT: i64 = 50;

#[derive(Debug, serde::Deserialize)]
pub struct GroupQuery {
    environment_id: Option<EnvironmentId>,
    status: Option<GroupStatus>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, serde::Deserialize)]
pub struct PageQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

pub async fn list_groups(
    State(app): State<Arc<App>>,
    Extension(user): Extension<UserContext>,
    Path(project_id): Path<ProjectId>,
    Query(query): Query<GroupQuery>,
) -> Result<Json<Vec<GroupListing>>, ApiError> {
    project_role(&app, project_id, &user).await?;

    let filter = GroupFilter {
        environment_id: query.environment_id,
        status: query.status,
    };
    let page = Page::new(query.limit, query.offset, DEFAULT_GROUP_LIMIT);
    let groups = tracker_sql::error_groups::list_groups(project_id, filter, page, &app.pg_pool).await?;

    Ok(Json(groups))
}

pub async fn get_group(
    State(app): State<Arc<App>>,
    Extension(user): Extension<UserContext>,
    Path((project_id, group_id)): Path<(ProjectId, GroupId)>,
) -> Result<Json<GroupListing>, ApiError> {
    project_role(&app, project_id, &user).await?;

    let group = tracker_sql::error_groups::fetch_project_group(project_id, group_id, &app.pg_pool)
        .await?
        .ok_or_else(|| ApiError::not_found("error group"))?;

    Ok(Json(group))
}

/// Lists the recorded occurrences of a group, newest first.
pub async fn list_occurrences(
    State(app): State<Arc<App>>,
    Extension(user): Extension<UserContext>,
    Path((project_id, group_id)): Path<(ProjectId, GroupId)>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<ErrorLog>>, ApiError> {
    project_role(&app, project_id, &user).await?;

    tracker_sql::error_groups::fetch_project_group(project_id, group_id, &app.pg_pool)
        .await?
        .ok_or_else(|| ApiError::not_found("error group"))?;

    let filter = LogFilter {
        error_group_id: Some(group_id),
        ..Default::default()
    };
    let page = Page::new(query.limit, query.offset, DEFAULT_OCCURRENCE_LIMIT);
    let logs = tracker_sql::error_logs::list_logs(project_id, filter, page, &app.pg_pool).await?;

    Ok(Json(logs))
}

pub async fn resolve_group(
    State(app): State<Arc<App>>,
    Extension(user): Extension<UserContext>,
    Path((project_id, group_id)): Path<(ProjectId, GroupId)>,
) -> Result<Json<ErrorGroup>, ApiError> {
    let change = StatusChange::Resolve { by: user.user_id };
    change_status(&app, &user, project_id, group_id, change).await
}

pub async fn ignore_group(
    State(app): State<Arc<App>>,
    Extension(user): Extension<UserContext>,
    Path((project_id, group_id)): Path<(ProjectId, GroupId)>,
) -> Result<Json<ErrorGroup>, ApiError> {
    change_status(&app, &user, project_id, group_id, StatusChange::Ignore).await
}

pub async fn reopen_group(
    State(app): State<Arc<App>>,
    Extension(user): Extension<UserContext>,
    Path((project_id, group_id)): Path<(ProjectId, GroupId)>,
) -> Result<Json<ErrorGroup>, ApiError> {
    change_status(&app, &user, project_id, group_id, StatusChange::Reopen).await
}

async fn change_status(
    app: &App,
    user: &UserContext,
    project_id: ProjectId,
    group_id: GroupId,
    change: StatusChange,
) -> Result<Json<ErrorGroup>, ApiError> {
    project_role(app, project_id, user).await?;

    let group = tracker_sql::error_groups::change_status(
        project_id,
        group_id,
        change,
        chrono::Utc::now(),
        &app.pg_pool,
    )
    .await?
    .ok_or_else(|| ApiError::not_found("error group"))?;

    tracing::info!(
        %project_id,
        %group_id,
        user_id = %user.user_id,
        status = %group.status,
        "changed error group status"
    );
    Ok(Json(group))
}
