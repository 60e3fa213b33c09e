use chrono::{DateTime, Utc};
use models::{
    EnvironmentId, ErrorLog, GroupId, IngestContext, Level, LogId, NewErrorEvent, ProjectId,
    Source,
};

use crate::Page;

/// Stores one occurrence of an error, attributed to its group.
#[tracing::instrument(level = "debug", skip(event, txn))]
pub async fn insert_log(
    ctx: IngestContext,
    group_id: GroupId,
    event: &NewErrorEvent,
    timestamp: DateTime<Utc>,
    txn: &mut sqlx::PgConnection,
) -> sqlx::Result<LogId> {
    sqlx::query_scalar::<_, LogId>(
        r#"
        insert into error_logs (
            project_id, environment_id, error_group_id, message, stack, url,
            source, level, method, user_agent, user_id, status_code, extra_data,
            request_body, request_headers, response_body, response_time_ms, "timestamp"
        ) values (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18
        )
        returning id
        "#,
    )
    .bind(ctx.project_id)
    .bind(ctx.environment_id)
    .bind(group_id)
    .bind(&event.message)
    .bind(&event.stack)
    .bind(&event.url)
    .bind(event.source)
    .bind(event.level)
    .bind(&event.method)
    .bind(&event.user_agent)
    .bind(&event.user_id)
    .bind(event.status_code)
    .bind(&event.extra_data)
    .bind(&event.request_body)
    .bind(&event.request_headers)
    .bind(&event.response_body)
    .bind(event.response_time_ms)
    .bind(timestamp)
    .fetch_one(&mut *txn)
    .await
}

/// Counts the occurrences of a group recorded at or after `since`.
pub async fn count_since(
    group_id: GroupId,
    since: DateTime<Utc>,
    db: impl sqlx::PgExecutor<'_>,
) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>(
        "select count(*) from error_logs where error_group_id = $1 and created_at >= $2",
    )
    .bind(group_id)
    .bind(since)
    .fetch_one(db)
    .await
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogFilter {
    pub level: Option<Level>,
    pub source: Option<Source>,
    pub environment_id: Option<EnvironmentId>,
    pub error_group_id: Option<GroupId>,
}

/// Lists the occurrences of a project, newest first.
pub async fn list_logs(
    project_id: ProjectId,
    filter: LogFilter,
    page: Page,
    pool: &sqlx::PgPool,
) -> sqlx::Result<Vec<ErrorLog>> {
    sqlx::query_as::<_, ErrorLog>(
        r#"
        select * from error_logs
        where project_id = $1
            and ($2::error_level is null or level = $2)
            and ($3::error_source is null or source = $3)
            and ($4::bigint is null or environment_id = $4)
            and ($5::bigint is null or error_group_id = $5)
        order by "timestamp" desc, id desc
        limit $6 offset $7
        "#,
    )
    .bind(project_id)
    .bind(filter.level)
    .bind(filter.source)
    .bind(filter.environment_id)
    .bind(filter.error_group_id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await
}

pub async fn fetch_log(
    project_id: ProjectId,
    log_id: LogId,
    pool: &sqlx::PgPool,
) -> sqlx::Result<Option<ErrorLog>> {
    sqlx::query_as::<_, ErrorLog>("select * from error_logs where project_id = $1 and id = $2")
        .bind(project_id)
        .bind(log_id)
        .fetch_optional(pool)
        .await
}

/// Marks a single occurrence as resolved or not. Returns false if the project has no such log.
pub async fn set_resolved(
    project_id: ProjectId,
    log_id: LogId,
    resolved: bool,
    pool: &sqlx::PgPool,
) -> sqlx::Result<bool> {
    let result =
        sqlx::query("update error_logs set resolved = $3 where project_id = $1 and id = $2")
            .bind(project_id)
            .bind(log_id)
            .bind(resolved)
            .execute(pool)
            .await?;

    Ok(result.rows_affected() == 1)
}
