use chrono::{DateTime, Utc};
use models::{
    EnvironmentId, ErrorGroup, GroupId, GroupStatus, IngestContext, Level, NewErrorEvent,
    ProjectId, StatusChange,
};
use serde::Serialize;

use crate::Page;

/// Outcome of recording an occurrence against its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct RecordedGroup {
    pub id: GroupId,
    pub occurrence_count: i64,
    /// Status of the group before this occurrence, or None if the group was just created.
    pub prior_status: Option<GroupStatus>,
}

/// Records an occurrence of `fingerprint`, creating its group on first sight.
/// A repeat occurrence increments the count, advances `last_seen`, and
/// reopens the group. Descriptive fields are kept from the first occurrence.
#[tracing::instrument(level = "debug", skip(event, txn))]
pub async fn upsert_occurrence(
    ctx: IngestContext,
    fingerprint: &str,
    event: &NewErrorEvent,
    seen_at: DateTime<Utc>,
    txn: &mut sqlx::PgConnection,
) -> sqlx::Result<RecordedGroup> {
    sqlx::query_as::<_, RecordedGroup>(
        r#"
        with prior as (
            select status from error_groups
            where project_id = $1 and environment_id = $2 and fingerprint = $3
        )
        insert into error_groups (
            project_id, environment_id, fingerprint, message, stack, url,
            source, level, first_seen, last_seen, occurrence_count, status
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9, 1, 'unresolved')
        on conflict (project_id, environment_id, fingerprint) do update set
            occurrence_count = error_groups.occurrence_count + 1,
            last_seen = excluded.last_seen,
            status = 'unresolved',
            resolved_at = null,
            resolved_by = null
        returning
            id,
            occurrence_count,
            (select status from prior) as prior_status
        "#,
    )
    .bind(ctx.project_id)
    .bind(ctx.environment_id)
    .bind(fingerprint)
    .bind(&event.message)
    .bind(&event.stack)
    .bind(&event.url)
    .bind(event.source)
    .bind(event.level)
    .bind(seen_at)
    .fetch_one(&mut *txn)
    .await
}

pub async fn fetch_group(
    group_id: GroupId,
    db: impl sqlx::PgExecutor<'_>,
) -> sqlx::Result<Option<ErrorGroup>> {
    sqlx::query_as::<_, ErrorGroup>("select * from error_groups where id = $1")
        .bind(group_id)
        .fetch_optional(db)
        .await
}

/// An error group as listed in the dashboard, with its environment's name.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct GroupListing {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub group: ErrorGroup,
    pub environment_name: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GroupFilter {
    pub environment_id: Option<EnvironmentId>,
    pub status: Option<GroupStatus>,
}

/// Lists the groups of a project, most recently seen first.
pub async fn list_groups(
    project_id: ProjectId,
    filter: GroupFilter,
    page: Page,
    pool: &sqlx::PgPool,
) -> sqlx::Result<Vec<GroupListing>> {
    sqlx::query_as::<_, GroupListing>(
        r#"
        select g.*, e.name as environment_name
        from error_groups g
        join environments e on e.id = g.environment_id
        where g.project_id = $1
            and ($2::bigint is null or g.environment_id = $2)
            and ($3::group_status is null or g.status = $3)
        order by g.last_seen desc, g.id desc
        limit $4 offset $5
        "#,
    )
    .bind(project_id)
    .bind(filter.environment_id)
    .bind(filter.status)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(pool)
    .await
}

pub async fn fetch_project_group(
    project_id: ProjectId,
    group_id: GroupId,
    pool: &sqlx::PgPool,
) -> sqlx::Result<Option<GroupListing>> {
    sqlx::query_as::<_, GroupListing>(
        r#"
        select g.*, e.name as environment_name
        from error_groups g
        join environments e on e.id = g.environment_id
        where g.project_id = $1 and g.id = $2
        "#,
    )
    .bind(project_id)
    .bind(group_id)
    .fetch_optional(pool)
    .await
}

/// Applies a manual status change to a group of the project.
/// Returns None if the project has no such group.
#[tracing::instrument(level = "debug", skip(db))]
pub async fn change_status(
    project_id: ProjectId,
    group_id: GroupId,
    change: StatusChange,
    now: DateTime<Utc>,
    db: impl sqlx::PgExecutor<'_>,
) -> sqlx::Result<Option<ErrorGroup>> {
    let resolved_at = matches!(change, StatusChange::Resolve { .. }).then_some(now);

    sqlx::query_as::<_, ErrorGroup>(
        r#"
        update error_groups set
            status = $3,
            resolved_at = $4,
            resolved_by = $5
        where project_id = $1 and id = $2
        returning *
        "#,
    )
    .bind(project_id)
    .bind(group_id)
    .bind(change.target())
    .bind(resolved_at)
    .bind(change.resolved_by())
    .fetch_optional(db)
    .await
}

/// A successful claim of a group's notification slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationClaim {
    pub group_id: GroupId,
    pub claimed_at: DateTime<Utc>,
    /// `last_notified_at` as it was before the claim.
    pub previous: Option<DateTime<Utc>>,
}

/// Atomically claims the right to notify about a group: succeeds only when
/// the group hasn't been notified since `not_after`, and in that case records
/// the notification at `now`. Concurrent claims serialize on the group row,
/// so at most one of them succeeds.
#[tracing::instrument(level = "debug", skip(db))]
pub async fn claim_notification(
    group_id: GroupId,
    now: DateTime<Utc>,
    not_after: DateTime<Utc>,
    db: impl sqlx::PgExecutor<'_>,
) -> sqlx::Result<Option<NotificationClaim>> {
    let previous = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
        r#"
        with prior as (
            select last_notified_at from error_groups where id = $1
        )
        update error_groups set
            last_notified_at = $2,
            notification_count = notification_count + 1
        where id = $1 and (last_notified_at is null or last_notified_at <= $3)
        returning (select last_notified_at from prior)
        "#,
    )
    .bind(group_id)
    .bind(now)
    .bind(not_after)
    .fetch_optional(db)
    .await?;

    Ok(previous.map(|previous| NotificationClaim {
        group_id,
        claimed_at: now,
        previous,
    }))
}

/// Undoes a claim whose notification could not be delivered. A no-op if the
/// group has been notified again since.
#[tracing::instrument(level = "debug", skip(db))]
pub async fn release_notification(
    claim: &NotificationClaim,
    db: impl sqlx::PgExecutor<'_>,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r#"
        update error_groups set
            last_notified_at = $3,
            notification_count = greatest(notification_count - 1, 0)
        where id = $1 and last_notified_at = $2
        "#,
    )
    .bind(claim.group_id)
    .bind(claim.claimed_at)
    .bind(claim.previous)
    .execute(db)
    .await?;

    Ok(result.rows_affected() == 1)
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NotificationHistoryEntry {
    pub id: GroupId,
    pub message: String,
    pub level: Level,
    pub status: GroupStatus,
    pub occurrence_count: i64,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub notification_count: i64,
}

/// Groups of an environment which have been notified about, most recent first.
pub async fn notification_history(
    project_id: ProjectId,
    environment_id: EnvironmentId,
    pool: &sqlx::PgPool,
) -> sqlx::Result<Vec<NotificationHistoryEntry>> {
    sqlx::query_as::<_, NotificationHistoryEntry>(
        r#"
        select id, message, level, status, occurrence_count, last_notified_at, notification_count
        from error_groups
        where project_id = $1 and environment_id = $2 and notification_count > 0
        order by last_notified_at desc nulls last
        limit 50
        "#,
    )
    .bind(project_id)
    .bind(environment_id)
    .fetch_all(pool)
    .await
}
