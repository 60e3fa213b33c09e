use anyhow::Context;
use chrono::{DateTime, Utc};
use models::{
    Environment, EnvironmentId, ErrorGroup, GroupId, GroupStatus, IngestContext, LogId,
    NewErrorEvent,
};
use tracker_sql::NotificationClaim;

/// Result of recording one error occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedOccurrence {
    pub group_id: GroupId,
    pub log_id: LogId,
    pub occurrence_count: i64,
    /// Status of the group before this occurrence, or None if the occurrence created it.
    pub prior_status: Option<GroupStatus>,
}

/// Storage operations of the ingestion and notification paths.
/// Tests substitute an in-memory implementation with a controllable clock.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Returns the current time. Reading time through the store keeps
    /// time-windowed decisions deterministic under test.
    fn current_time(&self) -> DateTime<Utc>;

    /// Resolves an ingestion API key of an active environment.
    async fn resolve_api_key(&self, api_key: &str) -> anyhow::Result<Option<IngestContext>>;

    /// Atomically records an occurrence: its group is created or updated, and
    /// the occurrence itself is stored. Either both happen or neither does.
    async fn record_occurrence(
        &self,
        ctx: IngestContext,
        fingerprint: &str,
        event: &NewErrorEvent,
        seen_at: DateTime<Utc>,
    ) -> anyhow::Result<RecordedOccurrence>;

    async fn fetch_group(&self, group_id: GroupId) -> anyhow::Result<Option<ErrorGroup>>;

    async fn fetch_environment(
        &self,
        environment_id: EnvironmentId,
    ) -> anyhow::Result<Option<Environment>>;

    /// Counts occurrences of the group recorded at or after `since`.
    async fn count_occurrences_since(
        &self,
        group_id: GroupId,
        since: DateTime<Utc>,
    ) -> anyhow::Result<i64>;

    /// Claims the group's notification slot if it wasn't notified within
    /// `interval` of `now`. At most one concurrent claimant succeeds.
    async fn claim_notification(
        &self,
        group_id: GroupId,
        now: DateTime<Utc>,
        interval: chrono::Duration,
    ) -> anyhow::Result<Option<NotificationClaim>>;

    /// Returns a claim whose notification wasn't delivered.
    async fn release_notification(&self, claim: &NotificationClaim) -> anyhow::Result<()>;
}

pub struct PgStore {
    pool: sqlx::PgPool,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl Store for PgStore {
    fn current_time(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn resolve_api_key(&self, api_key: &str) -> anyhow::Result<Option<IngestContext>> {
        let ctx = tracker_sql::environments::resolve_api_key(api_key, &self.pool).await?;
        Ok(ctx)
    }

    async fn record_occurrence(
        &self,
        ctx: IngestContext,
        fingerprint: &str,
        event: &NewErrorEvent,
        seen_at: DateTime<Utc>,
    ) -> anyhow::Result<RecordedOccurrence> {
        let mut txn = self.pool.begin().await?;

        let group =
            tracker_sql::error_groups::upsert_occurrence(ctx, fingerprint, event, seen_at, &mut txn)
                .await
                .context("upserting error group")?;
        let log_id =
            tracker_sql::error_logs::insert_log(ctx, group.id, event, seen_at, &mut txn)
                .await
                .context("inserting error log")?;

        txn.commit().await.context("committing error occurrence")?;

        Ok(RecordedOccurrence {
            group_id: group.id,
            log_id,
            occurrence_count: group.occurrence_count,
            prior_status: group.prior_status,
        })
    }

    async fn fetch_group(&self, group_id: GroupId) -> anyhow::Result<Option<ErrorGroup>> {
        Ok(tracker_sql::error_groups::fetch_group(group_id, &self.pool).await?)
    }

    async fn fetch_environment(
        &self,
        environment_id: EnvironmentId,
    ) -> anyhow::Result<Option<Environment>> {
        Ok(tracker_sql::environments::fetch_environment(environment_id, &self.pool).await?)
    }

    async fn count_occurrences_since(
        &self,
        group_id: GroupId,
        since: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        Ok(tracker_sql::error_logs::count_since(group_id, since, &self.pool).await?)
    }

    async fn claim_notification(
        &self,
        group_id: GroupId,
        now: DateTime<Utc>,
        interval: chrono::Duration,
    ) -> anyhow::Result<Option<NotificationClaim>> {
        let claim = tracker_sql::error_groups::claim_notification(
            group_id,
            now,
            now - interval,
            &self.pool,
        )
        .await?;
        Ok(claim)
    }

    async fn release_notification(&self, claim: &NotificationClaim) -> anyhow::Result<()> {
        let released = tracker_sql::error_groups::release_notification(claim, &self.pool).await?;
        if !released {
            tracing::debug!(group_id = %claim.group_id, "notification claim was superseded");
        }
        Ok(())
    }
}
