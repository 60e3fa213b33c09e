use anyhow::Context;
use models::{IngestContext, NewErrorEvent};

use crate::alerts::{NotificationJob, NotificationQueue};
use crate::{RecordedOccurrence, Store};

/// Records one error event and schedules its notification evaluation.
///
/// The occurrence is attributed to `ctx`, fingerprinted, and stored together
/// with its group in one atomic step. A notification job is enqueued only
/// after the occurrence is durable. Nothing is stored or enqueued on failure.
#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(project_id = %ctx.project_id, environment_id = %ctx.environment_id)
)]
pub async fn ingest_event(
    store: &dyn Store,
    queue: &NotificationQueue,
    ctx: IngestContext,
    event: NewErrorEvent,
) -> anyhow::Result<RecordedOccurrence> {
    let seen_at = event.timestamp.unwrap_or_else(|| store.current_time());
    let fingerprint = fingerprint::fingerprint(
        &event.message,
        event.stack.as_deref().unwrap_or_default(),
        event.url.as_deref().unwrap_or_default(),
    );

    let recorded = store
        .record_occurrence(ctx, &fingerprint, &event, seen_at)
        .await
        .context("recording error occurrence")?;

    tracing::debug!(
        group_id = %recorded.group_id,
        log_id = %recorded.log_id,
        occurrence_count = recorded.occurrence_count,
        prior_status = ?recorded.prior_status,
        "recorded error occurrence"
    );

    queue.push(NotificationJob {
        project_id: ctx.project_id,
        environment_id: ctx.environment_id,
        group_id: recorded.group_id,
        occurrence_count: recorded.occurrence_count,
        prior_status: recorded.prior_status,
    });

    Ok(recorded)
}
