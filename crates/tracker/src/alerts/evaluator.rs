use chrono::{DateTime, Utc};
use models::{ErrorGroup, GroupStatus, NotificationSettings};

use crate::Store;

/// Minimum spacing between two notifications about the same group.
pub fn debounce_interval() -> chrono::Duration {
    chrono::Duration::seconds(60)
}

/// Recent window compared against the baseline when detecting spikes.
pub const SPIKE_RECENT_MINUTES: i64 = 5;
/// Baseline window of spike detection.
pub const SPIKE_BASELINE_MINUTES: i64 = 60;
/// How many times the baseline per-minute rate the recent rate must exceed.
pub const SPIKE_FACTOR: i64 = 100;

/// Occurrence counts of a group over the spike detection windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpikeStats {
    pub last_5m: i64,
    pub last_60m: i64,
}

impl SpikeStats {
    /// True when the per-minute rate over the last 5 minutes is more than
    /// `SPIKE_FACTOR` times the per-minute rate over the last hour.
    /// A group with no occurrences in the last hour never spikes.
    pub fn is_spike(&self) -> bool {
        if self.last_60m == 0 {
            return false;
        }
        // last_5m / 5 > (last_60m / 60) * factor, scaled by 60 to stay in integers.
        let recent = self.last_5m * (SPIKE_BASELINE_MINUTES / SPIKE_RECENT_MINUTES);
        recent > self.last_60m * SPIKE_FACTOR
    }
}

/// The condition which warrants a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The first occurrence of a new group.
    NewError,
    /// At least `count` occurrences were recorded within the trigger's window.
    Threshold { count: i64, window_minutes: u32 },
    /// A group which was ignored before this occurrence is spiking.
    IgnoredSpike(SpikeStats),
}

impl Trigger {
    pub fn name(&self) -> &'static str {
        match self {
            Trigger::NewError => "new_error",
            Trigger::Threshold { .. } => "threshold",
            Trigger::IgnoredSpike(_) => "ignored_spike",
        }
    }
}

/// Decides whether the latest occurrence of `group` warrants a notification.
///
/// Triggers are checked in order (new error, then threshold, then spike on
/// ignored) and the first enabled trigger that holds is returned. `prior_status`
/// is the group's status before the occurrence was recorded, since recording
/// reopens ignored groups. The debounce interval is enforced separately when
/// the notification is claimed.
pub async fn should_notify(
    store: &dyn Store,
    group: &ErrorGroup,
    prior_status: Option<GroupStatus>,
    settings: &NotificationSettings,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<Trigger>> {
    let telegram = &settings.telegram;
    if !telegram.is_configured() {
        return Ok(None);
    }
    let triggers = &telegram.triggers;

    if triggers.new_error && group.occurrence_count == 1 {
        return Ok(Some(Trigger::NewError));
    }

    if triggers.threshold.is_active() {
        let since = now - triggers.threshold.window();
        let count = store.count_occurrences_since(group.id, since).await?;

        if count >= i64::from(triggers.threshold.count) {
            return Ok(Some(Trigger::Threshold {
                count,
                window_minutes: triggers.threshold.window_minutes,
            }));
        }
    }

    if triggers.spike_on_ignored && prior_status == Some(GroupStatus::Ignored) {
        let stats = spike_stats(store, group, now).await?;
        tracing::debug!(group_id = %group.id, ?stats, "evaluated spike on ignored group");

        if stats.is_spike() {
            return Ok(Some(Trigger::IgnoredSpike(stats)));
        }
    }

    Ok(None)
}

async fn spike_stats(
    store: &dyn Store,
    group: &ErrorGroup,
    now: DateTime<Utc>,
) -> anyhow::Result<SpikeStats> {
    let last_5m = store
        .count_occurrences_since(group.id, now - chrono::Duration::minutes(SPIKE_RECENT_MINUTES))
        .await?;
    let last_60m = store
        .count_occurrences_since(
            group.id,
            now - chrono::Duration::minutes(SPIKE_BASELINE_MINUTES),
        )
        .await?;

    Ok(SpikeStats { last_5m, last_60m })
}
