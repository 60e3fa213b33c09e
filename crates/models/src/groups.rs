use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EnvironmentId, GroupId, Level, ProjectId, Source, UserId};

/// Lifecycle status of an error group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Unresolved,
    Resolved,
    Ignored,
}

impl GroupStatus {
    pub fn name(&self) -> &'static str {
        match self {
            GroupStatus::Unresolved => "unresolved",
            GroupStatus::Resolved => "resolved",
            GroupStatus::Ignored => "ignored",
        }
    }

    fn all() -> &'static [GroupStatus] {
        &[
            GroupStatus::Unresolved,
            GroupStatus::Resolved,
            GroupStatus::Ignored,
        ]
    }

    pub fn from_str(name: &str) -> Option<GroupStatus> {
        GroupStatus::all()
            .iter()
            .find(|status| name.eq_ignore_ascii_case(status.name()))
            .copied()
    }
}

crate::pg_enum!(GroupStatus, "group_status");

/// A manual status change requested from the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Resolve { by: UserId },
    Ignore,
    Reopen,
}

impl StatusChange {
    /// Status the group holds after the change is applied.
    pub fn target(&self) -> GroupStatus {
        match self {
            StatusChange::Resolve { .. } => GroupStatus::Resolved,
            StatusChange::Ignore => GroupStatus::Ignored,
            StatusChange::Reopen => GroupStatus::Unresolved,
        }
    }

    /// User recorded as the resolver, which is only set by a resolve.
    pub fn resolved_by(&self) -> Option<UserId> {
        match self {
            StatusChange::Resolve { by } => Some(*by),
            StatusChange::Ignore | StatusChange::Reopen => None,
        }
    }
}

/// A set of error occurrences sharing a fingerprint within one project and environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx-support", derive(sqlx::FromRow))]
pub struct ErrorGroup {
    pub id: GroupId,
    pub project_id: ProjectId,
    pub environment_id: EnvironmentId,
    pub fingerprint: String,
    /// Message, stack and url are taken from the first occurrence.
    pub message: String,
    pub stack: Option<String>,
    pub url: Option<String>,
    pub source: Source,
    pub level: Level,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub occurrence_count: i64,
    pub status: GroupStatus,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<UserId>,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub notification_count: i64,
    pub created_at: DateTime<Utc>,
}

impl ErrorGroup {
    /// Records a further occurrence seen at `seen_at`, returning the status held beforehand.
    /// Any occurrence reopens a resolved or ignored group.
    pub fn record_occurrence(&mut self, seen_at: DateTime<Utc>) -> GroupStatus {
        let prior = self.status;

        self.occurrence_count += 1;
        self.last_seen = seen_at;
        self.status = GroupStatus::Unresolved;
        self.resolved_at = None;
        self.resolved_by = None;

        prior
    }

    /// Applies a manual status change made at `now`.
    pub fn apply(&mut self, change: StatusChange, now: DateTime<Utc>) {
        self.status = change.target();
        self.resolved_by = change.resolved_by();
        self.resolved_at = match change {
            StatusChange::Resolve { .. } => Some(now),
            StatusChange::Ignore | StatusChange::Reopen => None,
        };
    }

    /// Whether a notification was sent within `interval` of `now`.
    pub fn notified_within(&self, now: DateTime<Utc>, interval: chrono::Duration) -> bool {
        match self.last_notified_at {
            Some(last) => now - last < interval,
            None => false,
        }
    }
}
