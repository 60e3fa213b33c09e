//! Error notifications
//!
//! Every recorded occurrence is handed to the notification path as a
//! `NotificationJob` on a bounded in-process queue, so ingestion never waits
//! on notification work. When the queue is full the oldest job is dropped.
//!
//! A pool of workers drains the queue. For each job, a worker:
//!
//! - loads the group and its environment's notification settings,
//! - evaluates the enabled triggers in order: new error, occurrence
//!   threshold, and spike of a previously ignored group,
//! - claims the group's notification slot, which fails if the group was
//!   notified within the last 60 seconds,
//! - renders and sends the alert, releasing the claim if delivery fails.
//!
//! Triggers see the group status as it was *before* the occurrence was
//! recorded. Recording an occurrence reopens ignored groups, and the spike
//! trigger is only meaningful for groups which were ignored when it arrived.
mod evaluator;
mod notifier;
mod queue;

pub use evaluator::{debounce_interval, should_notify, SpikeStats, Trigger};
pub use notifier::{
    spawn_workers, MessageSender, Notifier, Outcome, Sender, TestNotificationError,
};
pub use queue::{NotificationJob, NotificationQueue};
