use std::collections::VecDeque;
use std::sync::Mutex;

use models::{EnvironmentId, GroupId, GroupStatus, ProjectId};

/// Work item for the notification workers: evaluate one recorded occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationJob {
    pub project_id: ProjectId,
    pub environment_id: EnvironmentId,
    pub group_id: GroupId,
    /// Occurrence count of the group right after this occurrence was recorded.
    pub occurrence_count: i64,
    /// Group status before the occurrence, or None if the occurrence created the group.
    pub prior_status: Option<GroupStatus>,
}

/// Bounded multi-consumer queue of notification jobs.
///
/// Pushing never blocks ingestion: when the queue is full, the oldest
/// pending job is dropped to make room. Workers wait in `pop` until a job is
/// available or the queue is closed and drained.
pub struct NotificationQueue {
    state: Mutex<QueueState>,
    notify: tokio::sync::Notify,
    capacity: usize,
}

struct QueueState {
    jobs: VecDeque<NotificationJob>,
    closed: bool,
    dropped: u64,
}

impl NotificationQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                jobs: VecDeque::with_capacity(capacity),
                closed: false,
                dropped: 0,
            }),
            notify: tokio::sync::Notify::new(),
            capacity,
        }
    }

    /// Enqueues a job, evicting the oldest job if the queue is full.
    /// Jobs pushed after `close` are discarded.
    pub fn push(&self, job: NotificationJob) {
        {
            let mut state = self.lock();
            if state.closed {
                tracing::debug!(group_id = %job.group_id, "notification queue is closed, discarding job");
                return;
            }
            if state.jobs.len() >= self.capacity {
                if let Some(evicted) = state.jobs.pop_front() {
                    state.dropped += 1;
                    tracing::warn!(
                        group_id = %evicted.group_id,
                        dropped = state.dropped,
                        capacity = self.capacity,
                        "notification queue is full, dropped oldest job"
                    );
                }
            }
            state.jobs.push_back(job);
        }
        self.notify.notify_one();
    }

    /// Waits for the next job. Returns None once the queue is closed and empty.
    pub async fn pop(&self) -> Option<NotificationJob> {
        loop {
            // Register interest before checking, so a push between the check
            // and the await isn't missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(job) = state.jobs.pop_front() {
                    return Some(job);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Stops accepting jobs and wakes all waiting workers.
    /// Jobs already queued are still handed out.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of jobs evicted because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        // A panic while holding the lock can't leave the state inconsistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    fn job(group: i64) -> NotificationJob {
        NotificationJob {
            project_id: ProjectId::new(1),
            environment_id: EnvironmentId::new(1),
            group_id: GroupId::new(group),
            occurrence_count: 1,
            prior_status: None,
        }
    }

    #[tokio::test]
    async fn test_full_queue_drops_oldest() {
        let queue = NotificationQueue::new(3);
        for group in 1..=5 {
            queue.push(job(group));
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 2);

        let mut popped = Vec::new();
        for _ in 0..3 {
            popped.push(queue.pop().await.unwrap().group_id.get());
        }
        assert_eq!(popped, vec![3, 4, 5]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let queue = NotificationQueue::new(8);
        queue.push(job(1));
        queue.close();
        queue.push(job(2));

        assert_eq!(queue.pop().await, Some(job(1)));
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test]
    async fn test_waiting_worker_is_woken() {
        let queue = Arc::new(NotificationQueue::new(8));

        let worker = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::task::yield_now().await;
        queue.push(job(7));

        let popped = tokio::time::timeout(std::time::Duration::from_secs(5), worker)
            .await
            .expect("worker is woken")
            .unwrap();
        assert_eq!(popped, Some(job(7)));

        let idle = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::task::yield_now().await;
        queue.close();
        assert_eq!(idle.await.unwrap(), None);
    }
}
