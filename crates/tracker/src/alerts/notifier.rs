use std::sync::Arc;

use anyhow::Context;
use models::{Environment, ErrorGroup, TelegramSettings};
use notifications::{
    DeliveryError, ErrorAlert, Notification, Renderer, SpikeAlert, TelegramClient,
    ThresholdReached,
};

use super::evaluator::{self, Trigger, SPIKE_FACTOR};
use super::queue::{NotificationJob, NotificationQueue};
use crate::Store;

pub trait MessageSender: Send + Sync + 'static {
    fn send<'s>(
        &'s self,
        chat: &'s TelegramSettings,
        text: String,
    ) -> impl std::future::Future<Output = Result<(), DeliveryError>> + Send + 's;
}

#[derive(Debug)]
pub enum Sender {
    /// Logs messages instead of sending them.
    Disabled,
    Telegram(TelegramClient),
}

impl MessageSender for Sender {
    async fn send<'s>(
        &'s self,
        chat: &'s TelegramSettings,
        text: String,
    ) -> Result<(), DeliveryError> {
        match self {
            Sender::Disabled => {
                tracing::warn!(chat_id = %chat.chat_id, %text, "skipping sending alert (disabled)");
                Ok(())
            }
            Sender::Telegram(client) => {
                client
                    .send_message(&chat.bot_token, &chat.chat_id, &text)
                    .await
            }
        }
    }
}

/// What became of a notification job.
#[derive(Debug)]
pub enum Outcome {
    Sent(Trigger),
    NotTriggered,
    /// A trigger held, but the group was notified about too recently.
    Debounced(Trigger),
    /// The group or its environment no longer exists.
    Missing,
    Failed(DeliveryError),
}

#[derive(Debug, thiserror::Error)]
pub enum TestNotificationError {
    #[error("telegram notifications are not configured for this environment")]
    NotConfigured,
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error(transparent)]
    Render(#[from] anyhow::Error),
}

pub struct Notifier<S> {
    store: Arc<dyn Store>,
    renderer: Renderer,
    sender: S,
}

impl<S: MessageSender> Notifier<S> {
    pub fn new(
        store: Arc<dyn Store>,
        dashboard_base_url: impl Into<String>,
        sender: S,
    ) -> anyhow::Result<Notifier<S>> {
        let renderer = Renderer::try_new(dashboard_base_url.into())?;
        Ok(Notifier {
            store,
            renderer,
            sender,
        })
    }

    /// Evaluates a recorded occurrence and sends at most one alert about it.
    ///
    /// The notification slot of the group is claimed before sending, which
    /// enforces the debounce interval across concurrent workers. A claim whose
    /// message can't be delivered is released, so delivery failures don't
    /// count as notifications.
    #[tracing::instrument(level = "debug", skip(self), fields(group_id = %job.group_id))]
    pub async fn process(&self, job: NotificationJob) -> anyhow::Result<Outcome> {
        let Some(mut group) = self.store.fetch_group(job.group_id).await? else {
            tracing::warn!("error group of notification job not found");
            return Ok(Outcome::Missing);
        };
        // Later occurrences may have been recorded while the job was queued.
        // Evaluate the group as it was right after this job's occurrence.
        group.occurrence_count = job.occurrence_count;
        let Some(environment) = self.store.fetch_environment(job.environment_id).await? else {
            tracing::warn!(environment_id = %job.environment_id, "environment of notification job not found");
            return Ok(Outcome::Missing);
        };
        let now = self.store.current_time();

        let trigger = evaluator::should_notify(
            self.store.as_ref(),
            &group,
            job.prior_status,
            &environment.settings.notifications,
            now,
        )
        .await
        .context("evaluating notification triggers")?;

        let Some(trigger) = trigger else {
            return Ok(Outcome::NotTriggered);
        };

        let Some(claim) = self
            .store
            .claim_notification(group.id, now, evaluator::debounce_interval())
            .await
            .context("claiming notification")?
        else {
            tracing::debug!(trigger = trigger.name(), "group was notified recently, skipping");
            return Ok(Outcome::Debounced(trigger));
        };

        let notification = self.notification_for(&group, &environment, &trigger);
        let result = match self.renderer.render(&notification) {
            Ok(text) => {
                self.sender
                    .send(&environment.settings.notifications.telegram, text)
                    .await
            }
            Err(err) => {
                self.store.release_notification(&claim).await?;
                return Err(err);
            }
        };

        match result {
            Ok(()) => {
                tracing::info!(
                    trigger = trigger.name(),
                    environment = %environment.name,
                    occurrence_count = group.occurrence_count,
                    "sent error notification"
                );
                Ok(Outcome::Sent(trigger))
            }
            Err(err) => {
                self.store
                    .release_notification(&claim)
                    .await
                    .context("releasing notification claim")?;
                tracing::warn!(
                    trigger = trigger.name(),
                    category = err.category(),
                    error = %err,
                    "failed to deliver error notification"
                );
                Ok(Outcome::Failed(err))
            }
        }
    }

    /// Sends a test message to the environment's configured channel.
    pub async fn send_test(&self, environment: &Environment) -> Result<(), TestNotificationError> {
        let telegram = &environment.settings.notifications.telegram;
        if !telegram.is_configured() {
            return Err(TestNotificationError::NotConfigured);
        }
        let text = self.renderer.render(&Notification::Test {
            environment: environment.name.clone(),
        })?;
        self.sender.send(telegram, text).await?;

        tracing::info!(environment_id = %environment.id, "sent test notification");
        Ok(())
    }

    fn notification_for(
        &self,
        group: &ErrorGroup,
        environment: &Environment,
        trigger: &Trigger,
    ) -> Notification {
        match trigger {
            Trigger::IgnoredSpike(stats) => Notification::IgnoredSpike(SpikeAlert {
                project_id: group.project_id,
                group_id: group.id,
                environment: environment.name.clone(),
                message: group.message.clone(),
                occurrence_count: group.occurrence_count,
                last_5m: stats.last_5m,
                last_60m: stats.last_60m,
                factor: SPIKE_FACTOR,
            }),
            Trigger::NewError | Trigger::Threshold { .. } => {
                let threshold = match trigger {
                    Trigger::Threshold {
                        count,
                        window_minutes,
                    } => Some(ThresholdReached {
                        count: *count,
                        window_minutes: *window_minutes,
                    }),
                    _ => None,
                };
                Notification::Error(ErrorAlert {
                    project_id: group.project_id,
                    group_id: group.id,
                    environment: environment.name.clone(),
                    message: group.message.clone(),
                    level: group.level,
                    occurrence_count: group.occurrence_count,
                    first_seen: group.first_seen,
                    stack: group.stack.clone(),
                    threshold,
                })
            }
        }
    }
}

/// Starts `workers` tasks which process jobs until the queue is closed and drained.
pub fn spawn_workers<S: MessageSender>(
    notifier: Arc<Notifier<S>>,
    queue: Arc<NotificationQueue>,
    workers: usize,
) -> Vec<tokio::task::JoinHandle<()>> {
    (0..workers.max(1))
        .map(|worker| {
            let notifier = notifier.clone();
            let queue = queue.clone();

            tokio::spawn(async move {
                while let Some(job) = queue.pop().await {
                    if let Err(error) = notifier.process(job).await {
                        tracing::error!(
                            worker,
                            group_id = %job.group_id,
                            ?error,
                            "notification job failed"
                        );
                    }
                }
                tracing::debug!(worker, "notification worker exiting");
            })
        })
        .collect()
}
