use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use models::{
    Environment, EnvironmentId, EnvironmentSettings, ErrorGroup, GroupId, GroupStatus,
    IngestContext, LogId, NewErrorEvent, NotificationSettings, ProjectId, StatusChange,
    TelegramSettings, Triggers,
};
use notifications::DeliveryError;
use tracker_sql::NotificationClaim;

use crate::alerts::MessageSender;
use crate::{RecordedOccurrence, Store};

/// Telegram settings addressed to a test chat, with the given triggers enabled.
pub fn telegram(triggers: Triggers) -> NotificationSettings {
    NotificationSettings {
        telegram: TelegramSettings {
            enabled: true,
            bot_token: "123456:test-token".to_string(),
            chat_id: "-1001234".to_string(),
            triggers,
        },
    }
}

struct StoredLog {
    group_id: GroupId,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    environments: BTreeMap<EnvironmentId, Environment>,
    groups: BTreeMap<GroupId, ErrorGroup>,
    logs: Vec<StoredLog>,
    next_id: i64,
}

/// In-memory `Store` with a manually advanced clock.
pub struct TestStore {
    state: Mutex<State>,
    time: Mutex<DateTime<Utc>>,
    fail_writes: AtomicBool,
}

impl TestStore {
    pub fn new() -> TestStore {
        TestStore {
            state: Mutex::new(State::default()),
            time: Mutex::new(Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.time.lock().unwrap() += by;
    }

    /// Makes subsequent occurrence writes fail without effect.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Adds an active environment to project 1, with API key `key-<name>`.
    pub fn add_environment(&self, name: &str, notifications: NotificationSettings) -> Environment {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;

        let environment = Environment {
            id: EnvironmentId::new(state.next_id),
            project_id: ProjectId::new(1),
            name: name.to_string(),
            api_key: format!("key-{name}"),
            is_active: true,
            settings: EnvironmentSettings { notifications },
        };
        state
            .environments
            .insert(environment.id, environment.clone());
        environment
    }

    pub fn deactivate(&self, environment_id: EnvironmentId) {
        let mut state = self.state.lock().unwrap();
        if let Some(env) = state.environments.get_mut(&environment_id) {
            env.is_active = false;
        }
    }

    /// Records an occurrence of `message` at the current time.
    pub async fn ingest(&self, env: &Environment, message: &str) -> RecordedOccurrence {
        let event = NewErrorEvent {
            message: message.to_string(),
            ..Default::default()
        };
        let print = fingerprint::fingerprint(message, "", "");
        self.record_occurrence(env.context(), &print, &event, self.current_time())
            .await
            .unwrap()
    }

    pub fn group(&self, group_id: GroupId) -> ErrorGroup {
        self.state.lock().unwrap().groups[&group_id].clone()
    }

    pub fn set_status(&self, group_id: GroupId, status: GroupStatus) {
        let mut state = self.state.lock().unwrap();
        if let Some(group) = state.groups.get_mut(&group_id) {
            group.status = status;
        }
    }

    pub fn change_status(&self, group_id: GroupId, change: StatusChange) {
        let now = self.current_time();
        let mut state = self.state.lock().unwrap();
        if let Some(group) = state.groups.get_mut(&group_id) {
            group.apply(change, now);
        }
    }

    pub fn log_count(&self) -> usize {
        self.state.lock().unwrap().logs.len()
    }
}

#[async_trait::async_trait]
impl Store for TestStore {
    fn current_time(&self) -> DateTime<Utc> {
        *self.time.lock().unwrap()
    }

    async fn resolve_api_key(&self, api_key: &str) -> anyhow::Result<Option<IngestContext>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .environments
            .values()
            .find(|env| env.is_active && env.api_key == api_key)
            .map(Environment::context))
    }

    async fn record_occurrence(
        &self,
        ctx: IngestContext,
        fingerprint: &str,
        event: &NewErrorEvent,
        seen_at: DateTime<Utc>,
    ) -> anyhow::Result<RecordedOccurrence> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("connection reset by peer");
        }
        let now = self.current_time();
        let mut state = self.state.lock().unwrap();

        let existing = state
            .groups
            .values()
            .find(|g| {
                g.project_id == ctx.project_id
                    && g.environment_id == ctx.environment_id
                    && g.fingerprint == fingerprint
            })
            .map(|g| g.id);

        let (group_id, prior_status, occurrence_count) = match existing {
            Some(group_id) => {
                let group = state
                    .groups
                    .get_mut(&group_id)
                    .expect("group was just found");
                let prior = group.record_occurrence(seen_at);
                (group_id, Some(prior), group.occurrence_count)
            }
            None => {
                state.next_id += 1;
                let group_id = GroupId::new(state.next_id);
                state.groups.insert(
                    group_id,
                    ErrorGroup {
                        id: group_id,
                        project_id: ctx.project_id,
                        environment_id: ctx.environment_id,
                        fingerprint: fingerprint.to_string(),
                        message: event.message.clone(),
                        stack: event.stack.clone(),
                        url: event.url.clone(),
                        source: event.source,
                        level: event.level,
                        first_seen: seen_at,
                        last_seen: seen_at,
                        occurrence_count: 1,
                        status: GroupStatus::Unresolved,
                        resolved_at: None,
                        resolved_by: None,
                        last_notified_at: None,
                        notification_count: 0,
                        created_at: now,
                    },
                );
                (group_id, None, 1)
            }
        };

        state.next_id += 1;
        let log_id = LogId::new(state.next_id);
        state.logs.push(StoredLog {
            group_id,
            created_at: now,
        });

        Ok(RecordedOccurrence {
            group_id,
            log_id,
            occurrence_count,
            prior_status,
        })
    }

    async fn fetch_group(&self, group_id: GroupId) -> anyhow::Result<Option<ErrorGroup>> {
        Ok(self.state.lock().unwrap().groups.get(&group_id).cloned())
    }

    async fn fetch_environment(
        &self,
        environment_id: EnvironmentId,
    ) -> anyhow::Result<Option<Environment>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .environments
            .get(&environment_id)
            .cloned())
    }

    async fn count_occurrences_since(
        &self,
        group_id: GroupId,
        since: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let state = self.state.lock().unwrap();
        let count = state
            .logs
            .iter()
            .filter(|log| log.group_id == group_id && log.created_at >= since)
            .count();
        Ok(count as i64)
    }

    async fn claim_notification(
        &self,
        group_id: GroupId,
        now: DateTime<Utc>,
        interval: chrono::Duration,
    ) -> anyhow::Result<Option<NotificationClaim>> {
        let mut state = self.state.lock().unwrap();
        let Some(group) = state.groups.get_mut(&group_id) else {
            return Ok(None);
        };
        if group.notified_within(now, interval) {
            return Ok(None);
        }

        let previous = group.last_notified_at.replace(now);
        group.notification_count += 1;

        Ok(Some(NotificationClaim {
            group_id,
            claimed_at: now,
            previous,
        }))
    }

    async fn release_notification(&self, claim: &NotificationClaim) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(group) = state.groups.get_mut(&claim.group_id) {
            if group.last_notified_at == Some(claim.claimed_at) {
                group.last_notified_at = claim.previous;
                group.notification_count = (group.notification_count - 1).max(0);
            }
        }
        Ok(())
    }
}

/// `MessageSender` which records messages, or fails them on demand.
#[derive(Clone, Default)]
pub struct RecordingSender {
    sent: Arc<Mutex<Vec<(String, String)>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingSender {
    /// Sent messages as (chat_id, text) pairs.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_with_chat_not_found(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }
}

impl MessageSender for RecordingSender {
    async fn send<'s>(
        &'s self,
        chat: &'s TelegramSettings,
        text: String,
    ) -> Result<(), DeliveryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::ChatNotFound);
        }
        self.sent.lock().unwrap().push((chat.chat_id.clone(), text));
        Ok(())
    }
}
