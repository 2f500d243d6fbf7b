//! Reminds admins to record a result for fights that started a while
//! ago and still have no recorded winner.

use crate::error::EngineResult;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use wager_storage::Storage;
use wager_types::Fight;

const REMINDER_BATCH_LIMIT: i64 = 20;

/// The notification sink. Implemented by the daemon against whatever
/// chat surface is wired up; a failure to notify one admin must never
/// stop the others.
#[async_trait]
pub trait AdminNotifier: Send + Sync {
    async fn notify_result_needed(&self, admin_external_id: &str, fights: &[Fight]);
}

pub struct AdminReminder {
    storage: Arc<dyn Storage>,
    notifier: Arc<dyn AdminNotifier>,
    admin_external_ids: Vec<String>,
    grace_period: ChronoDuration,
}

impl AdminReminder {
    pub fn new(
        storage: Arc<dyn Storage>,
        notifier: Arc<dyn AdminNotifier>,
        admin_external_ids: Vec<String>,
        grace_period: Duration,
    ) -> Self {
        Self {
            storage,
            notifier,
            admin_external_ids,
            grace_period: ChronoDuration::from_std(grace_period).unwrap_or(ChronoDuration::minutes(15)),
        }
    }

    pub async fn run_once(&self) -> EngineResult<usize> {
        let started_before = Utc::now() - self.grace_period;
        let fights = self
            .storage
            .list_fights_awaiting_result(started_before, REMINDER_BATCH_LIMIT)
            .await?;
        if fights.is_empty() {
            return Ok(0);
        }
        for admin in &self.admin_external_ids {
            self.notifier.notify_result_needed(admin, &fights).await;
        }
        Ok(fights.len())
    }
}

pub struct AdminReminderLoop {
    reminder: Arc<AdminReminder>,
    interval: Duration,
}

impl AdminReminderLoop {
    pub fn new(reminder: Arc<AdminReminder>, interval: Duration) -> Self {
        Self { reminder, interval }
    }

    pub async fn run(self) {
        let mut ticker = interval(self.interval);
        loop {
            ticker.tick().await;
            match self.reminder.run_once().await {
                Ok(count) if count > 0 => {
                    tracing::info!(fights = count, "sent admin result reminder");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "admin reminder tick failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use wager_storage::InMemoryStorage;
    use wager_types::{FightStatus, FightUpsert};

    struct RecordingNotifier {
        calls: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl AdminNotifier for RecordingNotifier {
        async fn notify_result_needed(&self, admin_external_id: &str, fights: &[Fight]) {
            self.calls.lock().unwrap().push((admin_external_id.to_string(), fights.len()));
        }
    }

    #[tokio::test]
    async fn notifies_every_admin_once_per_tick() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        storage
            .upsert_fight(FightUpsert {
                external_id: Some("ext-1".into()),
                title: "Alpha vs Bravo".into(),
                participant1_name: "Alpha".into(),
                participant2_name: "Bravo".into(),
                image_url: None,
                description: None,
                starts_at: Some(Utc::now() - ChronoDuration::hours(1)),
                status: FightStatus::Live,
                winner_side: None,
            })
            .await
            .unwrap();
        let notifier = Arc::new(RecordingNotifier { calls: Mutex::new(Vec::new()) });
        let reminder = AdminReminder::new(
            storage,
            notifier.clone(),
            vec!["admin:1".into(), "admin:2".into()],
            Duration::from_secs(900),
        );

        let count = reminder.run_once().await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(notifier.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn skips_notification_when_nothing_is_due() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let notifier = Arc::new(RecordingNotifier { calls: Mutex::new(Vec::new()) });
        let reminder = AdminReminder::new(storage, notifier.clone(), vec!["admin:1".into()], Duration::from_secs(900));

        let count = reminder.run_once().await.unwrap();
        assert_eq!(count, 0);
        assert!(notifier.calls.lock().unwrap().is_empty());
    }
}
