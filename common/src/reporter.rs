// Periodic metrics reporter for queue fill levels and store size

use crate::errors::StoreError;
use crate::models::{Job, Notification};
use crate::queue::{BoundedQueue, QueueStats};
use crate::store::{StoreStats, UserStore};
use crate::telemetry::{self, BACKLOG_METRIC, NOTIFICATION_QUEUE_METRIC};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

/// Publishes store gauges every interval and queue gauges four times as often
pub struct MetricsReporter {
    interval: Duration,
    store: Arc<dyn UserStore>,
    backlog: BoundedQueue<Job>,
    notifications: BoundedQueue<Notification>,
    shutdown_tx: broadcast::Sender<()>,
}

impl MetricsReporter {
    pub fn new(
        interval: Duration,
        store: Arc<dyn UserStore>,
        backlog: BoundedQueue<Job>,
        notifications: BoundedQueue<Notification>,
    ) -> Self {
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

        Self {
            interval,
            store,
            backlog,
            notifications,
            shutdown_tx,
        }
    }

    /// Scan the store and publish user, search and notified-item counts
    pub async fn report_store(&self) -> Result<StoreStats, StoreError> {
        let stats = self.store.stats().await?;
        telemetry::update_store_gauges(stats);
        debug!(
            users = stats.users,
            searches = stats.searches,
            notified_items = stats.notified_items,
            "Store stats reported"
        );
        Ok(stats)
    }

    /// Publish depth and capacity of both queues
    pub fn report_queues(&self) -> (QueueStats, QueueStats) {
        let backlog = self.backlog.stats();
        let notifications = self.notifications.stats();
        telemetry::update_queue_gauges(BACKLOG_METRIC, backlog);
        telemetry::update_queue_gauges(NOTIFICATION_QUEUE_METRIC, notifications);
        (backlog, notifications)
    }

    #[instrument(skip(self))]
    pub async fn start(&self) {
        let queue_period = (self.interval / 4).max(Duration::from_millis(1));
        info!(
            store_interval_seconds = self.interval.as_secs(),
            queue_interval_ms = queue_period.as_millis() as u64,
            "Starting metrics reporter"
        );

        let mut store_tick = interval(self.interval.max(Duration::from_millis(1)));
        let mut queue_tick = interval(queue_period);
        store_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        queue_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                _ = store_tick.tick() => {
                    if let Err(e) = self.report_store().await {
                        warn!(error = %e, "Failed to collect store stats");
                    }
                }
                _ = queue_tick.tick() => {
                    self.report_queues();
                }
                _ = shutdown_rx.recv() => break,
            }
        }

        info!("Metrics reporter stopped");
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SavedSearch, SearchSpec, User};
    use crate::store::MemoryUserStore;

    fn reporter(store: MemoryUserStore) -> MetricsReporter {
        MetricsReporter::new(
            Duration::from_secs(20),
            Arc::new(store),
            BoundedQueue::new("backlog", 128),
            BoundedQueue::new("notifications", 64),
        )
    }

    #[tokio::test]
    async fn test_report_store_counts() {
        let mut user = User::new(1, "alice", 10);
        let mut saved = SavedSearch::new(SearchSpec::new("bike", 200));
        saved.sent_items.record("A", 150.0);
        saved.sent_items.record("B", 90.0);
        user.searches.set(saved);

        let stats = reporter(MemoryUserStore::with_users([user]))
            .report_store()
            .await
            .unwrap();

        assert_eq!(
            stats,
            StoreStats {
                users: 1,
                searches: 1,
                notified_items: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_report_queues_snapshot() {
        let reporter = reporter(MemoryUserStore::new());
        reporter
            .backlog
            .push(Job::new(
                Arc::new(User::new(1, "alice", 10)),
                SearchSpec::new("bike", 200),
            ))
            .await
            .unwrap();

        let (backlog, notifications) = reporter.report_queues();
        assert_eq!(backlog, QueueStats { depth: 1, capacity: 128 });
        assert_eq!(notifications, QueueStats { depth: 0, capacity: 64 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_on_shutdown() {
        let reporter = Arc::new(reporter(MemoryUserStore::new()));
        let runner = Arc::clone(&reporter);
        let handle = tokio::spawn(async move { runner.start().await });

        tokio::time::sleep(Duration::from_secs(45)).await;
        reporter.stop();
        handle.await.unwrap();
    }
}
