// Worker pool: runs backlog jobs against the search provider

use crate::config;
use crate::errors::{ProviderError, WorkerError};
use crate::models::{Item, Job, Notification};
use crate::notifier::dedup::{self, DedupDecision};
use crate::provider::{SearchArgs, SearchProvider};
use crate::queue::BoundedQueue;
use crate::store::UserStore;
use crate::telemetry;
use futures::future::join_all;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, instrument, Instrument};

/// Configuration for the worker pool
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent workers
    pub concurrency: usize,
    /// Lower bound of the pause after each job
    pub min_delay: Duration,
    /// Upper bound of the pause after each job
    pub max_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            min_delay: Duration::from_millis(10_000),
            max_delay: Duration::from_millis(15_000),
        }
    }
}

impl From<&config::WorkerConfig> for WorkerConfig {
    fn from(settings: &config::WorkerConfig) -> Self {
        Self {
            concurrency: settings.concurrency,
            min_delay: Duration::from_millis(settings.min_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }
}

/// Pool of workers turning backlog jobs into queued notifications
pub struct SearchWorker {
    config: WorkerConfig,
    store: Arc<dyn UserStore>,
    provider: Arc<dyn SearchProvider>,
    backlog: BoundedQueue<Job>,
    notifications: BoundedQueue<Notification>,
    shutdown_tx: broadcast::Sender<()>,
}

impl SearchWorker {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn UserStore>,
        provider: Arc<dyn SearchProvider>,
        backlog: BoundedQueue<Job>,
        notifications: BoundedQueue<Notification>,
    ) -> Self {
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

        Self {
            config,
            store,
            provider,
            backlog,
            notifications,
            shutdown_tx,
        }
    }

    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Build provider arguments: the search radius wins over the user default, 0 means unbounded
    pub fn resolve_args(job: &Job) -> SearchArgs {
        let radius_km = job
            .search
            .radius_km
            .filter(|radius| *radius > 0)
            .or_else(|| Some(job.user.radius_km).filter(|radius| *radius > 0));
        let (latitude, longitude) = job.user.location();

        SearchArgs {
            keywords: job.search.keywords.clone(),
            min_price: job.search.min_price,
            max_price: job.search.max_price,
            radius_m: radius_km.map(|km| km.saturating_mul(1000)),
            latitude,
            longitude,
            strict: job.search.strict,
            no_zero: job.search.no_zero,
        }
    }

    /// Run one job and enqueue a notification for every new or cheaper match.
    ///
    /// Returns the number of notifications enqueued.
    #[instrument(skip(self, job), fields(user_id = job.user.id, keywords = %job.search.keywords))]
    pub async fn process_job(&self, job: &Job) -> Result<usize, WorkerError> {
        let args = Self::resolve_args(job);
        let (searched, elapsed) = self.timed_search(&args).await;
        telemetry::record_search_duration(elapsed.as_secs_f64());
        let items = searched?;

        let ceiling = f64::from(job.search.max_price);
        let found = items.len();
        let candidates: Vec<_> = items.into_iter().filter(|item| item.price <= ceiling).collect();

        if candidates.is_empty() {
            debug!(found, "No results under the price ceiling");
            return Ok(0);
        }

        // Enqueue-time dedup check against the current stored state
        let signature = &job.signature;
        let current = self.store.get_user(job.user.id).await?;
        let Some(saved) = current.searches.get(signature) else {
            debug!("Saved search deleted since refill, dropping results");
            return Ok(0);
        };

        let fresh: Vec<_> = candidates
            .into_iter()
            .filter(|item| dedup::check(saved, &item.id, item.price) == DedupDecision::Deliver)
            .collect();

        let user = Arc::new(current);
        let enqueued = fresh.len();
        for item in fresh {
            self.notifications
                .push(Notification {
                    user: Arc::clone(&user),
                    item,
                    search: signature.clone(),
                })
                .await?;
        }

        debug!(found, enqueued, "Search job processed");
        Ok(enqueued)
    }

    /// Provider call and the time it took, paging included
    async fn timed_search(&self, args: &SearchArgs) -> (Result<Vec<Item>, ProviderError>, Duration) {
        let started = Instant::now();
        let searched = self.provider.search(args).await;
        (searched, started.elapsed())
    }

    /// Pause drawn uniformly from the configured delay range
    pub fn jitter_delay(&self) -> Duration {
        let min = self.config.min_delay.as_millis() as u64;
        let max = (self.config.max_delay.as_millis() as u64).max(min);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    async fn run(&self, worker_id: usize) {
        let mut shutdown_rx = self.shutdown_receiver();
        debug!(worker_id, "Worker started");

        loop {
            let job = tokio::select! {
                next = self.backlog.pop() => match next {
                    Ok(job) => job,
                    Err(e) => {
                        error!(worker_id, error = %e, "Backlog closed");
                        break;
                    }
                },
                _ = shutdown_rx.recv() => break,
            };

            let result = tokio::select! {
                result = self.process_job(&job) => result,
                _ = shutdown_rx.recv() => break,
            };

            match result {
                Ok(enqueued) => {
                    telemetry::record_search_job("ok");
                    if enqueued > 0 {
                        info!(
                            worker_id,
                            user_id = job.user.id,
                            keywords = %job.search.keywords,
                            enqueued,
                            "Matches enqueued"
                        );
                    }
                }
                Err(e) => {
                    telemetry::record_search_job(e.kind());
                    error!(
                        worker_id,
                        user_id = job.user.id,
                        keywords = %job.search.keywords,
                        error = %e,
                        "Search job failed"
                    );
                }
            }

            tokio::select! {
                _ = sleep(self.jitter_delay()) => {}
                _ = shutdown_rx.recv() => break,
            }
        }

        debug!(worker_id, "Worker stopped");
    }

    /// Run the configured number of workers until stopped
    #[instrument(skip(self))]
    pub async fn start(self: Arc<Self>) {
        let concurrency = self.config.concurrency.max(1);
        info!(concurrency, "Starting search workers");

        let handles: Vec<_> = (0..concurrency)
            .map(|worker_id| {
                let worker = Arc::clone(&self);
                tokio::spawn(
                    async move { worker.run(worker_id).await }
                        .instrument(tracing::info_span!("search_worker", worker_id)),
                )
            })
            .collect();

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Worker task panicked");
            }
        }

        info!("Search workers stopped");
    }

    pub fn stop(&self) {
        info!("Stopping search workers");
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SavedSearch, SearchSpec, User, DEFAULT_LATITUDE, DEFAULT_LONGITUDE};
    use crate::provider::MockSearchProvider;
    use crate::store::MemoryUserStore;

    fn item(id: &str, price: f64) -> Item {
        Item {
            id: id.to_string(),
            title: format!("Bike {}", id),
            description: String::new(),
            price,
            currency: "EUR".to_string(),
            slug: id.to_lowercase(),
        }
    }

    fn bike_user() -> User {
        let mut user = User::new(1, "alice", 10);
        user.radius_km = 15;
        user.searches.set(SavedSearch::new(SearchSpec::new("bike", 200)));
        user
    }

    fn job_for(user: &User) -> Job {
        Job::new(Arc::new(user.clone()), SearchSpec::new("bike", 200))
    }

    fn worker(store: Arc<MemoryUserStore>, provider: MockSearchProvider) -> SearchWorker {
        SearchWorker::new(
            WorkerConfig {
                concurrency: 1,
                min_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(20),
            },
            store,
            Arc::new(provider),
            BoundedQueue::new("backlog", 8),
            BoundedQueue::new("notifications", 8),
        )
    }

    #[test]
    fn test_resolve_args_uses_user_defaults() {
        let user = bike_user();
        let args = SearchWorker::resolve_args(&job_for(&user));

        assert_eq!(args.radius_m, Some(15_000));
        assert_eq!((args.latitude, args.longitude), (DEFAULT_LATITUDE, DEFAULT_LONGITUDE));
        assert_eq!(args.max_price, 200);
    }

    #[test]
    fn test_resolve_args_search_radius_wins() {
        let mut user = bike_user();
        user.latitude = 40.4;
        user.longitude = -3.7;
        let mut job = job_for(&user);
        job.search.radius_km = Some(3);

        let args = SearchWorker::resolve_args(&job);
        assert_eq!(args.radius_m, Some(3_000));
        assert_eq!((args.latitude, args.longitude), (40.4, -3.7));
    }

    #[test]
    fn test_resolve_args_unbounded_radius() {
        let mut user = bike_user();
        user.radius_km = 0;
        let args = SearchWorker::resolve_args(&job_for(&user));
        assert_eq!(args.radius_m, None);
    }

    #[tokio::test]
    async fn test_process_job_applies_ceiling_and_dedup() {
        let mut user = bike_user();
        user.searches
            .get_mut("bike")
            .unwrap()
            .sent_items
            .record("A", 150.0);
        let store = Arc::new(MemoryUserStore::with_users([user.clone()]));

        let mut provider = MockSearchProvider::new();
        provider
            .expect_search()
            .withf(|args| args.keywords == "bike" && args.radius_m == Some(15_000))
            .times(1)
            .returning(|_| Ok(vec![item("A", 150.0), item("B", 250.0), item("C", 120.0)]));

        let worker = worker(store, provider);
        let enqueued = worker.process_job(&job_for(&user)).await.unwrap();

        assert_eq!(enqueued, 1);
        let notification = worker.notifications.pop().await.unwrap();
        assert_eq!(notification.item.id, "C");
        assert_eq!(notification.search, "bike");
        assert!(worker.notifications.is_empty());
    }

    #[tokio::test]
    async fn test_process_job_price_drop_is_enqueued() {
        let mut user = bike_user();
        user.searches
            .get_mut("bike")
            .unwrap()
            .sent_items
            .record("A", 150.0);
        let store = Arc::new(MemoryUserStore::with_users([user.clone()]));

        let mut provider = MockSearchProvider::new();
        provider
            .expect_search()
            .returning(|_| Ok(vec![item("A", 140.0)]));

        let worker = worker(store, provider);
        assert_eq!(worker.process_job(&job_for(&user)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_process_job_deleted_search_enqueues_nothing() {
        let user = bike_user();
        let mut stored = user.clone();
        stored.searches.delete("bike");
        let store = Arc::new(MemoryUserStore::with_users([stored]));

        let mut provider = MockSearchProvider::new();
        provider
            .expect_search()
            .returning(|_| Ok(vec![item("A", 100.0)]));

        let worker = worker(store, provider);
        assert_eq!(worker.process_job(&job_for(&user)).await.unwrap(), 0);
        assert!(worker.notifications.is_empty());
    }

    #[tokio::test]
    async fn test_process_job_looks_up_the_stored_key() {
        let mut user = bike_user();
        user.searches = serde_json::from_value(serde_json::json!({
            "old bike": {
                "search": { "keywords": "bike", "max_price": 200 },
                "keywords": "old bike",
                "max_price": 200
            }
        }))
        .unwrap();
        let store = Arc::new(MemoryUserStore::with_users([user.clone()]));

        let mut provider = MockSearchProvider::new();
        provider
            .expect_search()
            .withf(|args| args.keywords == "bike")
            .returning(|_| Ok(vec![item("A", 150.0)]));

        let worker = worker(store, provider);
        let job = Job {
            user: Arc::new(user.clone()),
            signature: "old bike".to_string(),
            search: SearchSpec::new("bike", 200),
        };

        assert_eq!(worker.process_job(&job).await.unwrap(), 1);
        let notification = worker.notifications.pop().await.unwrap();
        assert_eq!(notification.search, "old bike");
    }

    #[tokio::test]
    async fn test_process_job_provider_error() {
        let user = bike_user();
        let store = Arc::new(MemoryUserStore::with_users([user.clone()]));

        let mut provider = MockSearchProvider::new();
        provider.expect_search().returning(|_| {
            Err(ProviderError::HttpStatus {
                status: 500,
                url: "/general/search".to_string(),
            })
        });

        let worker = worker(store, provider);
        let err = worker.process_job(&job_for(&user)).await.unwrap_err();
        assert_eq!(err.kind(), "http_status");
        assert!(worker.notifications.is_empty());
    }

    /// Provider that takes a fixed time to answer
    struct SlowProvider {
        latency: Duration,
    }

    #[async_trait::async_trait]
    impl SearchProvider for SlowProvider {
        async fn search(&self, _args: &SearchArgs) -> Result<Vec<Item>, ProviderError> {
            sleep(self.latency).await;
            Ok(vec![item("A", 150.0), item("C", 120.0)])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_search_measures_provider_latency() {
        let user = bike_user();
        let worker = SearchWorker::new(
            WorkerConfig::default(),
            Arc::new(MemoryUserStore::with_users([user.clone()])),
            Arc::new(SlowProvider {
                latency: Duration::from_secs(2),
            }),
            BoundedQueue::new("backlog", 1),
            BoundedQueue::new("notifications", 1),
        );

        let args = SearchWorker::resolve_args(&job_for(&user));
        let (searched, elapsed) = worker.timed_search(&args).await;

        assert_eq!(searched.unwrap().len(), 2);
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(3));
    }

    #[test]
    fn test_jitter_delay_within_bounds() {
        let worker = worker(Arc::new(MemoryUserStore::new()), MockSearchProvider::new());
        for _ in 0..100 {
            let delay = worker.jitter_delay();
            assert!(delay >= Duration::from_millis(10));
            assert!(delay <= Duration::from_millis(20));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_drains_backlog_until_stopped() {
        let user = bike_user();
        let store = Arc::new(MemoryUserStore::with_users([user.clone()]));

        let mut provider = MockSearchProvider::new();
        provider
            .expect_search()
            .times(2)
            .returning(|_| Ok(vec![item("C", 120.0)]));

        let worker = Arc::new(worker(store, provider));
        worker.backlog.push(job_for(&user)).await.unwrap();
        worker.backlog.push(job_for(&user)).await.unwrap();

        let handle = tokio::spawn(Arc::clone(&worker).start());
        sleep(Duration::from_secs(1)).await;

        assert!(worker.backlog.is_empty());
        assert_eq!(worker.notifications.len(), 2);

        worker.stop();
        handle.await.unwrap();
    }
}
