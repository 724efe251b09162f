// Scheduler engine implementation

use crate::config;
use crate::errors::StoreError;
use crate::models::Job;
use crate::queue::BoundedQueue;
use crate::store::UserStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between the starts of two refill cycles
    pub refill_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refill_interval: Duration::from_secs(30 * 60),
        }
    }
}

impl From<&config::SchedulerConfig> for SchedulerConfig {
    fn from(settings: &config::SchedulerConfig) -> Self {
        Self {
            refill_interval: Duration::from_secs(settings.refill_interval_seconds),
        }
    }
}

/// Summary of one refill cycle
#[derive(Debug, Clone)]
pub struct RefillReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub jobs: usize,
}

/// Scheduler trait for backlog scheduling operations
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Start the refill loop
    async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Stop the scheduler gracefully
    async fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Enqueue one job per saved search, in random order
    async fn refill(&self) -> Result<RefillReport, Box<dyn std::error::Error + Send + Sync>>;
}

/// Time to wait before the next refill. Zero when no refill ran yet or the interval elapsed.
pub fn next_refill_delay(interval: Duration, since_last: Option<Duration>) -> Duration {
    match since_last {
        Some(elapsed) => interval.saturating_sub(elapsed),
        None => Duration::ZERO,
    }
}

/// Refill loop feeding the search backlog from a full store scan
pub struct RefillScheduler {
    config: SchedulerConfig,
    store: Arc<dyn UserStore>,
    backlog: BoundedQueue<Job>,
    shutdown_tx: broadcast::Sender<()>,
}

impl RefillScheduler {
    pub fn new(config: SchedulerConfig, store: Arc<dyn UserStore>, backlog: BoundedQueue<Job>) -> Self {
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

        Self {
            config,
            store,
            backlog,
            shutdown_tx,
        }
    }

    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Collect one job per saved search. Each job shares a snapshot of its user.
    ///
    /// A scan error discards everything collected so far.
    pub async fn collect_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let mut jobs = Vec::new();

        self.store
            .for_each_user(&mut |user| {
                let user = Arc::new(user);
                for (signature, saved) in user.searches.iter() {
                    jobs.push(Job {
                        user: Arc::clone(&user),
                        signature: signature.clone(),
                        search: saved.search.clone(),
                    });
                }
                Ok(())
            })
            .await?;

        Ok(jobs)
    }
}

#[async_trait]
impl Scheduler for RefillScheduler {
    #[instrument(skip(self))]
    async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(
            refill_interval_seconds = self.config.refill_interval.as_secs(),
            backlog_capacity = self.backlog.capacity(),
            "Starting refill scheduler"
        );

        let mut shutdown_rx = self.shutdown_receiver();
        let mut last_refill: Option<Instant> = None;

        loop {
            let delay = next_refill_delay(
                self.config.refill_interval,
                last_refill.map(|started| started.elapsed()),
            );
            debug!(delay_ms = delay.as_millis() as u64, "Waiting for next refill");

            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping scheduler");
                    break;
                }
            }

            // The interval counts from the start of a cycle, failed or not
            last_refill = Some(Instant::now());

            tokio::select! {
                result = self.refill() => {
                    match result {
                        Ok(report) => {
                            info!(
                                cycle_id = %report.cycle_id,
                                jobs = report.jobs,
                                "Refill cycle completed"
                            );
                        }
                        Err(e) => {
                            error!(error = %e, "Refill cycle failed");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received during refill, stopping scheduler");
                    break;
                }
            }
        }

        info!("Refill scheduler stopped");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!("Stopping refill scheduler");
        let _ = self.shutdown_tx.send(());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn refill(&self) -> Result<RefillReport, Box<dyn std::error::Error + Send + Sync>> {
        let report_id = Uuid::new_v4();
        let started_at = Utc::now();

        let mut jobs = match self.collect_jobs().await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(cycle_id = %report_id, error = %e, "Failed to scan saved searches");
                return Err(Box::new(e));
            }
        };

        jobs.shuffle(&mut rand::thread_rng());
        let total = jobs.len();
        debug!(cycle_id = %report_id, jobs = total, "Enqueueing refill batch");

        for job in jobs {
            self.backlog.push(job).await?;
        }

        Ok(RefillReport {
            cycle_id: report_id,
            started_at,
            jobs: total,
        })
    }
}
