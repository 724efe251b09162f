// Searcher binary entry point: refill loop, worker pool, dispatcher and metrics reporter

use anyhow::{anyhow, Context, Result};
use common::bootstrap;
use common::config::Settings;
use common::models::{Job, Notification};
use common::notifier::NotificationDispatcher;
use common::queue::BoundedQueue;
use common::reporter::MetricsReporter;
use common::scheduler::{RefillScheduler, Scheduler, SchedulerConfig};
use common::telemetry;
use common::worker::{SearchWorker, WorkerConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;
    settings
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;

    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.tracing_endpoint.as_deref(),
    )?;
    telemetry::init_metrics(settings.observability.metrics_port)?;

    info!(
        store_backend = ?settings.store.backend,
        sink = ?settings.notifier.sink,
        provider = %settings.provider.base_url,
        "Starting pricewatch searcher"
    );

    let store_handle = bootstrap::init_store(&settings).await?;
    let store = Arc::clone(&store_handle.store);
    let provider = bootstrap::init_provider(&settings)?;
    let sink = bootstrap::init_sink(&settings)?;

    let backlog: BoundedQueue<Job> =
        BoundedQueue::new("searches_backlog", settings.scheduler.backlog_capacity);
    let notifications: BoundedQueue<Notification> =
        BoundedQueue::new("notifications", settings.notifier.queue_capacity);

    let scheduler = Arc::new(RefillScheduler::new(
        SchedulerConfig::from(&settings.scheduler),
        Arc::clone(&store),
        backlog.clone(),
    ));
    let workers = Arc::new(SearchWorker::new(
        WorkerConfig::from(&settings.worker),
        Arc::clone(&store),
        provider,
        backlog.clone(),
        notifications.clone(),
    ));
    let dispatcher = Arc::new(NotificationDispatcher::new(
        Arc::clone(&store),
        sink,
        notifications.clone(),
    ));
    let reporter = Arc::new(MetricsReporter::new(
        Duration::from_secs(settings.observability.metrics_interval_seconds),
        Arc::clone(&store),
        backlog,
        notifications,
    ));

    let worker_task = tokio::spawn(Arc::clone(&workers).start());
    let dispatcher_task = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.start().await })
    };
    let reporter_task = {
        let reporter = Arc::clone(&reporter);
        tokio::spawn(async move { reporter.start().await })
    };

    // Handle SIGINT by stopping every component
    {
        let scheduler = Arc::clone(&scheduler);
        let workers = Arc::clone(&workers);
        let dispatcher = Arc::clone(&dispatcher);
        let reporter = Arc::clone(&reporter);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
                return;
            }
            info!("Received Ctrl+C signal, initiating graceful shutdown");
            if let Err(e) = scheduler.stop().await {
                error!(error = %e, "Error during scheduler shutdown");
            }
            workers.stop();
            dispatcher.stop();
            reporter.stop();
        });
    }

    info!("Starting refill loop");
    if let Err(e) = scheduler.start().await {
        error!(error = %e, "Scheduler error");
    }

    for (name, task) in [
        ("workers", worker_task),
        ("dispatcher", dispatcher_task),
        ("reporter", reporter_task),
    ] {
        if let Err(e) = task.await {
            error!(task = name, error = %e, "Task failed to shut down cleanly");
        }
    }

    if let Some(db_pool) = store_handle.db_pool {
        db_pool.close().await;
    }
    telemetry::shutdown_tracer();

    info!("Searcher stopped");
    Ok(())
}
