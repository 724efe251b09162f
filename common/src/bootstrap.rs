// Bootstrap utilities for binary initialization

use crate::config::{Settings, SinkKind, StoreBackend};
use crate::db::DbPool;
use crate::notifier::{LogNotificationSink, NotificationSink, TelegramSink};
use crate::provider::{HttpSearchProvider, SearchProvider};
use crate::store::{MemoryUserStore, PostgresUserStore, UserStore};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Initialized user store plus the pool to close on shutdown, if any
pub struct StoreHandle {
    pub store: Arc<dyn UserStore>,
    pub db_pool: Option<DbPool>,
}

/// Initialize the configured user store backend
///
/// # Errors
/// Returns error if the seed file cannot be read or the database is unreachable
#[tracing::instrument(skip(settings), fields(backend = ?settings.store.backend))]
pub async fn init_store(settings: &Settings) -> Result<StoreHandle> {
    match settings.store.backend {
        StoreBackend::Memory => {
            let store = match &settings.store.seed_path {
                Some(path) => MemoryUserStore::from_seed_file(path)
                    .await
                    .with_context(|| format!("Failed to seed user store from {}", path.display()))?,
                None => MemoryUserStore::new(),
            };

            info!("Memory user store initialized");
            Ok(StoreHandle {
                store: Arc::new(store),
                db_pool: None,
            })
        }
        StoreBackend::Postgres => {
            let db_pool = init_database_pool(settings).await?;
            let store = PostgresUserStore::new(db_pool.clone());
            store
                .init_schema()
                .await
                .context("Failed to initialize user store schema")?;

            info!("PostgreSQL user store initialized");
            Ok(StoreHandle {
                store: Arc::new(store),
                db_pool: Some(db_pool),
            })
        }
    }
}

/// Initialize database pool
///
/// # Errors
/// Returns error if database pool initialization fails
#[tracing::instrument(skip(settings))]
pub async fn init_database_pool(settings: &Settings) -> Result<DbPool> {
    info!("Initializing database pool");

    let db_pool = DbPool::connect(&settings.database)
        .await
        .context("Failed to initialize database pool")?;

    info!("Database pool initialized");
    Ok(db_pool)
}

/// Initialize the marketplace search provider
pub fn init_provider(settings: &Settings) -> Result<Arc<dyn SearchProvider>> {
    let provider = HttpSearchProvider::new(&settings.provider)
        .context("Failed to initialize search provider")?;

    info!(
        base_url = %settings.provider.base_url,
        max_pages = settings.provider.max_pages,
        "Search provider initialized"
    );
    Ok(Arc::new(provider))
}

/// Initialize the configured notification sink
pub fn init_sink(settings: &Settings) -> Result<Arc<dyn NotificationSink>> {
    let sink: Arc<dyn NotificationSink> = match settings.notifier.sink {
        SinkKind::Log => Arc::new(LogNotificationSink),
        SinkKind::Telegram => Arc::new(
            TelegramSink::from_config(&settings.notifier)
                .context("Failed to initialize Telegram sink")?,
        ),
    };

    info!(sink = ?settings.notifier.sink, "Notification sink initialized");
    Ok(sink)
}
