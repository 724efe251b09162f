// Notification dispatcher: authoritative dedup check, delivery and commit

use crate::errors::{DispatchError, StoreError};
use crate::models::Notification;
use crate::notifier::dedup::{self, DedupDecision};
use crate::notifier::sink::NotificationSink;
use crate::queue::BoundedQueue;
use crate::store::UserStore;
use crate::telemetry;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

/// Final state of a dispatched notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    Suppressed,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Delivered => "delivered",
            DispatchOutcome::Suppressed => "suppressed",
        }
    }
}

/// Consumes the notification queue and delivers at most one message per (user, item, price)
pub struct NotificationDispatcher {
    store: Arc<dyn UserStore>,
    sink: Arc<dyn NotificationSink>,
    queue: BoundedQueue<Notification>,
    shutdown_tx: broadcast::Sender<()>,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn UserStore>,
        sink: Arc<dyn NotificationSink>,
        queue: BoundedQueue<Notification>,
    ) -> Self {
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

        Self {
            store,
            sink,
            queue,
            shutdown_tx,
        }
    }

    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Re-check a notification against the stored user, deliver it and record the price.
    ///
    /// The price is committed with a fresh read-modify-write after delivery. If the saved
    /// search disappeared in between, the commit fails and nothing is written.
    #[instrument(skip(self, notification), fields(
        user_id = notification.user.id,
        search = %notification.search,
        item_id = %notification.item.id,
        price = notification.item.price
    ))]
    pub async fn dispatch(&self, notification: &Notification) -> Result<DispatchOutcome, DispatchError> {
        let user_id = notification.user.id;
        let user = self.store.get_user(user_id).await?;

        let saved = user
            .searches
            .get(&notification.search)
            .ok_or_else(|| DispatchError::SearchDeleted {
                user_id,
                signature: notification.search.clone(),
            })?;

        if dedup::check(saved, &notification.item.id, notification.item.price) == DedupDecision::Suppress {
            debug!("Item already notified at this price or lower");
            return Ok(DispatchOutcome::Suppressed);
        }

        self.sink.deliver(notification).await?;

        let signature = notification.search.clone();
        let item_id = notification.item.id.clone();
        let price = notification.item.price;
        self.store
            .update_user(
                user_id,
                Box::new(move |user| {
                    let saved = user.searches.get_mut(&signature).ok_or_else(|| {
                        StoreError::SearchNotFound {
                            user_id,
                            signature: signature.clone(),
                        }
                    })?;
                    saved.sent_items.record(item_id, price);
                    Ok(())
                }),
            )
            .await?;

        info!("Notification delivered");
        Ok(DispatchOutcome::Delivered)
    }

    /// Run the dispatch loop until stopped
    #[instrument(skip(self))]
    pub async fn start(&self) {
        info!(queue_capacity = self.queue.capacity(), "Starting notification dispatcher");
        let mut shutdown_rx = self.shutdown_receiver();

        loop {
            tokio::select! {
                next = self.queue.pop() => {
                    let notification = match next {
                        Ok(notification) => notification,
                        Err(e) => {
                            warn!(error = %e, "Notification queue closed");
                            break;
                        }
                    };

                    match self.dispatch(&notification).await {
                        Ok(outcome) => telemetry::record_notification(outcome.as_str()),
                        Err(e) => {
                            error!(
                                user_id = notification.user.id,
                                search = %notification.search,
                                item_id = %notification.item.id,
                                error = %e,
                                "Dropping notification"
                            );
                            telemetry::record_notification(e.kind());
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping dispatcher");
                    break;
                }
            }
        }

        info!("Notification dispatcher stopped");
    }

    pub fn stop(&self) {
        info!("Stopping notification dispatcher");
        let _ = self.shutdown_tx.send(());
    }
}
