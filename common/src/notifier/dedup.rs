// Price-based notification deduplication

use crate::models::SavedSearch;

/// Whether a matching item should reach the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    Deliver,
    Suppress,
}

/// Suppress when the item was already notified at the same or a lower price
pub fn decide(previous: Option<f64>, price: f64) -> DedupDecision {
    match previous {
        Some(previous) if previous <= price => DedupDecision::Suppress,
        _ => DedupDecision::Deliver,
    }
}

/// Apply [`decide`] against the notification history of a saved search
pub fn check(saved: &SavedSearch, item_id: &str, price: f64) -> DedupDecision {
    decide(saved.sent_items.last_notified(item_id), price)
}
