// Property-based tests for the backlog refill loop

use common::models::{SavedSearch, SearchSpec, User};
use common::queue::BoundedQueue;
use common::scheduler::{RefillScheduler, Scheduler, SchedulerConfig};
use common::store::MemoryUserStore;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn users_from(counts: &[usize]) -> Vec<User> {
    counts
        .iter()
        .enumerate()
        .map(|(index, count)| {
            let id = index as i64 + 1;
            let mut user = User::new(id, format!("user-{}", id), id);
            for n in 0..*count {
                user.searches
                    .set(SavedSearch::new(SearchSpec::new(format!("search {}", n), 100)));
            }
            user
        })
        .collect()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// **Feature: pricewatch, Property 6: Refill completeness**
///
/// *For any* set of users and saved searches, one refill enqueues exactly one job per
/// (user, saved search) pair.
#[test]
fn property_refill_completeness() {
    proptest!(ProptestConfig::with_cases(32), |(counts in prop::collection::vec(0usize..5, 0..8))| {
        let total: usize = counts.iter().sum();
        let rt = runtime();

        let seen = rt.block_on(async {
            let backlog = BoundedQueue::new("backlog", total.max(1));
            let scheduler = RefillScheduler::new(
                SchedulerConfig::default(),
                Arc::new(MemoryUserStore::with_users(users_from(&counts))),
                backlog.clone(),
            );

            let report = scheduler.refill().await.unwrap();
            assert_eq!(report.jobs, total);

            let mut seen = HashSet::new();
            for _ in 0..total {
                let job = backlog.pop().await.unwrap();
                seen.insert((job.user.id, job.signature.clone()));
            }
            assert!(backlog.is_empty());
            seen
        });

        prop_assert_eq!(seen.len(), total);
    });
}

/// **Feature: pricewatch, Property 7: Backlog backpressure**
///
/// *For any* backlog capacity smaller than the number of saved searches, the refill blocks
/// once the backlog is full, never exceeds capacity, and completes once consumers drain it.
#[test]
fn property_backlog_backpressure() {
    proptest!(ProptestConfig::with_cases(16), |(
        capacity in 1usize..6,
        extra in 1usize..10,
    )| {
        let total = capacity + extra;
        let rt = runtime();

        let (max_depth, enqueued) = rt.block_on(async {
            let backlog = BoundedQueue::new("backlog", capacity);
            let scheduler = Arc::new(RefillScheduler::new(
                SchedulerConfig::default(),
                Arc::new(MemoryUserStore::with_users(users_from(&[total]))),
                backlog.clone(),
            ));

            let runner = Arc::clone(&scheduler);
            let handle = tokio::spawn(async move {
                runner.refill().await.map(|report| report.jobs).map_err(|e| e.to_string())
            });

            tokio::time::sleep(Duration::from_millis(20)).await;
            let mut max_depth = backlog.len();
            assert!(!handle.is_finished(), "refill should wait for free space");

            for _ in 0..total {
                backlog.pop().await.unwrap();
                max_depth = max_depth.max(backlog.len());
                tokio::task::yield_now().await;
            }

            let enqueued = handle.await.unwrap().unwrap();
            (max_depth, enqueued)
        });

        prop_assert!(max_depth <= capacity);
        prop_assert_eq!(enqueued, total);
    });
}
