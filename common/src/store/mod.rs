// User store: per-user reads, atomic read-modify-write and full scans

pub mod memory;
pub mod postgres;

use crate::errors::StoreError;
use crate::models::{User, UserId};
use async_trait::async_trait;

pub use memory::MemoryUserStore;
pub use postgres::PostgresUserStore;

/// Mutation applied to a user inside an atomic update. Returning an error discards it.
pub type UserMutation = Box<dyn FnOnce(&mut User) -> Result<(), StoreError> + Send>;

/// Visitor called once per user during a full scan. Returning an error aborts the scan.
pub type UserVisitor<'a> = dyn FnMut(User) -> Result<(), StoreError> + Send + 'a;

/// Aggregate counts over every stored user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub users: usize,
    pub searches: usize,
    pub notified_items: usize,
}

impl StoreStats {
    fn add_user(&mut self, user: &User) {
        self.users += 1;
        self.searches += user.searches.len();
        self.notified_items += user
            .searches
            .values()
            .map(|saved| saved.sent_items.len())
            .sum::<usize>();
    }
}

/// UserStore trait for persisted users and their saved searches
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Read the current persisted state of one user
    async fn get_user(&self, id: UserId) -> Result<User, StoreError>;

    /// Insert or replace a whole user record
    async fn put_user(&self, user: User) -> Result<(), StoreError>;

    /// Atomically read, mutate and write back one user.
    ///
    /// Nothing is written when the mutation fails.
    async fn update_user(&self, id: UserId, mutation: UserMutation) -> Result<(), StoreError>;

    /// Visit an owned snapshot of every user
    async fn for_each_user(&self, visitor: &mut UserVisitor<'_>) -> Result<(), StoreError>;

    /// Return the user, creating an empty record if none exists yet
    async fn ensure_user(&self, id: UserId, name: &str, chat_id: i64) -> Result<User, StoreError>;

    /// Count users, saved searches and notified items with a full scan
    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let mut stats = StoreStats::default();
        self.for_each_user(&mut |user| {
            stats.add_user(&user);
            Ok(())
        })
        .await?;
        Ok(stats)
    }
}
