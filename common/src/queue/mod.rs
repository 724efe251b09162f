// In-process bounded queues for the search backlog and the notification queue

pub mod bounded;

pub use bounded::{BoundedQueue, QueueStats};
