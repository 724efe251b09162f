// Search worker pool draining the backlog

pub mod pool;

pub use pool::{SearchWorker, WorkerConfig};
