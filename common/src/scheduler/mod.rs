// Backlog refill scheduler

pub mod engine;

pub use engine::{next_refill_delay, RefillReport, RefillScheduler, Scheduler, SchedulerConfig};
