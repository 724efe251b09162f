// Notification pipeline: dedup decision, dispatcher and sinks

pub mod dedup;
pub mod dispatcher;
pub mod sink;
pub mod telegram;

pub use dedup::{decide, DedupDecision};
pub use dispatcher::{DispatchOutcome, NotificationDispatcher};
pub use sink::{item_markdown, LogNotificationSink, NotificationSink};
pub use telegram::TelegramSink;
